//! Durable local store
//!
//! `LocalStore` owns the pool and exposes every write path the sync engine
//! needs. Each method that touches more than one row runs inside a single
//! transaction, so a replica write and its queue entry land together or not
//! at all.

use crate::connection::{connect, connect_in_memory, DatabaseConfig};
use crate::migrations::run_migrations;
use crate::queries::{pending, records, sync_log};
use crate::DbPool;
use fieldsync_core::{
    AppError, EntityType, OperationKind, PendingOperation, RemoteAction, RemoteChange,
    SyncLogEntry, SyncStatus, SyncableRecord, Timestamp,
};
use log::{debug, error, info};
use serde_json::Value;
use sqlx::SqliteConnection;

/// Result of a local mutation: the new replica state and its queue entry
#[derive(Debug, Clone, PartialEq)]
pub struct LocalWrite {
    pub record: SyncableRecord,
    pub operation: PendingOperation,
}

/// What to do with one incoming remote change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    /// Write the remote side, optionally dropping local queued operations
    Overwrite { discard_pending: bool },
    /// Keep local data and retain the remote side for a later resolution
    MarkConflict,
    /// Leave the record and its queue untouched
    Ignore,
}

/// Errors of the newest sync cycle recorded in the log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastCycle {
    pub at: Option<Timestamp>,
    pub errors: Vec<String>,
}

/// Replica tables, pending-operation queue and sync log behind one pool
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: DbPool,
}

impl LocalStore {
    /// Wraps an already migrated pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) a database file and brings its schema up to date
    pub async fn open(config: DatabaseConfig) -> Result<Self, AppError> {
        info!("Opening local store at {}", config.path);
        let pool = connect(config).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Creates a migrated in-memory store
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = connect_in_memory().await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Closes the pool, waiting for open connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ===== Local mutations =====

    /// Applies a local mutation to the replica and queues it for push
    ///
    /// `Create` inserts the record with `payload` as its data, `Update`
    /// shallow-merges `payload` into the existing data, `Delete` turns the
    /// record into a tombstone. Either both the replica row and the queue
    /// entry are committed or the call fails.
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: OperationKind,
        payload: Value,
    ) -> Result<LocalWrite, AppError> {
        if operation != OperationKind::Delete && !payload.is_object() {
            return Err(AppError::InvalidArgument {
                argument: "payload".to_string(),
                reason: format!("{} payload must be a JSON object", operation),
            });
        }

        let result = self
            .write_local(entity_type, entity_id, operation, payload)
            .await;

        match result {
            Ok(write) => {
                debug!(
                    "Queued {} for {}/{} as operation {}",
                    operation, entity_type, entity_id, write.operation.id
                );
                Ok(write)
            }
            Err(e @ AppError::DatabaseError { .. }) => {
                error!(
                    "Rejected local {} of {}/{}: {}",
                    operation, entity_type, entity_id, e
                );
                Err(AppError::QueueWriteFailed {
                    operation: operation.to_string(),
                    entity: entity_type.to_string(),
                    identifier: entity_id.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn write_local(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: OperationKind,
        payload: Value,
    ) -> Result<LocalWrite, AppError> {
        let mut tx = self.begin().await?;
        let now = Timestamp::now();
        let existing = records::get_record(&mut *tx, entity_type, entity_id).await?;

        let record = match (operation, existing) {
            (OperationKind::Create, Some(current)) if !current.deleted => {
                return Err(AppError::InvalidArgument {
                    argument: "id".to_string(),
                    reason: format!("{}/{} already exists", entity_type, entity_id),
                });
            }
            (OperationKind::Create, Some(tombstone)) => SyncableRecord {
                sync_version: tombstone.sync_version + 1,
                sync_status: local_status(tombstone.sync_status),
                updated_at: now,
                deleted: false,
                data: payload,
                ..tombstone
            },
            (OperationKind::Create, None) => SyncableRecord {
                id: entity_id.to_string(),
                entity_type,
                sync_version: 1,
                sync_status: SyncStatus::Pending,
                server_version: None,
                last_sync_at: None,
                created_at: now,
                updated_at: now,
                deleted: false,
                conflict_remote: None,
                data: payload,
            },
            (_, None) => return Err(not_found(entity_type, entity_id)),
            (_, Some(current)) if current.deleted => {
                return Err(not_found(entity_type, entity_id))
            }
            (OperationKind::Update, Some(mut current)) => {
                shallow_merge(&mut current.data, &payload);
                current.sync_version += 1;
                current.sync_status = local_status(current.sync_status);
                current.updated_at = now;
                current
            }
            (OperationKind::Delete, Some(mut current)) => {
                current.deleted = true;
                current.sync_version += 1;
                current.sync_status = local_status(current.sync_status);
                current.updated_at = now;
                current
            }
        };

        let body = match operation {
            OperationKind::Delete => Value::Null,
            _ => wire_payload(entity_id, &record.data),
        };

        records::upsert_record(&mut *tx, &record).await?;
        let operation =
            pending::insert_operation(&mut *tx, entity_type, entity_id, operation, &body, now)
                .await?;

        commit(tx).await?;
        Ok(LocalWrite { record, operation })
    }

    // ===== Queue =====

    /// Removes a confirmed operation; returns false if it was already gone
    pub async fn dequeue(&self, operation_id: i64) -> Result<bool, AppError> {
        let mut conn = self.acquire().await?;
        pending::delete_operation(&mut *conn, operation_id).await
    }

    /// All outstanding operations, oldest first
    pub async fn list_pending(&self) -> Result<Vec<PendingOperation>, AppError> {
        let mut conn = self.acquire().await?;
        pending::list_operations(&mut *conn).await
    }

    /// Number of outstanding operations
    pub async fn count(&self) -> Result<i64, AppError> {
        let mut conn = self.acquire().await?;
        pending::count_operations(&mut *conn).await
    }

    /// Number of outstanding operations that failed at least once
    pub async fn count_failing(&self) -> Result<i64, AppError> {
        let mut conn = self.acquire().await?;
        pending::count_failing_operations(&mut *conn).await
    }

    /// Returns true if the record has unconfirmed local operations
    pub async fn has_pending(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<bool, AppError> {
        let mut conn = self.acquire().await?;
        let count = pending::count_operations_for_entity(&mut *conn, entity_type, entity_id).await?;
        Ok(count > 0)
    }

    /// Outstanding operations of one record, oldest first
    pub async fn pending_for(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<PendingOperation>, AppError> {
        let mut conn = self.acquire().await?;
        pending::list_operations_for_entity(&mut *conn, entity_type, entity_id).await
    }

    // ===== Reads =====

    /// Gets a record, tombstones included
    pub async fn get_record(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<SyncableRecord>, AppError> {
        let mut conn = self.acquire().await?;
        records::get_record(&mut *conn, entity_type, entity_id).await
    }

    /// Lists live records of one type
    pub async fn list_records(
        &self,
        entity_type: EntityType,
    ) -> Result<Vec<SyncableRecord>, AppError> {
        let mut conn = self.acquire().await?;
        records::list_records(&mut *conn, entity_type).await
    }

    /// Every record waiting for a conflict resolution, across all types
    pub async fn list_conflicts(&self) -> Result<Vec<SyncableRecord>, AppError> {
        let mut conn = self.acquire().await?;
        let mut conflicts = Vec::new();
        for entity_type in EntityType::ALL {
            conflicts.extend(
                records::list_records_by_status(&mut *conn, entity_type, SyncStatus::Conflict)
                    .await?,
            );
        }
        Ok(conflicts)
    }

    /// Number of records waiting for a conflict resolution
    pub async fn count_conflicts(&self) -> Result<i64, AppError> {
        let mut conn = self.acquire().await?;
        let mut total = 0;
        for entity_type in EntityType::ALL {
            total +=
                records::count_records_by_status(&mut *conn, entity_type, SyncStatus::Conflict)
                    .await?;
        }
        Ok(total)
    }

    // ===== Push outcomes =====

    /// Dequeues a pushed operation and settles the record once nothing else is queued
    ///
    /// A tombstone whose last operation was confirmed is removed for good;
    /// a pending record becomes synced. Returns false if the operation had
    /// already been dequeued.
    pub async fn confirm_push(&self, operation: &PendingOperation) -> Result<bool, AppError> {
        let mut tx = self.begin().await?;

        if !pending::delete_operation(&mut *tx, operation.id).await? {
            commit(tx).await?;
            return Ok(false);
        }

        let remaining = pending::count_operations_for_entity(
            &mut *tx,
            operation.entity_type,
            &operation.entity_id,
        )
        .await?;

        if remaining == 0 {
            let record =
                records::get_record(&mut *tx, operation.entity_type, &operation.entity_id).await?;
            match record {
                Some(record) if record.deleted && !record.is_conflicted() => {
                    records::delete_record(&mut *tx, record.entity_type, &record.id).await?;
                }
                Some(record) if record.sync_status == SyncStatus::Pending => {
                    records::set_status(
                        &mut *tx,
                        record.entity_type,
                        &record.id,
                        SyncStatus::Synced,
                        Some(Timestamp::now()),
                    )
                    .await?;
                }
                _ => {}
            }
        }

        commit(tx).await?;
        Ok(true)
    }

    /// Records a failed push attempt; the operation stays queued
    pub async fn record_push_failure(
        &self,
        operation_id: i64,
        error: &str,
    ) -> Result<(), AppError> {
        let mut conn = self.acquire().await?;
        pending::record_failure(&mut *conn, operation_id, error).await
    }

    // ===== Remote changes =====

    /// Writes a remote change into the replica
    ///
    /// With `discard_pending` the record's queued operations are dropped in
    /// the same transaction. An upsert replaces the local data and marks the
    /// record synced; a delete removes the row.
    pub async fn apply_remote(
        &self,
        entity_type: EntityType,
        change: &RemoteChange,
        discard_pending: bool,
    ) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        apply_remote_in(&mut *tx, entity_type, change, discard_pending).await?;
        commit(tx).await
    }

    /// Keeps local data, flags the record as conflicted and retains the remote side
    pub async fn mark_conflict(
        &self,
        entity_type: EntityType,
        change: &RemoteChange,
    ) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        mark_conflict_in(&mut *tx, entity_type, change).await?;
        commit(tx).await
    }

    /// Routes one remote change through `decide` and applies its verdict
    ///
    /// `decide` sees the current local record (tombstones included) and
    /// whether it has queued operations. Reading that state and writing the
    /// verdict happen in one transaction.
    pub async fn receive_remote<F>(
        &self,
        entity_type: EntityType,
        change: &RemoteChange,
        decide: F,
    ) -> Result<RemoteApply, AppError>
    where
        F: FnOnce(Option<&SyncableRecord>, bool) -> RemoteApply,
    {
        let mut tx = self.begin().await?;

        let local = records::get_record(&mut *tx, entity_type, &change.id).await?;
        let queued =
            pending::count_operations_for_entity(&mut *tx, entity_type, &change.id).await?;
        let verdict = decide(local.as_ref(), queued > 0);

        match verdict {
            RemoteApply::Overwrite { discard_pending } => {
                apply_remote_in(&mut *tx, entity_type, change, discard_pending).await?;
            }
            RemoteApply::MarkConflict => {
                mark_conflict_in(&mut *tx, entity_type, change).await?;
            }
            RemoteApply::Ignore => {}
        }

        commit(tx).await?;
        Ok(verdict)
    }

    // ===== Conflict resolution =====

    /// Applies the retained remote side and drops the local divergence
    pub async fn resolve_server_wins(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        let (_, remote) = conflicted(&mut *tx, entity_type, entity_id).await?;
        apply_remote_in(&mut *tx, entity_type, &remote, true).await?;
        commit(tx).await
    }

    /// Forgets the retained remote side; local operations stay queued
    pub async fn resolve_client_wins(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<SyncableRecord, AppError> {
        let mut tx = self.begin().await?;
        let (mut record, _) = conflicted(&mut *tx, entity_type, entity_id).await?;

        let queued =
            pending::count_operations_for_entity(&mut *tx, entity_type, entity_id).await?;
        record.conflict_remote = None;
        record.sync_status = if queued > 0 {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        };
        records::upsert_record(&mut *tx, &record).await?;

        commit(tx).await?;
        Ok(record)
    }

    /// Replaces local data with `merged` and queues it as an update
    pub async fn resolve_with_merge(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        merged: Value,
    ) -> Result<LocalWrite, AppError> {
        let mut tx = self.begin().await?;
        let (mut record, _) = conflicted(&mut *tx, entity_type, entity_id).await?;
        let now = Timestamp::now();

        record.data = merged;
        record.deleted = false;
        record.sync_version += 1;
        record.sync_status = SyncStatus::Pending;
        record.conflict_remote = None;
        record.updated_at = now;
        records::upsert_record(&mut *tx, &record).await?;

        let body = wire_payload(entity_id, &record.data);
        let operation = pending::insert_operation(
            &mut *tx,
            entity_type,
            entity_id,
            OperationKind::Update,
            &body,
            now,
        )
        .await?;

        commit(tx).await?;
        Ok(LocalWrite { record, operation })
    }

    // ===== Sync log =====

    /// Appends an audit entry
    pub async fn append_log(&self, entry: &SyncLogEntry) -> Result<i64, AppError> {
        let mut conn = self.acquire().await?;
        sync_log::insert_entry(&mut *conn, entry).await
    }

    /// Start time of the last pull of `entity_type` that finished without failures
    pub async fn last_pull_checkpoint(
        &self,
        entity_type: EntityType,
    ) -> Result<Option<Timestamp>, AppError> {
        let mut conn = self.acquire().await?;
        sync_log::last_clean_pull(&mut *conn, entity_type).await
    }

    /// Latest log entries, newest first
    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>, AppError> {
        let mut conn = self.acquire().await?;
        sync_log::recent_entries(&mut *conn, limit).await
    }

    /// When the newest cycle ran and what went wrong in it
    ///
    /// Entries of one cycle share the cycle's start timestamp.
    pub async fn last_cycle(&self) -> Result<LastCycle, AppError> {
        let mut conn = self.acquire().await?;
        let Some(at) = sync_log::latest_timestamp(&mut *conn).await? else {
            return Ok(LastCycle::default());
        };

        let errors = sync_log::entries_at(&mut *conn, at)
            .await?
            .into_iter()
            .flat_map(|entry| entry.errors)
            .collect();

        Ok(LastCycle {
            at: Some(at),
            errors,
        })
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, AppError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| AppError::database("Failed to acquire connection", e))
    }

    /// Starts a write transaction holding the write lock from the first statement
    ///
    /// A deferred transaction that reads before writing cannot wait for a
    /// concurrent writer and fails with SQLITE_BUSY instead.
    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>, AppError> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| AppError::database("Failed to begin transaction", e))
    }
}

async fn commit(tx: sqlx::Transaction<'static, sqlx::Sqlite>) -> Result<(), AppError> {
    tx.commit()
        .await
        .map_err(|e| AppError::database("Failed to commit transaction", e))
}

async fn apply_remote_in(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    change: &RemoteChange,
    discard_pending: bool,
) -> Result<(), AppError> {
    if discard_pending {
        let dropped = pending::delete_operations_for_entity(conn, entity_type, &change.id).await?;
        if dropped > 0 {
            info!(
                "Discarded {} local operations of {}/{}",
                dropped, entity_type, change.id
            );
        }
    }

    match change.action {
        RemoteAction::Delete => {
            records::delete_record(conn, entity_type, &change.id).await?;
        }
        RemoteAction::Upsert => {
            let data = change.data.clone().ok_or_else(|| AppError::InvalidArgument {
                argument: "data".to_string(),
                reason: format!("upsert of {}/{} carries no data", entity_type, change.id),
            })?;
            let now = Timestamp::now();
            let existing = records::get_record(conn, entity_type, &change.id).await?;

            let previous_version = existing
                .as_ref()
                .and_then(|r| r.server_version)
                .unwrap_or(0);
            let server_version = change.version.unwrap_or(previous_version + 1);

            let record = match existing {
                Some(current) => SyncableRecord {
                    sync_status: SyncStatus::Synced,
                    server_version: Some(server_version),
                    last_sync_at: Some(now),
                    updated_at: now,
                    deleted: false,
                    conflict_remote: None,
                    data,
                    ..current
                },
                None => SyncableRecord {
                    id: change.id.clone(),
                    entity_type,
                    sync_version: 0,
                    sync_status: SyncStatus::Synced,
                    server_version: Some(server_version),
                    last_sync_at: Some(now),
                    created_at: now,
                    updated_at: now,
                    deleted: false,
                    conflict_remote: None,
                    data,
                },
            };
            records::upsert_record(conn, &record).await?;
        }
    }

    Ok(())
}

async fn mark_conflict_in(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    change: &RemoteChange,
) -> Result<(), AppError> {
    let mut record = records::get_record(conn, entity_type, &change.id)
        .await?
        .ok_or_else(|| not_found(entity_type, &change.id))?;
    record.sync_status = SyncStatus::Conflict;
    record.conflict_remote = Some(change.clone());
    records::upsert_record(conn, &record).await?;

    info!("Marked {}/{} as conflicted", entity_type, change.id);
    Ok(())
}

async fn conflicted(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<(SyncableRecord, RemoteChange), AppError> {
    let record = records::get_record(conn, entity_type, entity_id)
        .await?
        .ok_or_else(|| not_found(entity_type, entity_id))?;

    match (record.sync_status, record.conflict_remote.clone()) {
        (SyncStatus::Conflict, Some(remote)) => Ok((record, remote)),
        _ => Err(AppError::NoConflict {
            entity: entity_type.to_string(),
            identifier: entity_id.to_string(),
        }),
    }
}

/// A local write never clears a conflict
fn local_status(current: SyncStatus) -> SyncStatus {
    match current {
        SyncStatus::Conflict => SyncStatus::Conflict,
        _ => SyncStatus::Pending,
    }
}

fn not_found(entity_type: EntityType, entity_id: &str) -> AppError {
    AppError::RecordNotFound {
        entity: entity_type.to_string(),
        identifier: entity_id.to_string(),
    }
}

/// Top-level keys of `patch` replace those of `base`
fn shallow_merge(base: &mut Value, patch: &Value) {
    match (base.as_object_mut(), patch.as_object()) {
        (Some(base), Some(patch)) => {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        _ => *base = patch.clone(),
    }
}

/// Request body for create/update: the full record data plus its id
fn wire_payload(entity_id: &str, data: &Value) -> Value {
    let mut body = data.clone();
    if let Some(object) = body.as_object_mut() {
        object
            .entry("id")
            .or_insert_with(|| Value::String(entity_id.to_string()));
    }
    body
}
