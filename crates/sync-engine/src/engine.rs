//! Main sync engine
//!
//! One cycle pushes every queued operation in FIFO order, then pulls each
//! configured entity type since its last clean checkpoint. Errors of single
//! operations or entity types are collected into the cycle result; the
//! cycle keeps going. Only losing connectivity or the local store failing
//! stops it early.

use crate::conflict::{
    deep_merge, ChangeOutcome, ConflictResolution, ConflictResolver, ConflictStrategy,
};
use crate::environment::Connectivity;
use crate::error::{EngineResult, SyncError};
use crate::repository::Repository;
use crate::status::{derive_status, EngineStatus};
use crate::transport::SyncTransport;
use fieldsync_core::{
    AppError, EntityType, PendingOperation, RemoteChange, SyncDirection, SyncLogEntry,
    SyncableRecord, Timestamp,
};
use fieldsync_database::LocalStore;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Configuration for the sync engine
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Strategy for remote changes that meet diverged local records
    pub conflict_strategy: ConflictStrategy,
    /// Entity types pulled each cycle, in order
    pub entity_types: Vec<EntityType>,
    /// Whether an offline to online transition triggers a cycle
    pub auto_sync_on_reconnect: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::ServerWins,
            entity_types: EntityType::ALL.to_vec(),
            auto_sync_on_reconnect: true,
        }
    }
}

/// Report of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SyncResult {
    fn rejected(reason: SyncError) -> Self {
        Self {
            success: false,
            errors: vec![reason.to_string()],
            ..Self::default()
        }
    }
}

/// Counters for display
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Outstanding operations
    pub pending: i64,
    /// Outstanding operations that failed at least once
    pub failing: i64,
    /// Records waiting for a conflict resolution
    pub conflicts: i64,
    /// Start of the newest logged cycle
    pub last_sync_at: Option<Timestamp>,
    /// Errors of the newest logged cycle
    pub last_errors: Vec<String>,
}

struct EngineInner {
    store: LocalStore,
    transport: Arc<dyn SyncTransport>,
    connectivity: Arc<dyn Connectivity>,
    resolver: ConflictResolver,
    config: SyncConfig,
    syncing: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }
}

/// Phase and entity type a cycle is working on, used to log an early stop
#[derive(Debug, Clone, Copy)]
struct CyclePosition {
    direction: SyncDirection,
    entity_type: EntityType,
}

/// Clears the in-flight flag when a cycle ends, however it ends
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Offline-first synchronization engine
///
/// Cheap to clone; clones share the same store, transport and in-flight
/// guard.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Creates an engine; nothing runs until `sync()` or `start()`
    pub fn new(
        store: LocalStore,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<dyn Connectivity>,
        config: SyncConfig,
    ) -> Self {
        let resolver = ConflictResolver::new(config.conflict_strategy);
        Self {
            inner: Arc::new(EngineInner {
                store,
                transport,
                connectivity,
                resolver,
                config,
                syncing: AtomicBool::new(false),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    /// Repository for one entity type, sharing this engine's store
    pub fn repository(&self, entity_type: EntityType) -> Repository {
        Repository::new(entity_type, self.inner.store.clone())
    }

    /// Returns true while a cycle runs
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    // ===== Sync cycle =====

    /// Runs one push-then-pull cycle
    ///
    /// Never fails as a whole: a concurrent call or an offline engine
    /// yields `success = false` with the reason in `errors`, and partial
    /// failures are listed there as well.
    pub async fn sync(&self) -> SyncResult {
        let Some(_guard) = FlightGuard::acquire(&self.inner.syncing) else {
            warn!("Sync requested while a cycle is running");
            return SyncResult::rejected(SyncError::AlreadyRunning);
        };

        if !self.is_online() {
            info!("Sync skipped: offline");
            return SyncResult::rejected(SyncError::Offline);
        }

        let started = Instant::now();
        let cycle_at = Timestamp::now();
        let mut result = SyncResult::default();
        info!("Sync cycle started");

        let mut position = CyclePosition {
            direction: SyncDirection::Push,
            entity_type: self
                .inner
                .config
                .entity_types
                .first()
                .copied()
                .unwrap_or(EntityType::Program),
        };
        if let Err(e) = self.run_cycle(cycle_at, &mut position, &mut result).await {
            let message = e.to_string();
            warn!("Sync cycle stopped early: {}", message);
            self.log_early_stop(cycle_at, position, &message).await;
            result.errors.push(message);
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result.success = result.errors.is_empty();
        info!(
            "Sync cycle finished in {}ms: {} pushed, {} pulled, {} conflicts, {} errors",
            result.duration_ms,
            result.pushed,
            result.pulled,
            result.conflicts,
            result.errors.len()
        );
        result
    }

    async fn run_cycle(
        &self,
        cycle_at: Timestamp,
        position: &mut CyclePosition,
        result: &mut SyncResult,
    ) -> EngineResult<()> {
        self.push_phase(cycle_at, position, result).await?;
        self.pull_phase(cycle_at, position, result).await
    }

    /// Records the error that stopped a cycle under the cycle's timestamp
    ///
    /// The entry is never clean, so it cannot move a pull checkpoint.
    async fn log_early_stop(&self, cycle_at: Timestamp, position: CyclePosition, message: &str) {
        let mut entry = SyncLogEntry::new(position.direction, position.entity_type, cycle_at);
        entry.errors.push(message.to_string());
        if let Err(e) = self.inner.store.append_log(&entry).await {
            warn!("Failed to log early stop of sync cycle: {}", e);
        }
    }

    /// Sends queued operations oldest first, one at a time
    ///
    /// Once an operation fails, later operations of the same record stay
    /// queued for the next cycle. Records in conflict are held back until
    /// resolved.
    async fn push_phase(
        &self,
        cycle_at: Timestamp,
        position: &mut CyclePosition,
        result: &mut SyncResult,
    ) -> EngineResult<()> {
        let operations = self.inner.store.list_pending().await?;
        if operations.is_empty() {
            debug!("Nothing to push");
            return Ok(());
        }

        let started = Instant::now();
        let mut entries: Vec<SyncLogEntry> = Vec::new();
        let pushed = self
            .push_operations(operations, cycle_at, position, &mut entries, result)
            .await;

        // Errors already counted in the result are logged even when the phase stopped
        let duration_ms = started.elapsed().as_millis() as i64;
        for mut entry in entries {
            entry.duration_ms = duration_ms;
            if let Err(e) = self.inner.store.append_log(&entry).await {
                if pushed.is_ok() {
                    return Err(e.into());
                }
                warn!("Failed to log push phase: {}", e);
            }
        }
        pushed
    }

    async fn push_operations(
        &self,
        operations: Vec<PendingOperation>,
        cycle_at: Timestamp,
        position: &mut CyclePosition,
        entries: &mut Vec<SyncLogEntry>,
        result: &mut SyncResult,
    ) -> EngineResult<()> {
        let mut held: HashSet<(EntityType, String)> = HashSet::new();

        for operation in operations {
            let key = (operation.entity_type, operation.entity_id.clone());
            if held.contains(&key) {
                continue;
            }
            position.entity_type = operation.entity_type;
            if self.is_conflicted(&operation).await? {
                debug!(
                    "Holding back {}/{}: waiting for conflict resolution",
                    operation.entity_type, operation.entity_id
                );
                held.insert(key);
                continue;
            }
            if !self.is_online() {
                return Err(SyncError::Offline);
            }

            let entry = log_entry_for(entries, operation.entity_type, cycle_at);
            entry.records_processed += 1;

            match self.inner.transport.push(&operation).await {
                Ok(()) => {
                    self.inner.store.confirm_push(&operation).await?;
                    result.pushed += 1;
                }
                Err(e) => {
                    let message = format!(
                        "push {} {}/{}: {}",
                        operation.operation, operation.entity_type, operation.entity_id, e
                    );
                    warn!("Push failed: {}", message);
                    self.inner
                        .store
                        .record_push_failure(operation.id, &e.to_string())
                        .await?;

                    entry.records_failed += 1;
                    entry.errors.push(message.clone());
                    result.errors.push(message);
                    held.insert(key);
                }
            }
        }
        Ok(())
    }

    /// Pulls each configured entity type since its checkpoint
    async fn pull_phase(
        &self,
        cycle_at: Timestamp,
        position: &mut CyclePosition,
        result: &mut SyncResult,
    ) -> EngineResult<()> {
        position.direction = SyncDirection::Pull;
        for &entity_type in &self.inner.config.entity_types {
            position.entity_type = entity_type;
            if !self.is_online() {
                return Err(SyncError::Offline);
            }

            let started = Instant::now();
            let mut entry = SyncLogEntry::new(SyncDirection::Pull, entity_type, cycle_at);
            let since = self.inner.store.last_pull_checkpoint(entity_type).await?;

            match self.inner.transport.pull(entity_type, since).await {
                Ok(changes) => {
                    for change in changes {
                        entry.records_processed += 1;
                        match self.receive(entity_type, &change).await {
                            Ok(ChangeOutcome::Applied) => result.pulled += 1,
                            Ok(ChangeOutcome::Conflict) => {
                                info!("Conflict on {}/{}", entity_type, change.id);
                                result.conflicts += 1;
                            }
                            Ok(ChangeOutcome::Skipped) => {
                                debug!(
                                    "Kept local {}/{} over remote change",
                                    entity_type, change.id
                                );
                            }
                            Err(e) => {
                                let message =
                                    format!("pull {}/{}: {}", entity_type, change.id, e);
                                warn!("Remote change not applied: {}", message);
                                entry.records_failed += 1;
                                entry.errors.push(message.clone());
                                result.errors.push(message);
                            }
                        }
                    }
                }
                Err(e) => {
                    let message = format!("pull {}: {}", entity_type, e);
                    warn!("Pull failed: {}", message);
                    entry.errors.push(message.clone());
                    result.errors.push(message);
                }
            }

            entry.duration_ms = started.elapsed().as_millis() as i64;
            self.inner.store.append_log(&entry).await?;
        }
        Ok(())
    }

    /// Routes one remote change through the resolver into the store
    async fn receive(
        &self,
        entity_type: EntityType,
        change: &RemoteChange,
    ) -> EngineResult<ChangeOutcome> {
        let resolver = self.inner.resolver;
        let verdict = self
            .inner
            .store
            .receive_remote(entity_type, change, |local, has_pending| {
                resolver.decide(local, has_pending, change).into()
            })
            .await?;

        Ok(ChangeOutcome::from(verdict))
    }

    async fn is_conflicted(&self, operation: &PendingOperation) -> EngineResult<bool> {
        let record = self
            .inner
            .store
            .get_record(operation.entity_type, &operation.entity_id)
            .await?;
        Ok(record.is_some_and(|r| r.is_conflicted()))
    }

    // ===== Status =====

    /// Number of outstanding operations
    pub async fn count(&self) -> EngineResult<i64> {
        Ok(self.inner.store.count().await?)
    }

    /// Status word for display
    pub async fn status(&self) -> EngineResult<EngineStatus> {
        let pending = self.count().await?;
        Ok(derive_status(self.is_syncing(), self.is_online(), pending))
    }

    pub async fn stats(&self) -> EngineResult<SyncStats> {
        let store = &self.inner.store;
        let last_cycle = store.last_cycle().await?;

        Ok(SyncStats {
            pending: store.count().await?,
            failing: store.count_failing().await?,
            conflicts: store.count_conflicts().await?,
            last_sync_at: last_cycle.at,
            last_errors: last_cycle.errors,
        })
    }

    // ===== Conflicts =====

    /// Every record waiting for a resolution
    pub async fn conflicts(&self) -> EngineResult<Vec<SyncableRecord>> {
        Ok(self.inner.store.list_conflicts().await?)
    }

    /// Settles a conflicted record
    ///
    /// Returns the record afterwards, or `None` if the resolution deleted
    /// it. A merge against a remote delete, or of a locally deleted record,
    /// keeps the local side.
    pub async fn resolve_conflict(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        resolution: ConflictResolution,
    ) -> EngineResult<Option<SyncableRecord>> {
        let store = &self.inner.store;
        info!(
            "Resolving conflict on {}/{} with {}",
            entity_type, entity_id, resolution
        );

        match resolution {
            ConflictResolution::ServerWins => {
                store.resolve_server_wins(entity_type, entity_id).await?;
                Ok(store.get_record(entity_type, entity_id).await?)
            }
            ConflictResolution::ClientWins => Ok(Some(
                store.resolve_client_wins(entity_type, entity_id).await?,
            )),
            ConflictResolution::Merge => {
                let record = store
                    .get_record(entity_type, entity_id)
                    .await?
                    .ok_or_else(|| AppError::RecordNotFound {
                        entity: entity_type.to_string(),
                        identifier: entity_id.to_string(),
                    })?;

                match merge_base(&record) {
                    Some(remote) => {
                        let merged = deep_merge(&remote, &record.data);
                        let write = store
                            .resolve_with_merge(entity_type, entity_id, merged)
                            .await?;
                        Ok(Some(write.record))
                    }
                    None => Ok(Some(
                        store.resolve_client_wins(entity_type, entity_id).await?,
                    )),
                }
            }
        }
    }

    // ===== Lifecycle =====

    /// Subscribes to connectivity and syncs on every offline to online transition
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> EngineResult<()> {
        let mut listener = self
            .inner
            .listener
            .lock()
            .map_err(|_| SyncError::LockPoisoned)?;
        if listener.is_some() {
            return Err(SyncError::AlreadyStarted);
        }
        let runtime = Handle::try_current().map_err(|e| SyncError::NoRuntime(e.to_string()))?;

        let mut connectivity = self.inner.connectivity.subscribe();
        let mut was_online = *connectivity.borrow_and_update();
        let auto_sync = self.inner.config.auto_sync_on_reconnect;
        let engine = Arc::downgrade(&self.inner);

        let handle = runtime.spawn(async move {
            while connectivity.changed().await.is_ok() {
                let online = *connectivity.borrow_and_update();
                let reconnected = online && !was_online;
                was_online = online;

                if !reconnected || !auto_sync {
                    continue;
                }
                let Some(inner) = engine.upgrade() else {
                    break;
                };

                info!("Connectivity restored, starting sync");
                let result = SyncEngine { inner }.sync().await;
                if !result.success {
                    warn!("Reconnect sync finished with {} errors", result.errors.len());
                }
            }
            debug!("Connectivity listener exited");
        });

        *listener = Some(handle);
        info!("Sync engine started");
        Ok(())
    }

    /// Aborts the connectivity listener
    ///
    /// A cycle the listener had started ends at its next await point; every
    /// store write it already made stays committed.
    pub fn stop(&self) -> EngineResult<()> {
        let handle = self
            .inner
            .listener
            .lock()
            .map_err(|_| SyncError::LockPoisoned)?
            .take()
            .ok_or(SyncError::NotRunning)?;

        handle.abort();
        info!("Sync engine stopped");
        Ok(())
    }

    /// Returns true between `start()` and `stop()`
    pub fn is_started(&self) -> bool {
        self.inner
            .listener
            .lock()
            .map(|listener| listener.is_some())
            .unwrap_or(false)
    }
}

fn log_entry_for(
    entries: &mut Vec<SyncLogEntry>,
    entity_type: EntityType,
    cycle_at: Timestamp,
) -> &mut SyncLogEntry {
    let index = match entries.iter().position(|e| e.entity_type == entity_type) {
        Some(index) => index,
        None => {
            entries.push(SyncLogEntry::new(SyncDirection::Push, entity_type, cycle_at));
            entries.len() - 1
        }
    };
    &mut entries[index]
}

/// Remote data a merge starts from; `None` when the local side simply wins
fn merge_base(record: &SyncableRecord) -> Option<Value> {
    let remote = record.conflict_remote.as_ref()?;
    if !record.is_conflicted() || record.deleted || remote.is_delete() {
        return None;
    }
    Some(remote.data.clone().unwrap_or_else(|| json!({})))
}
