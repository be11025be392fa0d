//! Replica table operations
//!
//! Every function addresses the replica table of one `EntityType`. Table
//! names come from the static registry on `EntityType`, never from input.

use fieldsync_core::{AppError, EntityType, RemoteChange, SyncStatus, SyncableRecord, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const RECORD_COLUMNS: &str = "id, sync_version, sync_status, server_version, last_sync_at, \
                              created_at, updated_at, deleted, conflict_remote, data";

/// Gets a record by ID, tombstones included
pub async fn get_record(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: &str,
) -> Result<Option<SyncableRecord>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        RECORD_COLUMNS,
        entity_type.replica_table()
    );

    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to fetch record", e))?;

    row.map(|row| row_to_record(entity_type, row)).transpose()
}

/// Lists live (non-deleted) records in creation order
pub async fn list_records(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
) -> Result<Vec<SyncableRecord>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE deleted = 0 ORDER BY created_at, id",
        RECORD_COLUMNS,
        entity_type.replica_table()
    );

    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to list records", e))?;

    rows.into_iter()
        .map(|row| row_to_record(entity_type, row))
        .collect()
}

/// Lists records with the given status, most recently updated first
pub async fn list_records_by_status(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    status: SyncStatus,
) -> Result<Vec<SyncableRecord>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE sync_status = ? ORDER BY updated_at DESC",
        RECORD_COLUMNS,
        entity_type.replica_table()
    );

    let rows = sqlx::query(&sql)
        .bind(status.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to list records by status", e))?;

    rows.into_iter()
        .map(|row| row_to_record(entity_type, row))
        .collect()
}

/// Counts records with the given status
pub async fn count_records_by_status(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    status: SyncStatus,
) -> Result<i64, AppError> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE sync_status = ?",
        entity_type.replica_table()
    );

    sqlx::query_scalar(&sql)
        .bind(status.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to count records", e))
}

/// Inserts or replaces a record row
pub async fn upsert_record(
    conn: &mut SqliteConnection,
    record: &SyncableRecord,
) -> Result<(), AppError> {
    let sql = format!(
        r#"
        INSERT INTO {} ({})
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            sync_version = excluded.sync_version,
            sync_status = excluded.sync_status,
            server_version = excluded.server_version,
            last_sync_at = excluded.last_sync_at,
            updated_at = excluded.updated_at,
            deleted = excluded.deleted,
            conflict_remote = excluded.conflict_remote,
            data = excluded.data
        "#,
        record.entity_type.replica_table(),
        RECORD_COLUMNS
    );

    let conflict_remote = record
        .conflict_remote
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AppError::database("Failed to serialize conflict side", e))?;
    let data = serde_json::to_string(&record.data)
        .map_err(|e| AppError::database("Failed to serialize record data", e))?;

    sqlx::query(&sql)
        .bind(&record.id)
        .bind(record.sync_version)
        .bind(record.sync_status.as_str())
        .bind(record.server_version)
        .bind(record.last_sync_at.map(|t| t.as_millis()))
        .bind(record.created_at.as_millis())
        .bind(record.updated_at.as_millis())
        .bind(record.deleted)
        .bind(conflict_remote)
        .bind(data)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to write record", e))?;

    Ok(())
}

/// Sets the sync status of a record, leaving everything else untouched
pub async fn set_status(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: &str,
    status: SyncStatus,
    last_sync_at: Option<Timestamp>,
) -> Result<(), AppError> {
    let sql = format!(
        "UPDATE {} SET sync_status = ?, last_sync_at = COALESCE(?, last_sync_at) WHERE id = ?",
        entity_type.replica_table()
    );

    sqlx::query(&sql)
        .bind(status.as_str())
        .bind(last_sync_at.map(|t| t.as_millis()))
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to update sync status", e))?;

    Ok(())
}

/// Physically removes a record row
pub async fn delete_record(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: &str,
) -> Result<bool, AppError> {
    let sql = format!("DELETE FROM {} WHERE id = ?", entity_type.replica_table());

    let result = sqlx::query(&sql)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to delete record", e))?;

    Ok(result.rows_affected() > 0)
}

pub(crate) fn row_to_record(
    entity_type: EntityType,
    row: SqliteRow,
) -> Result<SyncableRecord, AppError> {
    let table = entity_type.replica_table();
    let corrupt = |e: sqlx::Error| AppError::corrupted_row(table, e.to_string());

    let status: String = row.try_get("sync_status").map_err(corrupt)?;
    let sync_status = status
        .parse::<SyncStatus>()
        .map_err(|e| AppError::corrupted_row(table, e))?;

    let data: String = row.try_get("data").map_err(corrupt)?;
    let data = serde_json::from_str(&data)
        .map_err(|e| AppError::corrupted_row(table, format!("data: {}", e)))?;

    let conflict_remote: Option<String> = row.try_get("conflict_remote").map_err(corrupt)?;
    let conflict_remote = conflict_remote
        .map(|raw| serde_json::from_str::<RemoteChange>(&raw))
        .transpose()
        .map_err(|e| AppError::corrupted_row(table, format!("conflict_remote: {}", e)))?;

    let last_sync_at: Option<i64> = row.try_get("last_sync_at").map_err(corrupt)?;
    let created_at: i64 = row.try_get("created_at").map_err(corrupt)?;
    let updated_at: i64 = row.try_get("updated_at").map_err(corrupt)?;

    Ok(SyncableRecord {
        id: row.try_get("id").map_err(corrupt)?,
        entity_type,
        sync_version: row.try_get("sync_version").map_err(corrupt)?,
        sync_status,
        server_version: row.try_get("server_version").map_err(corrupt)?,
        last_sync_at: last_sync_at.map(Timestamp::from_millis),
        created_at: Timestamp::from_millis(created_at),
        updated_at: Timestamp::from_millis(updated_at),
        deleted: row.try_get("deleted").map_err(corrupt)?,
        conflict_remote,
        data,
    })
}
