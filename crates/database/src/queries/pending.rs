//! Pending-operation table operations

use fieldsync_core::{AppError, EntityType, OperationKind, PendingOperation, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const OPERATION_COLUMNS: &str =
    "id, entity_type, entity_id, operation, payload, created_at, retry_count, last_error";

/// Appends an operation and returns it with its assigned id
pub async fn insert_operation(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
    operation: OperationKind,
    payload: &serde_json::Value,
    created_at: Timestamp,
) -> Result<PendingOperation, AppError> {
    let payload_json = serde_json::to_string(payload)
        .map_err(|e| AppError::database("Failed to serialize payload", e))?;

    let result = sqlx::query(
        r#"
        INSERT INTO pending_operations (entity_type, entity_id, operation, payload, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(operation.as_str())
    .bind(payload_json)
    .bind(created_at.as_millis())
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::database("Failed to insert pending operation", e))?;

    Ok(PendingOperation {
        id: result.last_insert_rowid(),
        entity_type,
        entity_id: entity_id.to_string(),
        operation,
        payload: payload.clone(),
        created_at,
        retry_count: 0,
        last_error: None,
    })
}

/// Gets an operation by id
pub async fn get_operation(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<PendingOperation>, AppError> {
    let sql = format!(
        "SELECT {} FROM pending_operations WHERE id = ?",
        OPERATION_COLUMNS
    );

    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to fetch pending operation", e))?;

    row.map(row_to_operation).transpose()
}

/// Lists every outstanding operation, oldest first
pub async fn list_operations(
    conn: &mut SqliteConnection,
) -> Result<Vec<PendingOperation>, AppError> {
    let sql = format!(
        "SELECT {} FROM pending_operations ORDER BY created_at, id",
        OPERATION_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to list pending operations", e))?;

    rows.into_iter().map(row_to_operation).collect()
}

/// Lists outstanding operations for one entity, oldest first
pub async fn list_operations_for_entity(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<Vec<PendingOperation>, AppError> {
    let sql = format!(
        "SELECT {} FROM pending_operations WHERE entity_type = ? AND entity_id = ? \
         ORDER BY created_at, id",
        OPERATION_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to list entity operations", e))?;

    rows.into_iter().map(row_to_operation).collect()
}

/// Counts outstanding operations
pub async fn count_operations(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM pending_operations")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to count pending operations", e))
}

/// Counts operations that failed at least once
pub async fn count_failing_operations(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM pending_operations WHERE retry_count > 0")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to count failing operations", e))
}

/// Counts outstanding operations for one entity
pub async fn count_operations_for_entity(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<i64, AppError> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM pending_operations WHERE entity_type = ? AND entity_id = ?",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::database("Failed to count entity operations", e))
}

/// Deletes an operation; returns false if it was already gone
pub async fn delete_operation(conn: &mut SqliteConnection, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM pending_operations WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to delete pending operation", e))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes every operation of one entity and returns how many were removed
pub async fn delete_operations_for_entity(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<u64, AppError> {
    let result =
        sqlx::query("DELETE FROM pending_operations WHERE entity_type = ? AND entity_id = ?")
            .bind(entity_type.as_str())
            .bind(entity_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::database("Failed to discard entity operations", e))?;

    Ok(result.rows_affected())
}

/// Records a failed push attempt
pub async fn record_failure(
    conn: &mut SqliteConnection,
    id: i64,
    error: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE pending_operations SET retry_count = retry_count + 1, last_error = ? WHERE id = ?",
    )
    .bind(error)
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::database("Failed to record push failure", e))?;

    Ok(())
}

pub(crate) fn row_to_operation(row: SqliteRow) -> Result<PendingOperation, AppError> {
    let corrupt = |e: sqlx::Error| AppError::corrupted_row("pending_operations", e.to_string());

    let entity_type: String = row.try_get("entity_type").map_err(corrupt)?;
    let entity_type = entity_type
        .parse::<EntityType>()
        .map_err(|e| AppError::corrupted_row("pending_operations", e.to_string()))?;

    let operation: String = row.try_get("operation").map_err(corrupt)?;
    let operation = operation
        .parse::<OperationKind>()
        .map_err(|e| AppError::corrupted_row("pending_operations", e))?;

    let payload: String = row.try_get("payload").map_err(corrupt)?;
    let payload = serde_json::from_str(&payload)
        .map_err(|e| AppError::corrupted_row("pending_operations", e.to_string()))?;

    let created_at: i64 = row.try_get("created_at").map_err(corrupt)?;

    Ok(PendingOperation {
        id: row.try_get("id").map_err(corrupt)?,
        entity_type,
        entity_id: row.try_get("entity_id").map_err(corrupt)?,
        operation,
        payload,
        created_at: Timestamp::from_millis(created_at),
        retry_count: row.try_get("retry_count").map_err(corrupt)?,
        last_error: row.try_get("last_error").map_err(corrupt)?,
    })
}
