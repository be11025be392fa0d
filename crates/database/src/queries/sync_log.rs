//! Sync log operations

use fieldsync_core::{AppError, EntityType, SyncDirection, SyncLogEntry, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Appends an entry and returns its id
pub async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &SyncLogEntry,
) -> Result<i64, AppError> {
    let errors = serde_json::to_string(&entry.errors)
        .map_err(|e| AppError::database("Failed to serialize sync errors", e))?;

    let result = sqlx::query(
        r#"
        INSERT INTO sync_log (
            timestamp, direction, entity_type, records_processed,
            records_failed, errors, duration_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.timestamp.as_millis())
    .bind(entry.direction.as_str())
    .bind(entry.entity_type.as_str())
    .bind(entry.records_processed)
    .bind(entry.records_failed)
    .bind(errors)
    .bind(entry.duration_ms)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::database("Failed to append sync log entry", e))?;

    Ok(result.last_insert_rowid())
}

/// Start time of the latest pull for `entity_type` that completed without failures
pub async fn last_clean_pull(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
) -> Result<Option<Timestamp>, AppError> {
    let millis: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT timestamp FROM sync_log
        WHERE entity_type = ? AND direction = 'pull'
          AND records_failed = 0 AND errors = '[]'
        ORDER BY timestamp DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(entity_type.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::database("Failed to read pull checkpoint", e))?;

    Ok(millis.map(Timestamp::from_millis))
}

/// Latest entries, newest first
pub async fn recent_entries(
    conn: &mut SqliteConnection,
    limit: i64,
) -> Result<Vec<SyncLogEntry>, AppError> {
    let rows = sqlx::query(
        r#"
        SELECT id, timestamp, direction, entity_type, records_processed,
               records_failed, errors, duration_ms
        FROM sync_log
        ORDER BY timestamp DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::database("Failed to read sync log", e))?;

    rows.into_iter().map(row_to_entry).collect()
}

/// Timestamp of the newest entry
pub async fn latest_timestamp(conn: &mut SqliteConnection) -> Result<Option<Timestamp>, AppError> {
    let millis: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM sync_log")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to read latest sync time", e))?;

    Ok(millis.map(Timestamp::from_millis))
}

/// Every entry written with exactly this timestamp, in insertion order
pub async fn entries_at(
    conn: &mut SqliteConnection,
    timestamp: Timestamp,
) -> Result<Vec<SyncLogEntry>, AppError> {
    let rows = sqlx::query(
        r#"
        SELECT id, timestamp, direction, entity_type, records_processed,
               records_failed, errors, duration_ms
        FROM sync_log
        WHERE timestamp = ?
        ORDER BY id
        "#,
    )
    .bind(timestamp.as_millis())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::database("Failed to read sync log", e))?;

    rows.into_iter().map(row_to_entry).collect()
}

pub(crate) fn row_to_entry(row: SqliteRow) -> Result<SyncLogEntry, AppError> {
    let corrupt = |e: sqlx::Error| AppError::corrupted_row("sync_log", e.to_string());

    let direction: String = row.try_get("direction").map_err(corrupt)?;
    let direction = direction
        .parse::<SyncDirection>()
        .map_err(|e| AppError::corrupted_row("sync_log", e))?;

    let entity_type: String = row.try_get("entity_type").map_err(corrupt)?;
    let entity_type = entity_type
        .parse::<EntityType>()
        .map_err(|e| AppError::corrupted_row("sync_log", e.to_string()))?;

    let errors: String = row.try_get("errors").map_err(corrupt)?;
    let errors = serde_json::from_str(&errors)
        .map_err(|e| AppError::corrupted_row("sync_log", e.to_string()))?;

    let timestamp: i64 = row.try_get("timestamp").map_err(corrupt)?;

    Ok(SyncLogEntry {
        id: row.try_get("id").map_err(corrupt)?,
        timestamp: Timestamp::from_millis(timestamp),
        direction,
        entity_type,
        records_processed: row.try_get("records_processed").map_err(corrupt)?,
        records_failed: row.try_get("records_failed").map_err(corrupt)?,
        errors,
        duration_ms: row.try_get("duration_ms").map_err(corrupt)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_in_memory;
    use crate::migrations::run_migrations;

    #[tokio::test]
    async fn test_checkpoint_ignores_failed_pulls() {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        assert!(last_clean_pull(&mut conn, EntityType::Trial)
            .await
            .unwrap()
            .is_none());

        let clean = SyncLogEntry::new(
            SyncDirection::Pull,
            EntityType::Trial,
            Timestamp::from_millis(1_000),
        );
        insert_entry(&mut conn, &clean).await.unwrap();

        let mut failed = SyncLogEntry::new(
            SyncDirection::Pull,
            EntityType::Trial,
            Timestamp::from_millis(2_000),
        );
        failed.errors.push("HTTP 502".to_string());
        insert_entry(&mut conn, &failed).await.unwrap();

        let push = SyncLogEntry::new(
            SyncDirection::Push,
            EntityType::Trial,
            Timestamp::from_millis(3_000),
        );
        insert_entry(&mut conn, &push).await.unwrap();

        let checkpoint = last_clean_pull(&mut conn, EntityType::Trial).await.unwrap();
        assert_eq!(checkpoint, Some(Timestamp::from_millis(1_000)));

        assert!(last_clean_pull(&mut conn, EntityType::Study)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_recent_entries_newest_first() {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        for millis in [10, 30, 20] {
            let mut entry = SyncLogEntry::new(
                SyncDirection::Push,
                EntityType::Germplasm,
                Timestamp::from_millis(millis),
            );
            entry.records_processed = millis;
            insert_entry(&mut conn, &entry).await.unwrap();
        }

        let entries = recent_entries(&mut conn, 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, Timestamp::from_millis(30));
        assert_eq!(entries[1].records_processed, 20);
    }
}
