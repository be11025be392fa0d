//! fieldsync Database Layer
//!
//! This crate provides the durable local store of the sync engine: one
//! replica table per entity type, the pending-operation queue and the sync
//! log. It uses SQLite with sqlx; every mutation that touches both a replica
//! row and the queue runs in a single transaction.

pub mod connection;
pub mod migrations;
pub mod queries;
pub mod store;

pub use connection::{DatabaseConfig, DbPool};
pub use migrations::{current_version, run_migrations, verify_integrity};
pub use store::{LastCycle, LocalStore, LocalWrite, RemoteApply};

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::{AppError, EntityType, OperationKind, SyncStatus};
    use serde_json::json;

    #[tokio::test]
    async fn test_database_migrations() -> Result<(), AppError> {
        let pool = connection::connect_in_memory().await?;
        run_migrations(&pool).await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .map_err(|e| AppError::database("Failed to count migrations", e))?;

        assert_eq!(count, current_version());
        Ok(())
    }

    #[tokio::test]
    async fn test_full_local_workflow() -> Result<(), AppError> {
        let store = LocalStore::in_memory().await?;

        let created = store
            .enqueue(
                EntityType::Observation,
                "o1",
                OperationKind::Create,
                json!({"trait": "plant_height", "value": 92.5}),
            )
            .await?;
        store
            .enqueue(
                EntityType::Observation,
                "o1",
                OperationKind::Update,
                json!({"value": 94.0}),
            )
            .await?;

        let record = store
            .get_record(EntityType::Observation, "o1")
            .await?
            .ok_or_else(|| AppError::InternalError {
                message: "missing record".to_string(),
            })?;
        assert_eq!(record.data["value"], 94.0);
        assert_eq!(record.sync_status, SyncStatus::Pending);

        let pending = store.list_pending().await?;
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, created.operation.id);
        assert_eq!(pending[1].operation, OperationKind::Update);

        Ok(())
    }
}
