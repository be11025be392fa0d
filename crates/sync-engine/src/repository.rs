//! Per-entity-type repository used by the UI layer
//!
//! Every mutation is an optimistic local write plus a queued operation,
//! committed together. Reads go to the local replica only, so they work
//! offline and always see the caller's own writes.

use crate::error::EngineResult;
use fieldsync_core::{new_record_id, EntityType, OperationKind, SyncableRecord};
use fieldsync_database::LocalStore;
use serde_json::Value;

/// Typed handle on one replica table
#[derive(Debug, Clone)]
pub struct Repository {
    entity_type: EntityType,
    store: LocalStore,
}

impl Repository {
    pub fn new(entity_type: EntityType, store: LocalStore) -> Self {
        Self { entity_type, store }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Creates a record, taking its id from `data["id"]` or generating one
    pub async fn create(&self, data: Value) -> EngineResult<SyncableRecord> {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(new_record_id);
        self.create_with_id(&id, data).await
    }

    /// Creates a record under an explicit id
    pub async fn create_with_id(&self, id: &str, data: Value) -> EngineResult<SyncableRecord> {
        let write = self
            .store
            .enqueue(self.entity_type, id, OperationKind::Create, data)
            .await?;
        Ok(write.record)
    }

    /// Merges `changes` into the record's top-level fields
    pub async fn update(&self, id: &str, changes: Value) -> EngineResult<SyncableRecord> {
        let write = self
            .store
            .enqueue(self.entity_type, id, OperationKind::Update, changes)
            .await?;
        Ok(write.record)
    }

    /// Deletes a record; it disappears from reads immediately
    pub async fn remove(&self, id: &str) -> EngineResult<()> {
        self.store
            .enqueue(self.entity_type, id, OperationKind::Delete, Value::Null)
            .await?;
        Ok(())
    }

    /// Gets a live record
    pub async fn get_by_id(&self, id: &str) -> EngineResult<Option<SyncableRecord>> {
        let record = self.store.get_record(self.entity_type, id).await?;
        Ok(record.filter(|r| !r.deleted))
    }

    /// Lists live records
    pub async fn list(&self) -> EngineResult<Vec<SyncableRecord>> {
        Ok(self.store.list_records(self.entity_type).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::{AppError, SyncStatus};
    use crate::error::SyncError;
    use serde_json::json;

    async fn repository(entity_type: EntityType) -> Repository {
        Repository::new(entity_type, LocalStore::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_uses_id_from_data() {
        let germplasm = repository(EntityType::Germplasm).await;

        let record = germplasm
            .create(json!({"id": "g1", "name": "IR64"}))
            .await
            .unwrap();
        assert_eq!(record.id, "g1");
        assert_eq!(record.sync_status, SyncStatus::Pending);

        let generated = germplasm.create(json!({"name": "Azucena"})).await.unwrap();
        assert_eq!(generated.id.len(), 36);
        assert_eq!(germplasm.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_read_your_own_writes() {
        let trials = repository(EntityType::Trial).await;

        trials
            .create_with_id("t1", json!({"status": "planned", "season": "wet"}))
            .await
            .unwrap();
        trials.update("t1", json!({"status": "active"})).await.unwrap();

        let record = trials.get_by_id("t1").await.unwrap().unwrap();
        assert_eq!(record.data["status"], "active");
        assert_eq!(record.data["season"], "wet");
        assert_eq!(record.sync_version, 2);
    }

    #[tokio::test]
    async fn test_removed_records_are_hidden() {
        let locations = repository(EntityType::Location).await;

        locations
            .create_with_id("l1", json!({"name": "Block A"}))
            .await
            .unwrap();
        locations.remove("l1").await.unwrap();

        assert!(locations.get_by_id("l1").await.unwrap().is_none());
        assert!(locations.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_of_missing_record_fails() {
        let studies = repository(EntityType::Study).await;

        let result = studies.update("missing", json!({"name": "x"})).await;
        assert!(matches!(
            result,
            Err(SyncError::Store(AppError::RecordNotFound { .. }))
        ));
    }
}
