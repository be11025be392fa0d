//! Transport seam between the orchestrator and the remote store

use crate::error::EngineResult;
use async_trait::async_trait;
use fieldsync_core::{EntityType, PendingOperation, RemoteChange, Timestamp};
use serde::{Deserialize, Serialize};

/// Moves operations to the remote store and changes back from it
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Sends one queued operation; `Ok` means the remote accepted it
    async fn push(&self, operation: &PendingOperation) -> EngineResult<()>;

    /// Fetches the changes of one entity type since `since` (everything if `None`)
    async fn pull(
        &self,
        entity_type: EntityType,
        since: Option<Timestamp>,
    ) -> EngineResult<Vec<RemoteChange>>;
}

/// Body of a pull response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub changes: Vec<RemoteChange>,
}
