//! Offline-first synchronization engine
//!
//! This crate provides:
//! - Per-entity-type repositories doing optimistic local writes plus queued operations
//! - The sync orchestrator: FIFO push, checkpointed pull, single-flight cycles
//! - Conflict resolution (server-wins, client-wins, manual with later hand-off)
//! - Connectivity capabilities and the derived status word
//! - The transport seam and its REST implementation
//!
//! # Example
//!
//! ```rust,no_run
//! use fieldsync_core::EntityType;
//! use fieldsync_database::LocalStore;
//! use fieldsync_network::Client;
//! use fieldsync_sync_engine::{ConnectivitySignal, HttpTransport, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalStore::in_memory().await?;
//! let transport = HttpTransport::new(Client::new()?, "https://sync.example.org/api");
//! let engine = SyncEngine::new(
//!     store,
//!     Arc::new(transport),
//!     Arc::new(ConnectivitySignal::new(true)),
//!     SyncConfig::default(),
//! );
//!
//! engine
//!     .repository(EntityType::Germplasm)
//!     .create(serde_json::json!({"id": "g1", "name": "IR64"}))
//!     .await?;
//!
//! let result = engine.sync().await;
//! println!("pushed {}, pulled {}", result.pushed, result.pulled);
//! # Ok(())
//! # }
//! ```

mod conflict;
mod engine;
mod environment;
mod error;
mod http;
mod repository;
mod status;
mod transport;

pub use conflict::{
    deep_merge, ChangeOutcome, ConflictResolution, ConflictResolver, ConflictStrategy, Decision,
};
pub use engine::{SyncConfig, SyncEngine, SyncResult, SyncStats};
pub use environment::{Connectivity, ConnectivitySignal, PollingConnectivity};
pub use error::{EngineResult, SyncError};
pub use http::HttpTransport;
pub use repository::Repository;
pub use status::{derive_status, EngineStatus};
pub use transport::{PullResponse, SyncTransport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_exports_accessible() {
        let _: SyncConfig = SyncConfig::default();
        let _: ConflictResolver = ConflictResolver::new(ConflictStrategy::Manual);
        let _: EngineStatus = derive_status(false, true, 0);
        let _: EngineResult<()> = Err(SyncError::NotRunning);
    }
}
