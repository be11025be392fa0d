//! Shared domain types and errors for fieldsync.
//!
//! Everything the durable store, the transport and the sync orchestrator
//! exchange lives here, so that the lower crates never depend on each other
//! for a type definition.

pub mod error;
pub mod types;

pub use error::{AppError, ErrorSeverity, Result};
pub use types::{
    EntityType, OperationKind, PendingOperation, RemoteAction, RemoteChange, SyncDirection,
    SyncLogEntry, SyncStatus, SyncableRecord, Timestamp, new_record_id,
};
