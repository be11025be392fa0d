//! Error types for sync operations

use fieldsync_core::AppError;
use thiserror::Error;

/// Result type for sync engine operations
pub type EngineResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local store failure
    #[error(transparent)]
    Store(#[from] AppError),

    /// The connectivity signal reports offline
    #[error("Offline: sync requires connectivity")]
    Offline,

    /// Another cycle is already running
    #[error("Sync already in progress")]
    AlreadyRunning,

    /// The request never got a usable answer
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-2xx status
    #[error("Remote rejected request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `start()` called on a running engine
    #[error("Sync engine already started")]
    AlreadyStarted,

    /// `stop()` called on a stopped engine
    #[error("Sync engine is not running")]
    NotRunning,

    /// No async runtime to spawn the listener on
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// A lock was poisoned by a panicking holder
    #[error("Lock poisoned")]
    LockPoisoned,
}

impl SyncError {
    /// Returns true for errors that come from the remote side
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::Rejected {
            status: 409,
            body: "stale".to_string(),
        };
        assert_eq!(err.to_string(), "Remote rejected request with HTTP 409: stale");
        assert!(err.is_remote());
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: SyncError = AppError::RecordNotFound {
            entity: "trial".to_string(),
            identifier: "t1".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Record not found: trial with t1");
        assert!(!err.is_remote());
    }

    #[test]
    fn test_already_running_error() {
        assert!(SyncError::AlreadyRunning
            .to_string()
            .contains("already in progress"));
    }
}
