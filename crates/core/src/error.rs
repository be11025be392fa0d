//! Error types for fieldsync
//!
//! Errors are classified into three severity tiers:
//! - **Recoverable**: a later attempt may succeed (storage busy, file access)
//! - **Degraded**: a single record or operation is affected, the engine continues
//! - **Fatal**: the durable store is unusable until repaired

use std::fmt;
use std::io;
use thiserror::Error;

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// A later attempt may succeed without intervention
    Recoverable,
    /// One record or operation affected, the rest continues
    Degraded,
    /// Local state unusable until repaired
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Main error type for fieldsync
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Database Errors =====
    /// Database operation failed
    #[error("Database error: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database is corrupted and needs repair
    #[error("Database corrupted: {details}")]
    DatabaseCorrupted { details: String },

    /// Database migration failed
    #[error("Migration failed: {version} - {reason}")]
    MigrationFailed { version: String, reason: String },

    /// Record not found in database
    #[error("Record not found: {entity} with {identifier}")]
    RecordNotFound { entity: String, identifier: String },

    /// A local mutation could not be queued, so it was not applied
    #[error("Failed to queue {operation} for {entity}/{identifier}: {reason}")]
    QueueWriteFailed {
        operation: String,
        entity: String,
        identifier: String,
        reason: String,
    },

    /// Stored row could not be decoded
    #[error("Corrupted row in {table}: {reason}")]
    CorruptedRow { table: String, reason: String },

    // ===== Sync Errors =====
    /// Record is not in conflict, so there is nothing to resolve
    #[error("No conflict to resolve for {entity}/{identifier}")]
    NoConflict { entity: String, identifier: String },

    // ===== File System Errors =====
    /// General I/O error
    #[error("I/O error: {message}")]
    IoError {
        message: String,
        #[source]
        source: io::Error,
    },

    // ===== Generic Errors =====
    /// Generic internal error
    #[error("Internal error: {message}")]
    InternalError { message: String },

    /// Invalid argument provided
    #[error("Invalid argument: {argument} - {reason}")]
    InvalidArgument { argument: String, reason: String },
}

impl AppError {
    /// Returns the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::DatabaseError { .. } | Self::IoError { .. } => ErrorSeverity::Recoverable,

            Self::DatabaseCorrupted { .. }
            | Self::MigrationFailed { .. }
            | Self::CorruptedRow { .. } => ErrorSeverity::Fatal,

            _ => ErrorSeverity::Degraded,
        }
    }

    /// Returns a user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            Self::DatabaseError { .. } => {
                "Local storage is temporarily unavailable. Please try again.".to_string()
            }
            Self::DatabaseCorrupted { .. } | Self::CorruptedRow { .. } => {
                "Local storage is damaged and needs repair.".to_string()
            }
            Self::MigrationFailed { .. } => "Failed to upgrade local storage.".to_string(),
            Self::RecordNotFound { .. } => "The requested item was not found.".to_string(),
            Self::QueueWriteFailed { .. } => {
                "The change could not be saved on this device.".to_string()
            }
            Self::NoConflict { .. } => "This item has no conflict to resolve.".to_string(),
            Self::IoError { .. } => "A file operation failed. Please try again.".to_string(),
            Self::InternalError { .. } => {
                "An unexpected error occurred. Please try again.".to_string()
            }
            Self::InvalidArgument { .. } => "Invalid input provided.".to_string(),
        }
    }

    /// Returns true if this error should be logged at ERROR level
    pub fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Helper to create a database error from any error type
    pub fn database<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper to create a corrupted-row error
    pub fn corrupted_row(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptedRow {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        Self::IoError {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError {
            message: format!("JSON error: {}", err),
        }
    }
}
