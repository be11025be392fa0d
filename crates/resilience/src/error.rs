//! Error types for resilience operations

use thiserror::Error;

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Errors that can occur in resilience operations
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Circuit breaker is open; the request was not attempted
    #[error("Circuit breaker is open after {failures} failures, next attempt in {retry_in:?}")]
    CircuitOpen {
        failures: usize,
        retry_in: std::time::Duration,
    },

    /// Shared breaker state is unusable
    #[error("Circuit breaker state lock poisoned")]
    LockPoisoned,
}
