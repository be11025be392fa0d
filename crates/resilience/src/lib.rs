//! Resilience patterns for the sync transport
//!
//! This crate provides:
//! - Retry with exponential backoff, for idempotent requests only
//! - A circuit breaker that makes an unreachable remote store fail fast
//!
//! # Example
//!
//! ```rust
//! use fieldsync_resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3).with_initial_delay(Duration::from_millis(100));
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(5, Duration::from_secs(30)));
//! assert!(breaker.check().is_ok());
//! assert_eq!(policy.max_attempts(), 3);
//! ```

mod circuit_breaker;
mod error;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{ResilienceError, ResilienceResult};
pub use retry::{with_retry, RetryPolicy};
