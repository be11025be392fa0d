//! Circuit breaker
//!
//! Counts consecutive failures of a remote endpoint. Once the threshold is
//! reached the breaker opens and callers fail fast until the cool-down has
//! elapsed; then a limited number of probe calls decide whether it closes
//! again.

use crate::error::{ResilienceError, ResilienceResult};
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected without being attempted
    Open,
    /// Cool-down elapsed, probe requests are let through
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    cool_down: Duration,
    success_threshold: usize,
}

impl CircuitBreakerConfig {
    /// Opens after `failure_threshold` consecutive failures for `cool_down`
    pub fn new(failure_threshold: usize, cool_down: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cool_down,
            success_threshold: 1,
        }
    }

    /// Sets how many probe successes close a half-open breaker
    pub fn with_success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    pub fn cool_down(&self) -> Duration {
        self.cool_down
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    opened_at: Option<Instant>,
}

/// Shared circuit breaker; clones observe the same state
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Creates a closed circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            })),
        }
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.state
            .lock()
            .map(|s| s.state)
            .unwrap_or(CircuitState::Open)
    }

    /// Consecutive failures seen since the last success
    pub fn failure_count(&self) -> usize {
        self.state.lock().map(|s| s.failure_count).unwrap_or(0)
    }

    /// Checks whether a request may be attempted
    ///
    /// An open breaker whose cool-down has elapsed moves to half-open and
    /// lets the request through.
    pub fn check(&self) -> ResilienceResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ResilienceError::LockPoisoned)?;

        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);

                if elapsed >= self.config.cool_down {
                    debug!("Circuit breaker half-open after {:?}", elapsed);
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen {
                        failures: state.failure_count,
                        retry_in: self.config.cool_down - elapsed,
                    })
                }
            }
        }
    }

    /// Records a successful request
    pub fn record_success(&self) {
        if let Ok(mut state) = self.state.lock() {
            match state.state {
                CircuitState::HalfOpen => {
                    state.success_count += 1;
                    if state.success_count >= self.config.success_threshold {
                        debug!("Circuit breaker closed");
                        state.state = CircuitState::Closed;
                        state.failure_count = 0;
                        state.success_count = 0;
                        state.opened_at = None;
                    }
                }
                CircuitState::Closed => {
                    state.failure_count = 0;
                }
                CircuitState::Open => {}
            }
        }
    }

    /// Records a failed request
    pub fn record_failure(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failure_count += 1;
            state.success_count = 0;

            let trips = state.state == CircuitState::HalfOpen
                || state.failure_count >= self.config.failure_threshold;
            if trips && state.state != CircuitState::Open {
                warn!(
                    "Circuit breaker opened after {} consecutive failures",
                    state.failure_count
                );
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
        }
    }

    /// Resets the breaker to closed
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.state = CircuitState::Closed;
            state.failure_count = 0;
            state.success_count = 0;
            state.opened_at = None;
        }
    }
}
