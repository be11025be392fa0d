//! Retry policies with exponential backoff

use log::debug;
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first attempt)
    max_attempts: usize,
    /// Initial delay between retries
    initial_delay: Duration,
    /// Maximum delay between retries
    max_delay: Duration,
    /// Backoff multiplier
    multiplier: f64,
    /// Whether to use jitter
    use_jitter: bool,
}

impl RetryPolicy {
    /// Creates a new retry policy
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            use_jitter: true,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self::new(1)
    }

    /// Sets the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets whether to use jitter
    pub fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Calculates the delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi((attempt - 1) as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.use_jitter {
            // Deterministic spread between 75% and 100%
            let jitter_factor = 0.75 + (attempt as f64 * 0.1 % 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Returns the maximum number of attempts
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs `operation` until it succeeds, the error is not retryable, or the
/// policy runs out of attempts
///
/// The last error is returned unchanged so callers keep their own error type.
pub async fn with_retry<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < policy.max_attempts() && should_retry(&e) => {
                let delay = policy.delay_for_attempt(attempt);
                debug!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    policy.max_attempts(),
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }

    #[test]
    fn test_retry_policy_builder() {
        let policy = RetryPolicy::new(5)
            .with_initial_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_secs(2))
            .with_multiplier(3.0)
            .with_jitter(false);

        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 3.0);
        assert!(!policy.use_jitter);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::new(4)
            .with_initial_delay(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_capping() {
        let policy = RetryPolicy::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(false);

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let policy = RetryPolicy::new(3).with_initial_delay(Duration::from_millis(1));
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result = with_retry(
            &policy,
            |_: &String| true,
            move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {} failed", n))
                } else {
                    Ok(42)
                }
            },
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let policy = RetryPolicy::new(2).with_initial_delay(Duration::from_millis(1));
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result: Result<(), String> = with_retry(
            &policy,
            |_: &String| true,
            move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {}", n))
            },
        )
        .await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::new(5).with_initial_delay(Duration::from_millis(1));
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result: Result<(), String> = with_retry(
            &policy,
            |e: &String| !e.contains("404"),
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("HTTP 404".to_string())
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
