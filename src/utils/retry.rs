//! Bounded retry with exponential backoff for transient storage conflicts.
//!
//! Only [`EventDeskError::StorageConflict`] is retried. Every other error,
//! in particular capacity and lifecycle rejections, is returned on the first
//! attempt so a capacity check is never repeated without re-validation.

use std::future::Future;
use std::time::Duration;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use crate::config::LedgerConfig;
use crate::utils::errors::{EventDeskError, Result};

/// Retry policy configuration for exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for the exponential delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl From<&LedgerConfig> for RetryPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits, for tests
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay for a given retry number: `initial * multiplier^attempt`, capped.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }

    fn jittered(&self, attempt: usize) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if base.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
        (base + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

/// Run `op`, retrying storage conflicts according to `policy`.
pub async fn retry_transient<F, Fut, T>(operation: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation, attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(EventDeskError::StorageConflict(reason)) => {
                if attempt >= policy.max_retries {
                    warn!(operation = operation, attempts = attempt + 1, reason = %reason, "Retry bound exhausted");
                    return Err(EventDeskError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt + 1,
                    });
                }
                let delay = policy.jittered(attempt);
                debug!(operation = operation, attempt = attempt, delay_ms = delay.as_millis() as u64, reason = %reason, "Storage conflict, retrying");
                sleep(delay).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use assert_matches::assert_matches;

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(8), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = retry_transient("reserve", &RetryPolicy::immediate(3), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EventDeskError::StorageConflict("row busy".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bound_surfaces_hard_error() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<()> = retry_transient("reserve", &RetryPolicy::immediate(2), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EventDeskError::StorageConflict("row busy".into()))
        })
        .await;

        assert_matches!(result, Err(EventDeskError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<()> = retry_transient("reserve", &RetryPolicy::immediate(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EventDeskError::InvalidInput("quantity".into()))
        })
        .await;

        assert_matches!(result, Err(EventDeskError::InvalidInput(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
