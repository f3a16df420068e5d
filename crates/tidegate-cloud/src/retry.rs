//! Bounded retry with exponential backoff for transient provider faults.
//!
//! Only faults the provider marks transient (network, rate limits) are
//! retried, and only a bounded number of times. Everything else surfaces
//! immediately.

use crate::clock::Clock;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Retry policy for provider read operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (0-indexed), capped at
    /// `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        delay.min(self.max_delay_ms as f64) as u64
    }
}

/// Run `op`, retrying transient failures within the policy's budget.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, clock: &dyn Clock, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay_ms = policy.delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms, error = %err, "Retrying transient provider fault");
                clock.sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CloudError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(0), 1000);
        assert_eq!(policy.delay_for_attempt(1), 2000);
        assert_eq!(policy.delay_for_attempt(2), 4000);
        assert_eq!(policy.delay_for_attempt(3), 8000);
        assert_eq!(policy.delay_for_attempt(4), 10_000); // capped at max
    }

    #[tokio::test]
    async fn test_transient_fault_is_retried() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result = with_retry(&RetryPolicy::default(), &clock, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CloudError::Transient("rate limited".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_fault_is_not_retried() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&RetryPolicy::default(), &clock, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CloudError::Api("bad request".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&RetryPolicy::default(), &clock, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CloudError::Transient("still down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(CloudError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
