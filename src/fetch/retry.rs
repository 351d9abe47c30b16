// Retry Policy

use crate::error::BeaconResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Typed retry behavior for transient failures.
///
/// `max_attempts: None` retries forever, which is the steady-state posture of
/// a long-running fetch task: a permanently broken endpoint spins here and is
/// caught by external monitoring, not by the task giving up. Tests use a
/// bounded policy with a zero backoff to observe attempt counts without
/// waiting.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    backoff: Duration,
}

impl RetryPolicy {
    /// Retry forever with a fixed pause between attempts
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    /// Give up after `max_attempts` total attempts
    pub fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `operation` until it succeeds, fails non-retryably, or exhausts
    /// the attempt budget. Only errors whose classification is retryable
    /// re-enter the loop.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> BeaconResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BeaconResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    if let Some(max) = self.max_attempts {
                        if attempt >= max {
                            return Err(error);
                        }
                    }
                    warn!(
                        operation = name,
                        attempt,
                        error = %error,
                        "transient failure, retrying after backoff"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BeaconError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn bounded_policy_observes_attempt_budget() {
        let policy = RetryPolicy::bounded(3, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));

        let counted = Arc::clone(&calls);
        let result: BeaconResult<()> = policy
            .run("always_failing", move || {
                let counted = Arc::clone(&counted);
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(BeaconError::exchange_transient("mock", "down"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_failures_recover_within_budget() {
        let policy = RetryPolicy::bounded(5, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));

        let counted = Arc::clone(&calls);
        let result = policy
            .run("flaky", move || {
                let counted = Arc::clone(&counted);
                async move {
                    if counted.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(BeaconError::exchange_transient("mock", "rate limit"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let policy = RetryPolicy::bounded(10, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));

        let counted = Arc::clone(&calls);
        let result: BeaconResult<()> = policy
            .run("misconfigured", move || {
                let counted = Arc::clone(&counted);
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(BeaconError::configuration("bad url"))
                }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            BeaconError::Configuration { .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
