//! Retry with exponential backoff
//!
//! Used by the batch scheduler to retry transient fetch failures. The caller
//! decides which errors are retryable; everything else fails immediately.

use orderwatch_common::config::RetrySettings;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempt is 1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().into()
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error,
/// exhausts `policy.max_attempts`, or `stop` is cancelled during a backoff.
///
/// Returns the final result together with the number of attempts made.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    operation_name: &str,
    policy: &RetryPolicy,
    stop: &CancellationToken,
    is_retryable: R,
    mut operation: F,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying");
        }

        let err = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Succeeded after retry"
                    );
                }
                return (Ok(result), attempt);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            return (Err(err), attempt);
        }

        if attempt >= max_attempts {
            tracing::warn!(
                operation = operation_name,
                attempt,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                error = %err,
                "Giving up: max attempts reached"
            );
            return (Err(err), attempt);
        }

        if stop.is_cancelled() {
            tracing::debug!(operation = operation_name, attempt, "Stop requested, not retrying");
            return (Err(err), attempt);
        }

        let backoff = policy.backoff_for(attempt);
        tracing::warn!(
            operation = operation_name,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Transient failure, will retry after backoff"
        );

        tokio::select! {
            _ = stop.cancelled() => {
                tracing::debug!(operation = operation_name, attempt, "Stop requested during backoff");
                return (Err(err), attempt);
            }
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(8000));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = retry_with_backoff(
            "test",
            &fast_policy(3),
            &CancellationToken::new(),
            |_: &String| true,
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok(42)
                }
            },
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = retry_with_backoff(
            "test",
            &fast_policy(5),
            &CancellationToken::new(),
            |_: &String| false,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("bad request".to_string())
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let (result, attempts) = retry_with_backoff(
            "test",
            &fast_policy(3),
            &CancellationToken::new(),
            |_: &String| true,
            || async { Err::<(), _>("down".to_string()) },
        )
        .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_stop_abandons_retries() {
        let stop = CancellationToken::new();
        stop.cancel();
        let (result, attempts) = retry_with_backoff(
            "test",
            &fast_policy(10),
            &stop,
            |_: &String| true,
            || async { Err::<(), _>("down".to_string()) },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
