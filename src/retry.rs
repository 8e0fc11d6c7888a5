/// Uniform retry-with-backoff for every external call site.
use std::future::Future;
use std::time::Duration;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further one.
    pub base_delay: Duration,
    /// Hard limit on a single attempt.
    pub call_timeout: Duration,
    /// Courtesy pause before every attempt, for rate-limited services.
    pub inter_call_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            call_timeout: Duration::from_secs(30),
            inter_call_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Sleep after failed attempt number `attempt` (0-based): `base * 2^attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Result of a retried call plus how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, AppError>,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. Each attempt runs under the call timeout.
pub async fn with_retry_counted<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if !policy.inter_call_delay.is_zero() {
            tokio::time::sleep(policy.inter_call_delay).await;
        }

        let outcome = match tokio::time::timeout(policy.call_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "{} exceeded {:?}",
                label, policy.call_timeout
            ))),
        };
        attempt += 1;

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("✓ {} succeeded on attempt {}", label, attempt);
                }
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if !e.is_transient() || attempt >= max_attempts => {
                tracing::warn!(
                    "❌ {} failed after {} attempt(s): {}",
                    label,
                    attempt,
                    e
                );
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) => {
                let delay = policy.delay_after(attempt - 1);
                tracing::warn!(
                    "⚠ {} attempt {}/{} failed: {} (retrying in {:?})",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// [`with_retry_counted`] without the attempt count.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    with_retry_counted(policy, label, op).await.result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            call_timeout: Duration::from_millis(200),
            inter_call_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(0), Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome = with_retry_counted(&fast_policy(), "flaky", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::ExternalApiError("503".to_string()))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(outcome.result.unwrap(), "done");
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), AppError> = with_retry(&fast_policy(), "down", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::ExternalApiError("connection refused".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome: Attempted<()> = with_retry_counted(&fast_policy(), "bad input", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::BadRequest("invalid recipient".to_string()))
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let outcome: Attempted<()> = with_retry_counted(&fast_policy(), "slow", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(outcome.result, Err(AppError::Timeout(_))));
        assert_eq!(outcome.attempts, 3);
    }
}
