//! Retry utilities with linear backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::models::PipelineConfig;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt. Attempt `n` waits `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Delay applied after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl From<&PipelineConfig> for RetryConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

/// Retry result indicating what happened.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed after all attempts.
    Failed { last_error: E, attempts: u32 },
}

/// Execute an async operation with linear backoff.
///
/// Every failure is retried until `max_attempts` is reached. The backoff sleep
/// follows every failed attempt, the last one included. The operation receives
/// the 1-based attempt number.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(value) => return RetryResult::Success(value),
            Err(error) => {
                let delay = config.delay_for(attempts);
                tracing::warn!(
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed"
                );

                sleep(delay).await;

                if attempts >= max_attempts {
                    return RetryResult::Failed {
                        last_error: error,
                        attempts,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TransientError(String);

    impl Display for TransientError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_linear_delays() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(500));
        assert_eq!(config.delay_for(2), Duration::from_millis(1000));
        assert_eq!(config.delay_for(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_from_pipeline_config() {
        let config = RetryConfig::from(&PipelineConfig::default());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(3), |_| async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransientError>("success")
        })
        .await;

        match result {
            RetryResult::Success(v) => assert_eq!(v, "success"),
            _ => panic!("expected success"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_retries() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(3), |attempt| {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(attempt, count + 1);
                if count < 2 {
                    Err(TransientError("transient error".to_string()))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        match result {
            RetryResult::Success(v) => assert_eq!(v, "success"),
            _ => panic!("expected success"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(3), |_| async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TransientError("permanent error".to_string()))
        })
        .await;

        match result {
            RetryResult::Failed {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.0, "permanent error");
            }
            _ => panic!("expected failure"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast(0), |_| async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TransientError("boom".to_string()))
        })
        .await;

        assert!(matches!(result, RetryResult::Failed { attempts: 1, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
