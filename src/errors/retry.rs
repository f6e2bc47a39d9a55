use std::time::Duration;
use std::future::Future;

use super::classification::ErrorClassification;
use super::types::KevError;
use crate::utils::clock::Clock;
use tracing::warn;

impl ErrorClassification {
    /// Calculate the retry delay for this error classification based on the
    /// current attempt number (0-indexed).
    ///
    /// - RateLimitError: base * 2^(attempt + 1), capped at `max_delay`
    /// - Default: base * 2^attempt plus optional jitter (0..base), capped at `max_delay`
    pub fn retry_delay(&self, attempt: u32, config: &RetryConfig) -> Duration {
        let exponent = match self.error_type {
            "RateLimitError" => attempt.saturating_add(1),
            _ => attempt,
        };
        let factor = 2u32.saturating_pow(exponent);
        let mut delay = config.base_delay.saturating_mul(factor);

        if config.jitter && self.error_type != "RateLimitError" {
            let jitter: f64 = rand::random::<f64>();
            delay = delay.saturating_add(config.base_delay.mul_f64(jitter));
        }

        delay.min(config.max_delay)
    }
}

/// Retry configuration for upstream requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Execute an async operation with bounded retry.
///
/// Retries only if the error is classified as retryable and attempts remain.
/// Waiting goes through `clock` so callers can substitute a fake one.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    clock: &dyn Clock,
    mut factory: F,
) -> Result<T, KevError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, KevError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable || attempt + 1 >= max_attempts {
                    if !classification.retryable {
                        warn!(
                            operation = operation_name,
                            error_type = classification.error_type,
                            error = %e,
                            "Non-retryable error, failing immediately"
                        );
                    } else {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = max_attempts,
                            error = %e,
                            "Max retries exhausted"
                        );
                    }
                    return Err(e);
                }

                let delay = classification.retry_delay(attempt, config);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after error"
                );

                clock.sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| KevError::Internal("Retry loop exited unexpectedly".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::FakeClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }

    #[test]
    fn test_retry_delay_rate_limit() {
        let class = ErrorClassification { error_type: "RateLimitError", retryable: true };
        let config = no_jitter();
        assert_eq!(class.retry_delay(0, &config), Duration::from_secs(2));
        assert_eq!(class.retry_delay(1, &config), Duration::from_secs(4));
        assert_eq!(class.retry_delay(2, &config), Duration::from_secs(8));
        assert_eq!(class.retry_delay(9, &config), Duration::from_secs(30)); // capped
    }

    #[test]
    fn test_retry_delay_default_exponential() {
        let class = ErrorClassification { error_type: "NetworkError", retryable: true };
        let config = no_jitter();
        assert_eq!(class.retry_delay(0, &config), Duration::from_secs(1));
        assert_eq!(class.retry_delay(1, &config), Duration::from_secs(2));
        assert_eq!(class.retry_delay(40, &config), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_delay_jitter_bounds() {
        let class = ErrorClassification { error_type: "NetworkError", retryable: true };
        let config = RetryConfig { jitter: true, ..no_jitter() };
        let d1 = class.retry_delay(1, &config);
        // 2^1 + jitter = ~2-3s
        assert!(d1.as_secs_f64() >= 2.0 && d1.as_secs_f64() < 3.0);
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let clock = FakeClock::new();
        let result = with_retry("test", &no_jitter(), &clock, || async {
            Ok::<_, KevError>(42)
        }).await;
        assert_eq!(result.unwrap(), 42);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let clock = FakeClock::new();

        let result = with_retry("test", &no_jitter(), &clock, || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(KevError::InvalidResponse("bad body".into()))
            }
        }).await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_bounded_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let clock = FakeClock::new();

        let result = with_retry("test", &no_jitter(), &clock, || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(KevError::Network("connection reset".into()))
            }
        }).await;

        assert!(matches!(result, Err(KevError::Network(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        // No sleep after the final attempt
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_with_retry_recovers_after_rate_limits() {
        let attempts = Arc::new(AtomicU32::new(0));
        let clock = FakeClock::new();

        let result = with_retry("test", &no_jitter(), &clock, || {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(KevError::RateLimited("HTTP 429".into()))
                } else {
                    Ok("scored")
                }
            }
        }).await;

        assert_eq!(result.unwrap(), "scored");
        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 3);
        assert!(sleeps.windows(2).all(|w| w[0] < w[1]));
    }
}
