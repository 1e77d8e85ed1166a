//! Retry with exponential backoff for recoverable errors
//!
//! The delay before retry *k* is `initial_interval * multiplier^(k-1)`,
//! capped at `max_interval`. Delays are plain sleeps inside the calling
//! future, so a retried call is still one logical operation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first one (0 means no retries)
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_interval: Duration,

    /// Maximum backoff duration
    pub max_interval: Duration,

    /// Multiplier for backoff between retries
    pub multiplier: f64,

    /// Jitter applied to each delay (0.0 disables it)
    pub randomization_factor: f64,

    /// Maximum total time to spend retrying
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
        }
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RetryConfig {{ max_retries: {}, initial_interval: {:?}, max_interval: {:?}, multiplier: {}, randomization_factor: {}, max_elapsed_time: {:?} }}",
            self.max_retries,
            self.initial_interval,
            self.max_interval,
            self.multiplier,
            self.randomization_factor,
            self.max_elapsed_time
        )
    }
}

/// Executor for retry operations with exponential backoff
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with the specified configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute a fallible operation with retries according to the configuration
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.backoff();
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(attempts = retries + 1, "Operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) if self.should_retry(&err) && retries < self.config.max_retries => {
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!(
                                "Operation failed with retryable error, retrying in {:?} (attempt {}/{}): {}",
                                delay,
                                retries + 1,
                                self.config.max_retries,
                                err
                            );
                            tokio::time::sleep(delay).await;
                            retries += 1;
                        }
                        None => {
                            // Max elapsed time exceeded
                            return Err(err.with_context_value("attempts", retries + 1));
                        }
                    }
                }
                Err(err) => {
                    if retries > 0 {
                        return Err(err.with_context_value("attempts", retries + 1));
                    }
                    return Err(err);
                }
            }
        }
    }

    /// The delay that precedes retry `retry` (1-indexed), without jitter
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.config.multiplier.powi(retry as i32 - 1);
        let delay = self.config.initial_interval.mul_f64(factor);
        delay.min(self.config.max_interval)
    }

    /// Determine if an error should be retried
    fn should_retry(&self, error: &ServiceError) -> bool {
        error.is_retryable()
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            multiplier: self.config.multiplier,
            randomization_factor: self.config.randomization_factor,
            max_elapsed_time: self.config.max_elapsed_time,
            ..ExponentialBackoff::default()
        };
        // Sets current_interval to initial_interval and restarts the elapsed clock
        backoff.reset();
        backoff
    }

    /// Get the current retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(100),
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let retry = RetryExecutor::new(fast_config(3));
        let result = retry.execute(|| async { Ok::<_, ServiceError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_on_failure() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let retry = RetryExecutor::new(fast_config(2));

        let result = retry
            .execute(|| {
                let attempt_count = Arc::clone(&attempt_count);
                async move {
                    if attempt_count.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ServiceError::connect("refused"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_non_retryable_error() {
        let attempt_count = AtomicUsize::new(0);
        let retry = RetryExecutor::new(fast_config(3));

        let result: Result<()> = retry
            .execute(|| {
                attempt_count.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::http(404, "not here")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_retries_exceeded() {
        let attempt_count = AtomicUsize::new(0);
        let retry = RetryExecutor::new(fast_config(2));

        let result: Result<()> = retry
            .execute(|| {
                attempt_count.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::http(503, "unavailable")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3); // Initial + 2 retries
        assert_eq!(err.context().unwrap().data.get("attempts").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_nominal_delays_double() {
        let retry = RetryExecutor::new(RetryConfig::default());
        assert_eq!(retry.nominal_delay(1), Duration::from_secs(1));
        assert_eq!(retry.nominal_delay(2), Duration::from_secs(2));
        assert_eq!(retry.nominal_delay(3), Duration::from_secs(4));
        assert_eq!(retry.nominal_delay(5), Duration::from_secs(10));
    }
}
