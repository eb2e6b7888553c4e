//! Cancellation-aware retry with exponential backoff for provider calls.

use std::future::Future;
use std::time::Duration;

use aura_providers::ProviderError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.pow(attempt));
        delay.min(self.max_delay)
    }
}

/// Result of a retry-governed call.
#[derive(Debug)]
pub enum RetryResult<T> {
    Success(T),
    /// Retry budget was exhausted or the error was non-retryable.
    Failed { error: ProviderError, attempts: u32 },
    /// The cancellation token fired before the call resolved.
    Canceled,
}

impl<T> RetryResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Run `operation` under retry/backoff, honoring `cancel` at every attempt
/// boundary and sleep. Only `ProviderError { retryable: true, .. }` consumes
/// retry budget — a non-retryable error returns immediately so the caller's
/// fallback chain can advance without waiting out a wasted backoff.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation: F,
) -> RetryResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return RetryResult::Canceled;
        }

        let outcome = tokio::select! {
            result = operation() => result,
            _ = cancel.cancelled() => return RetryResult::Canceled,
        };

        match outcome {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if e.retryable && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    operation = %config.operation_name,
                    attempt,
                    ?delay,
                    error = %e,
                    "retrying after failure"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return RetryResult::Canceled,
                }
            }
            Err(e) => {
                if !e.retryable {
                    debug!(operation = %config.operation_name, error = %e, "non-retryable, returning immediately");
                }
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt + 1,
                };
            }
        }
    }
}

/// Log-suppressing tracker for repeated background failures (heartbeats,
/// reap loops) so a persistent outage doesn't spam the log at full volume.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                consecutive_failures = self.consecutive_failures,
                "recovered after consecutive failures"
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Returns `true` if this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                max_logged_failures = self.max_logged_failures,
                "suppressing further failure logs"
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_types::ErrorCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retryable_error() -> ProviderError {
        ProviderError::new(ErrorCode::Timeout, "test", "timed out")
    }

    fn non_retryable_error() -> ProviderError {
        ProviderError::new(ErrorCode::AuthFailure, "test", "bad credentials")
    }

    #[test]
    fn delay_doubles_with_each_attempt_and_caps() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));

        let capped = RetryConfig::new("test")
            .with_base_delay(Duration::from_secs(1))
            .with_max_retries(10);
        assert!(capped.delay_for_attempt(10) <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let config = RetryConfig::new("test");
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&config, &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>(42) }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&config, &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(retryable_error())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_without_consuming_budget() {
        let config = RetryConfig::new("test").with_max_retries(5);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&config, &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(non_retryable_error()) }
        })
        .await;

        assert!(matches!(result, RetryResult::Failed { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(50));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: RetryResult<i32> =
            retry_with_backoff(&config, &cancel, || async { Err(retryable_error()) }).await;

        assert!(matches!(result, RetryResult::Canceled));
    }

    #[test]
    fn failure_tracker_suppresses_after_threshold() {
        let mut tracker = FailureTracker::new(3);
        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());
        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }
}
