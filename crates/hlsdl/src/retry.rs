// Retry utility: shared bounded retry loop for playlist, key and segment fetching.
//
// Linear backoff (attempt index x delay unit) with an optional jitter and a max delay cap.

use crate::error::DownloadError;
use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff unit. The wait after the failed attempt `n` (0-indexed) is `n * delay_unit`.
    pub delay_unit: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// When true, adds random jitter of [0, delay_unit/2).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_unit: Duration) -> Self {
        Self {
            max_attempts,
            delay_unit,
            ..Self::default()
        }
    }

    /// Compute the delay after a failed attempt (0-indexed).
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let linear = self
            .delay_unit
            .checked_mul(attempt)
            .unwrap_or(self.max_delay);
        let capped = linear.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        // Jitter is limited so the final delay never exceeds `max_delay`.
        let jitter_range_ms = u64::try_from(self.delay_unit.as_millis()).unwrap_or(u64::MAX) / 2;
        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed with a retryable error (network, status, empty payload, decrypt).
    Retry(DownloadError),
    /// Operation failed with an error another attempt cannot fix.
    Fail(DownloadError),
}

/// Execute an async operation with retry-and-backoff.
///
/// The `operation` closure receives the current attempt number (0-indexed).
/// Cancellation is only observed before an attempt starts; a running attempt
/// is never interrupted.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, DownloadError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let err = match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => err,
        };

        attempt += 1;
        if attempt >= max_attempts {
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        warn!(
            attempt,
            max = max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Classify a reqwest error as retryable or non-retryable.
///
/// Retryable: connect, timeout, request, body read, and decode errors.
/// Non-retryable: redirect and builder errors.
pub fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay_unit: Duration::from_millis(1),
            max_delay: Duration::from_secs(1),
            jitter: false,
        }
    }

    #[test]
    fn delay_is_linear_in_attempt_index() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(3));
    }

    #[test]
    fn delay_respects_max_cap() {
        let policy = RetryPolicy {
            max_attempts: 100,
            delay_unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(50), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn delay_with_jitter_does_not_exceed_max_cap() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay_unit: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..32 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn retry_succeeds_on_first_attempt() {
        let token = CancellationToken::new();
        let result =
            retry_with_backoff(&fast_policy(3), &token, |_| async { RetryAction::Success(42u32) })
                .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retry_fails_immediately_on_non_retryable() {
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(&fast_policy(3), &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { RetryAction::Fail(DownloadError::decrypt_fatal("key unavailable")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn retry_exhausts_then_returns_last_error() {
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(&fast_policy(3), &token, |attempt| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                RetryAction::Retry(DownloadError::EmptyPayload {
                    url: format!("attempt-{attempt}"),
                })
            }
        })
        .await;
        // max_attempts counts the initial attempt
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        match result {
            Err(DownloadError::EmptyPayload { url }) => assert_eq!(url, "attempt-2"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_succeeds_on_second_attempt() {
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(3), &token, |attempt| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt == 0 {
                    RetryAction::Retry(DownloadError::decrypt("bad padding"))
                } else {
                    RetryAction::Success(99u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn retry_respects_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<u32, _> =
            retry_with_backoff(&fast_policy(10), &token, |_| async { RetryAction::Success(1u32) })
                .await;
        assert!(matches!(result, Err(DownloadError::Cancelled)));
    }
}
