//! Retrying transport for destination API calls
//!
//! Every destination call goes through [`RetryingTransport::call`]:
//!
//! - success returns `Ok(Some(value))`
//! - a "not found" answer is a valid terminal result, `Ok(None)`, never retried
//! - retryable failures wait `base_delay * 2^attempt` and try again
//! - terminal failures, and retryable ones past the last attempt, return `Err`
//!
//! The transport never retries part of a batch; callers own per-item handling.

use intelbridge_common::{IntelError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Maximum attempts for a single destination call
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (0.3s, 0.6s, ...)
pub const BASE_DELAY_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, with no wait between attempts
    pub fn without_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
        }
    }

    /// Wait before the attempt following `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryingTransport {
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `call` under the transport's default policy
    pub async fn call<T, F, Fut>(&self, operation: &str, call: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.call_with(self.policy, operation, call).await
    }

    /// Run `call` under an explicit policy
    pub async fn call_with<T, F, Fut>(
        &self,
        policy: RetryPolicy,
        operation: &str,
        mut call: F,
    ) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let err = match call().await {
                Ok(value) => return Ok(Some(value)),
                Err(e) if e.is_not_found() => {
                    debug!(operation, error = %e, "Destination reported not found");
                    return Ok(None);
                },
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt + 1 < max_attempts {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Destination call failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            last_error = err.to_string();
        }

        error!(
            operation,
            attempts = max_attempts,
            error = %last_error,
            "Exceeded number of retries"
        );
        Err(IntelError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(300));
        assert_eq!(policy.delay_for(1), Duration::from_millis(600));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1200));
        assert_eq!(RetryPolicy::without_backoff(3).delay_for(2), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let transport = RetryingTransport::default();

        let result = transport
            .call("update_event", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(IntelError::network("connection reset"))
                } else {
                    Ok("saved")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, Some("saved"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_terminal_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let transport = RetryingTransport::default();

        let result: Result<Option<()>> = transport
            .call("search", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IntelError::api(500, "Internal error"))
            })
            .await;

        assert!(matches!(result, Err(IntelError::RetriesExhausted { attempts: 3, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_reports_last_error() {
        let transport = RetryingTransport::default();

        let result: Result<Option<()>> = transport
            .call_with(RetryPolicy::without_backoff(1), "update_event", || async {
                Err(IntelError::network("connection reset by peer"))
            })
            .await;

        match result {
            Err(IntelError::RetriesExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 1);
                assert!(last_error.contains("connection reset by peer"));
            },
            other => panic!("expected exhausted retries, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_a_result() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let transport = RetryingTransport::default();

        let result: Option<()> = transport
            .call("get_attribute", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IntelError::api(404, "Invalid attribute"))
            })
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let transport = RetryingTransport::default();

        let result: Result<Option<()>> = transport
            .call("add_event", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IntelError::parse("unexpected body"))
            })
            .await;

        assert!(matches!(result, Err(IntelError::Parse(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
