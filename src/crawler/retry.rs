//! Bounded retry with exponential backoff around a single fetch

use crate::crawler::FetchError;
use std::future::Future;
use std::time::Duration;

/// Upper bound on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How often and how patiently a fetch is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Result of a retried operation plus the number of retries spent on it
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, FetchError>,
    pub retries: u32,
}

/// Runs `op` until it succeeds, fails permanently, or the retry budget is spent
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    retries,
                }
            }
            Err(error) if error.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.backoff(retries);
                tracing::warn!(
                    retry = retries,
                    max_retries = policy.max_retries,
                    ?delay,
                    "{}; retrying",
                    error
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Attempted {
                    result: Err(error),
                    retries,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn server_error() -> FetchError {
        FetchError::HttpStatus {
            url: "https://x/a".to_string(),
            status: 503,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));

        let slow = RetryPolicy::new(5, Duration::from_secs(20));
        assert_eq!(slow.backoff(4), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let attempted = retry_with_backoff(&policy, || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(server_error())
                } else {
                    Ok("body")
                }
            }
        })
        .await;

        assert_eq!(attempted.result.unwrap(), "body");
        assert_eq!(attempted.retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let attempted: Attempted<()> = retry_with_backoff(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(server_error())
            }
        })
        .await;

        assert!(attempted.result.is_err());
        assert_eq!(attempted.retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let attempted: Attempted<()> = retry_with_backoff(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::HttpStatus {
                    url: "https://x/a".to_string(),
                    status: 404,
                })
            }
        })
        .await;

        assert!(attempted.result.is_err());
        assert_eq!(attempted.retries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
