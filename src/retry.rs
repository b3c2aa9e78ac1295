//! Bounded retry for provider calls.
//!
//! Every provider access in the pipeline, generation and classification
//! alike, goes through [`with_retry`] so 429 handling is uniform. Only
//! rate-limit errors spend retry budget; anything else is rethrown
//! immediately without incurring the backoff wait.

use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait between rate-limited attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Retry policy for a provider call.
///
/// The defaults are the pipeline-wide policy constants; call sites can
/// override them per invocation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (total attempts = retries + 1).
    pub max_retries: u32,
    /// Wait between attempts, unless the provider suggested its own.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

/// Passed to the `on_retry` callback before each backoff wait.
#[derive(Debug, Clone, Copy)]
pub struct RetryAttempt {
    /// The retry about to be made (1-based).
    pub attempt: u32,
    /// Retry budget for this invocation.
    pub max_retries: u32,
    /// How long the executor is about to wait.
    pub delay: Duration,
}

/// Run `op`, retrying on rate-limit errors up to the policy budget.
///
/// Non-rate-limit errors are returned immediately with the budget untouched.
/// For each retry the (possibly async) `on_retry` callback runs before the
/// wait, so callers can surface progress to observers during the backoff.
/// A provider-supplied `retry_after` overrides the policy delay. When the
/// budget is exhausted the last error is returned.
pub async fn with_retry<T, Op, Fut, Cb, CbFut>(
    policy: &RetryPolicy,
    mut op: Op,
    mut on_retry: Cb,
) -> Result<T, ProviderError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    Cb: FnMut(RetryAttempt) -> CbFut,
    CbFut: Future<Output = ()>,
{
    let mut retries: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_rate_limited() => return Err(err),
            Err(err) => {
                if retries >= policy.max_retries {
                    warn!(
                        retries,
                        "retry budget exhausted while provider is rate limiting"
                    );
                    return Err(err);
                }
                retries += 1;

                let delay = match &err {
                    ProviderError::RateLimited {
                        retry_after: Some(suggested),
                    } => *suggested,
                    _ => policy.delay,
                };

                on_retry(RetryAttempt {
                    attempt: retries,
                    max_retries: policy.max_retries,
                    delay,
                })
                .await;

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    fn rate_limited() -> ProviderError {
        ProviderError::RateLimited { retry_after: None }
    }

    #[tokio::test]
    async fn test_success_is_single_invocation() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            &fast_policy(3),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ProviderError>(42) }
            },
            |_| async {},
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_always_rate_limited_exhausts_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            &fast_policy(2),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            },
            |_| async {},
        )
        .await;
        // maxRetries = 2 means exactly 3 invocations, then the last error.
        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_rethrows_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            &fast_policy(3),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Provider("invalid argument".into())) }
            },
            |_| async {},
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let op_calls = Arc::clone(&calls);
        let result = with_retry(
            &fast_policy(3),
            move || {
                let n = op_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("done")
                    }
                }
            },
            |_| async {},
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_on_retry_sees_attempt_numbers() {
        let observed: Arc<Mutex<Vec<(u32, u32)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let result: Result<(), _> = with_retry(
            &fast_policy(2),
            || async { Err(rate_limited()) },
            move |attempt| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock()
                        .unwrap()
                        .push((attempt.attempt, attempt.max_retries));
                }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(*observed.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[tokio::test]
    async fn test_retry_after_overrides_policy_delay() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let result: Result<(), _> = with_retry(
            &fast_policy(1),
            || async {
                Err(ProviderError::RateLimited {
                    retry_after: Some(Duration::from_millis(5)),
                })
            },
            move |attempt| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(attempt.delay);
                }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(*observed.lock().unwrap(), vec![Duration::from_millis(5)]);
    }
}
