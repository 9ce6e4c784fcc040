use std::future::Future;
use std::time::{Duration, Instant};

use super::ProviderError;

/// Bounded exponential backoff: 1s, 2s, 4s, ... capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Runs `op` until it succeeds, fails permanently, or exhausts the attempt
/// budget. Attempt count and elapsed time are explicit loop state; only
/// errors marked retryable are retried.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let started = Instant::now();
    let mut delay = policy.base_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if !e.retryable => return Err(e),
            Err(e) if attempt >= policy.max_attempts.max(1) => {
                tracing::warn!(
                    attempts = attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    kind = e.kind.as_str(),
                    "retry budget exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = e.kind.as_str(),
                    "transient provider failure, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FailureKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let out = with_retry(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::new(FailureKind::RateLimited, "429"))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, _> = with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::permanent(FailureKind::Auth, "bad key")) }
        })
        .await;
        assert_eq!(out.unwrap_err().kind, FailureKind::Auth);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, _> = with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::new(FailureKind::Unknown, "503")) }
        })
        .await;
        assert_eq!(out.unwrap_err().kind, FailureKind::Unknown);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
