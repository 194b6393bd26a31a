//! Bounded retry with exponential backoff
//!
//! Every outbound call in the pipeline (text generation, speech synthesis,
//! storage upload) goes through this helper. The caller supplies a
//! retryability predicate so validation failures are never retried, only
//! transport-class errors.

use std::future::Future;
use std::time::Duration;

/// Retry policy: attempt cap plus backoff shape
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Text generation: expensive calls, fail fast
    pub fn text_generation() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }

    /// Speech synthesis: per-chunk calls, worth more patience
    pub fn speech() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(10),
        }
    }

    /// Storage upload
    pub fn upload() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Run `operation` up to `policy.max_attempts` times.
///
/// Backoff doubles between attempts, capped at `policy.max_backoff`. Errors
/// for which `is_retryable` returns false propagate immediately. The `label`
/// distinguishes callers in the logs.
pub async fn retry_with_backoff<F, Fut, T, E>(
    label: &str,
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(operation = label, attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        operation = label,
                        attempt,
                        error = %err,
                        "Operation failed, retry attempts exhausted"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = label,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Operation failed, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}
