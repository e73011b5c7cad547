//! Retry with exponential backoff for embedding calls.
//!
//! Only errors for which [`EmbeddingError::is_retryable`] holds are retried;
//! the delay doubles after every failed attempt.

use std::future::Future;
use std::time::Duration;

use docrag_core::EmbeddingError;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means a single try.
    pub retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: 3, initial_backoff: Duration::from_millis(250) }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, initial_backoff: Duration) -> Self {
        Self { retries, initial_backoff }
    }

    pub fn no_retry() -> Self {
        Self { retries: 0, initial_backoff: Duration::ZERO }
    }

    /// Delay before retry number `retry` (0-based): `initial * 2^retry`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.initial_backoff.saturating_mul(1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX))
    }
}

/// Run `op` until it succeeds, fails fatally, or the retry budget is spent.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, EmbeddingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EmbeddingError>>,
{
    let mut retry = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if retry >= policy.retries => {
                if policy.retries == 0 {
                    return Err(err);
                }
                return Err(EmbeddingError::RetriesExhausted { attempts: retry + 1, last: Box::new(err) });
            }
            Err(err) => {
                let delay = policy.delay_for_retry(retry);
                warn!(attempt = retry + 1, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), error = %err, "embedding call failed, retrying");
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}
