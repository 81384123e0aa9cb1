//! Caller-driven retry with exponential backoff

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Upper bound on a single backoff sleep
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Run `operation` up to `max_attempts` times, doubling the delay after each
/// retryable failure. Non-retryable errors (see [`crate::Error::is_retryable`])
/// are returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    let mut backoff = base_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if !e.is_retryable() || attempt >= max_attempts {
                    return Err(e);
                }

                warn!(
                    "Operation failed (attempt {}), retrying in {:?}: {}",
                    attempt, backoff, e
                );
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff.saturating_mul(2), MAX_BACKOFF);
            }
        }
    }
}
