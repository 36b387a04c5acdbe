// src/services/retry.rs
//! Exponential backoff for idempotent API reads.
//!
//! Only transport failures (connection refused, timeouts) are retried. A
//! response with any status code is returned to the caller as is.

use log::warn;
use std::future::Future;
use std::time::Duration;

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;

/// First delay; doubles each attempt (200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

/// Delay before retry number `attempt` (zero based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt))
}

/// Calls `f` up to `MAX_RETRIES + 1` times until it yields a response.
pub(crate) async fn retry_send<F, Fut>(endpoint: &str, f: F) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                let delay = backoff_delay(attempt);
                warn!(
                    "GET {} failed (attempt {}/{}), retrying in {:?}: {}",
                    endpoint,
                    attempt + 1,
                    MAX_RETRIES,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}
