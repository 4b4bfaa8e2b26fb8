//! Bounded retry with exponential backoff for fallible async operations.
//!
//! An explicit loop carries `(remaining, delay)` instead of recursing, so the
//! call stack stays flat no matter how many attempts are configured.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// Invoke `operation`, retrying on failure up to `attempts` more times with a
/// doubling delay between tries.
///
/// `attempts` counts retries after the first failure: an operation that fails
/// exactly `k` times and then succeeds is invoked `k + 1` times whenever
/// `attempts >= k`. On exhaustion the last failure is returned unmodified.
pub async fn run_with_retry<T, E, F, Fut>(
    mut operation: F,
    attempts: u32,
    initial_delay: Duration,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut remaining = attempts;
    let mut delay = initial_delay;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if remaining > 0 => {
                warn!(
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    attempts_left = remaining,
                    "Call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                remaining -= 1;
                delay *= 2;
            }
            Err(e) => {
                error!(error = %e, "Call failed after all retries");
                return Err(e);
            }
        }
    }
}
