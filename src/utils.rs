/// Utility functions for timestamps and retrying
use log::debug;
use std::fmt::Display;
use std::future::Future;
use time::{format_description, OffsetDateTime};
use tokio::time::{sleep, Duration};

/// Format a timestamp the way status records carry it
///
/// Converts an OffsetDateTime to YYYY-MM-DD HH:MM:SS format.
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
        .ok()
        .and_then(|format| dt.format(&format).ok())
        .unwrap_or_else(|| dt.to_string())
}

/// Current wall-clock time in the local offset, or UTC when the offset
/// cannot be determined (e.g. multi-threaded runtime on some platforms).
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Run `operation` up to `max_attempts` times, sleeping `backoff` between tries
///
/// Errors for which `is_retryable` returns false are returned immediately.
/// The last error is returned once attempts are exhausted. At least one
/// attempt is always made.
///
/// # Arguments
/// * `max_attempts` - Upper bound on calls to `operation`
/// * `backoff` - Fixed delay between attempts
/// * `is_retryable` - Decides whether an error is worth another attempt
/// * `operation` - Called with the 1-based attempt number
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    max_attempts: usize,
    backoff: Duration,
    is_retryable: R,
    operation: F,
) -> Result<T, E>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) || attempt >= max_attempts => return Err(e),
            Err(e) => debug!("Attempt {}/{} failed: {}", attempt, max_attempts, e),
        }

        if !backoff.is_zero() {
            sleep(backoff).await;
        }
        attempt += 1;
    }
}
