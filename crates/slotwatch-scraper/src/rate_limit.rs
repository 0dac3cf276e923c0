//! Bounded retry with exponential backoff for page navigation.
//!
//! Transient failures (network errors, timeouts, 429, 5xx) are retried up to
//! the configured number of attempts. Anything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::ScraperError;

const MAX_DELAY_MS: u64 = 60_000;

/// Returns `true` if `err` is worth another navigation attempt.
///
/// Retriable:
/// - [`ScraperError::Http`]: connection reset, DNS failure, timeout.
/// - [`ScraperError::RateLimited`]: HTTP 429.
/// - [`ScraperError::UnexpectedStatus`] with a 5xx status.
///
/// Everything else (4xx, bad URLs, local I/O) is permanent.
pub(crate) fn is_retriable(err: &ScraperError) -> bool {
    match err {
        ScraperError::Http(_) | ScraperError::RateLimited { .. } => true,
        ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
        ScraperError::InvalidUrl { .. }
        | ScraperError::Io { .. }
        | ScraperError::ExportParse { .. }
        | ScraperError::NoExport { .. } => false,
    }
}

/// Runs `operation` up to `attempts` times in total.
///
/// Before attempt `n` (1-based, n ≥ 2) the task sleeps
/// `backoff_base_ms * 2^(n-2)` milliseconds ± 25 % jitter, capped at 60 s.
/// With `attempts = 3` and `backoff_base_ms = 1_000` the waits are roughly
/// 1 s and 2 s. The last error is returned once attempts are exhausted.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    attempts: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= attempts {
                    return Err(err);
                }

                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    attempts,
                    delay_ms,
                    error = %err,
                    "navigation attempt failed, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}
