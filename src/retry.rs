//! Retry with exponential backoff for remote-service calls
//!
//! Every remote call the gateway makes (STT, intent parsing, device control,
//! notifications) goes through [`with_retry`] so that no component grows its
//! own backoff logic.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Retry policy for remote-service calls
///
/// Controls how many times a failed call is attempted and how long to wait
/// between attempts using capped exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first); must be at least 1
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Cap applied to the growing delay
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Whether an HTTP status is worth annotating as retryable: rate limits
/// (429), service unavailable (503), gateway timeout (504), and other 5xx.
///
/// Note: this classification labels error messages; it does not gate whether
/// a retry happens. [`with_retry`] retries every failure except cancellation.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::SERVICE_UNAVAILABLE
        || status == StatusCode::GATEWAY_TIMEOUT
        || status.is_server_error()
}

/// Invoke `operation` up to `policy.max_attempts` times with exponential
/// backoff between failures.
///
/// Cancellation is never retried: an [`Error::Cancelled`] failure, or the
/// token firing, returns immediately — including mid-backoff, so shutdown is
/// prompt even during a long wait. After the final attempt the last observed
/// failure is returned as-is.
///
/// # Errors
///
/// Returns the last failure once attempts are exhausted, or
/// [`Error::Cancelled`] if the token fires first.
pub async fn with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if err.is_cancellation() {
                    return Err(err);
                }
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if attempt == attempts {
                    return Err(err);
                }

                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );

                tokio::select! {
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }

                delay = delay.mul_f64(policy.multiplier).min(policy.max_delay);
            }
        }
    }

    unreachable!("loop returns on the final attempt")
}
