//! Bounded retry for broker I/O.
//!
//! Grounded on `original_source/Brightside/arame/gateway.py`'s
//! `RETRY_OPTIONS = {interval_start: 1, interval_step: 1, interval_max: 1,
//! max_retries: 3}`: three retries at a fixed one-second interval before
//! escalating to [`ChannelFailureError`].

use std::time::Duration;

use tracing::debug;

use crate::errors::{ChannelFailureError, TransientError};

impl Retriable for TransientError {
    fn is_retriable(&self) -> bool { true }
}

/// Whether a raw transport error should be retried or escalated
/// immediately. Transient broker failures (timeouts, reset connections,
/// saturated channel limits) are retriable; protocol-level rejections are
/// not.
pub trait Retriable: std::error::Error + Send + Sync + 'static {
    /// Report whether this error represents a transient condition worth
    /// retrying.
    fn is_retriable(&self) -> bool;
}

/// Bounded, fixed-interval retry policy for broker operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// The interval before the first retry.
    pub start_interval: Duration,
    /// The amount the interval grows after each retry.
    pub step: Duration,
    /// The interval's upper bound.
    pub max_interval: Duration,
    /// The maximum number of retries before escalating.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            start_interval: Duration::from_secs(1),
            step: Duration::from_secs(1),
            max_interval: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// The backoff interval before retry attempt `attempt` (0-indexed).
    #[must_use]
    pub fn interval_for(&self, attempt: u32) -> Duration {
        self.start_interval.saturating_add(self.step.saturating_mul(attempt)).min(self.max_interval)
    }

    /// Run `op`, retrying retriable failures up to `max_retries` times
    /// with this policy's backoff before giving up.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelFailureError`] wrapping the final attempt's error
    /// once the retry budget is exhausted, or immediately for a
    /// non-retriable error.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, ChannelFailureError>
    where
        E: Retriable,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retriable() && attempt < self.max_retries => {
                    let wait = self.interval_for(attempt);
                    debug!(attempt, ?wait, error = %e, "retrying broker operation");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(ChannelFailureError::new(e)),
            }
        }
    }
}
