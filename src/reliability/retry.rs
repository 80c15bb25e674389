//! Fixed-interval retry built on `backon`.
//!
//! # Example
//!
//! ```rust,ignore
//! use dzkeeper::reliability::retry::{retry_async, RetryConfig};
//!
//! let result = retry_async(
//!     RetryConfig::fixed(15, Duration::from_secs(30)),
//!     || async { query_launcher().await },
//!     |e| e.is_retriable(),
//! ).await;
//! ```

use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::constants;

/// How often and how far apart an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(
            constants::READINESS_MAX_RETRIES,
            Duration::from_secs(constants::READINESS_RETRY_DELAY_SECS),
        )
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn build_backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_retries as usize)
    }
}

/// Retry an async operation at a fixed interval.
///
/// Errors rejected by `is_retryable` are returned immediately. Otherwise
/// the last error is returned once `max_retries` retries have failed.
pub async fn retry_async<F, Fut, T, E, R>(
    config: RetryConfig,
    operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let backoff = config.build_backoff();
    let max_retries = config.max_retries;

    let mut attempt = 0u32;
    let notify = |err: &E, dur: Duration| {
        attempt += 1;
        warn!(
            attempt = attempt,
            max_retries = max_retries,
            next_delay_ms = dur.as_millis() as u64,
            error = %err,
            "Attempt failed, will retry"
        );
    };

    operation
        .retry(backoff)
        .when(move |e| is_retryable(e))
        .notify(notify)
        .await
}
