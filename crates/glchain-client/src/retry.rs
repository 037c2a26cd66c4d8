//! Retry and backoff policy
//!
//! Kept free of any transport types so the decision logic can be tested
//! without a network.

use std::time::Duration;

/// What the last failed attempt told us
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// HTTP status, `None` for connection-level failures
    pub status: Option<u16>,
    /// `Retry-After` hint from the response
    pub retry_after: Option<Duration>,
}

impl ResponseMeta {
    pub fn from_status(status: u16) -> Self {
        Self {
            status: Some(status),
            retry_after: None,
        }
    }

    /// Connection-level failure without a status
    pub fn connection_error() -> Self {
        Self::default()
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// 429 and any 5xx are worth another try
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Whether a failure described by `meta` may be retried at all
pub fn is_retryable(meta: &ResponseMeta) -> bool {
    meta.status.is_none_or(is_retryable_status)
}

/// Delay before retry number `attempt` (0-based)
///
/// A `Retry-After` hint wins; otherwise `base * 2^attempt`.
pub fn backoff_delay(attempt: u32, meta: &ResponseMeta, base: Duration) -> Duration {
    if let Some(retry_after) = meta.retry_after {
        return retry_after;
    }
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base for exponential backoff
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Decide whether to retry after `attempt` (0-based) failed with `meta`
    ///
    /// Returns the delay to wait, or `None` to give up.
    pub fn next_delay(&self, attempt: u32, meta: &ResponseMeta) -> Option<Duration> {
        if attempt >= self.max_retries || !is_retryable(meta) {
            return None;
        }
        Some(backoff_delay(attempt, meta, self.base_delay))
    }
}
