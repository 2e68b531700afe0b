//! Retry logic for status polling with exponential backoff and error classification.
//!
//! Decides whether a failed status fetch is retried, and how long to wait before
//! the next attempt. The default retries forever at the poll interval; a bounded
//! policy is opt-in.

use crate::error::IntakeError;
use std::time::Duration;

/// Error classification for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Client errors (400-499) - retrying will not help
    Client,
    /// Server errors (500-599) - temporary issues, retry with backoff
    Server,
    /// Network errors - connection issues, retry with backoff
    Network,
}

/// Classify a fetch failure into an ErrorType
pub fn classify_error(error: &IntakeError) -> ErrorType {
    match error.status_code() {
        Some(status) if (400..500).contains(&status) => ErrorType::Client,
        Some(status) if status >= 500 => ErrorType::Server,
        // Decode errors and anything without a status are treated as transient
        _ => ErrorType::Network,
    }
}

/// Retry policy for failed status fetches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRetryPolicy {
    /// Consecutive failures tolerated before polling is abandoned; `None` retries forever
    pub max_consecutive_failures: Option<u32>,
    /// Growth factor applied to the poll interval per consecutive failure
    pub backoff_base: u32,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

/// Failed fetches are logged and retried on the next tick, forever
impl Default for PollRetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl PollRetryPolicy {
    /// Keep retrying forever at the fixed interval
    pub fn unbounded() -> Self {
        Self {
            max_consecutive_failures: None,
            backoff_base: 1,
            max_backoff: Duration::MAX,
        }
    }

    /// Opt-in policy: exponential backoff capped at 30s, give up after
    /// `max_failures` consecutive failures or on the first client error
    pub fn bounded(max_failures: u32) -> Self {
        Self {
            max_consecutive_failures: Some(max_failures),
            backoff_base: 2,
            max_backoff: Duration::from_secs(30),
        }
    }

    /// Whether another fetch should be attempted after `consecutive_failures` failures in a row
    pub fn should_retry(&self, error_type: ErrorType, consecutive_failures: u32) -> bool {
        let Some(max) = self.max_consecutive_failures else {
            return true;
        };

        error_type != ErrorType::Client && consecutive_failures < max
    }

    /// Delay before the next fetch: `interval * base^(failures - 1)`, capped
    pub fn delay_after(&self, consecutive_failures: u32, interval: Duration) -> Duration {
        if consecutive_failures == 0 {
            return interval;
        }

        let factor = self
            .backoff_base
            .max(1)
            .saturating_pow(consecutive_failures - 1);
        interval
            .saturating_mul(factor)
            .min(self.max_backoff.max(interval))
    }
}
