//! Exponential backoff for durable retries
//!
//! The delay computed here is not slept on. It is added to `now` and stored
//! as the job's `scheduled_at`, so a pending retry survives process restarts.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Longest delay a retry may be pushed out by (one year)
pub const MAX_RETRY_DELAY_SECS: u64 = 365 * 24 * 60 * 60;

/// Configuration for retry backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Base delay in seconds for the first retry
    pub base_delay_secs: u64,

    /// Maximum delay in seconds (caps exponential growth)
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 30,
            max_delay_secs: 3600,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay_secs: u64, max_delay_secs: u64) -> Self {
        Self {
            base_delay_secs,
            max_delay_secs,
        }
    }

    /// Delay before the next attempt after `attempts` executions:
    /// `min(base * 2^(attempts - 1), cap)`, never more than
    /// [`MAX_RETRY_DELAY_SECS`]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let secs = self
            .base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs);

        Duration::seconds(secs.min(MAX_RETRY_DELAY_SECS) as i64)
    }
}
