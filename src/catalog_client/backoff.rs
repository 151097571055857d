//! Retry policy for catalog requests.
//!
//! Implements exponential backoff with configurable parameters. Rate-limit
//! responses carry their own wait hint and bypass the exponential schedule.

use std::time::Duration;

/// Fallback wait when a 429 response carries no Retry-After header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before permanent failure.
    pub max_attempts: u32,
    /// Initial backoff duration in seconds.
    pub initial_backoff_secs: u64,
    /// Maximum backoff duration in seconds (cap for exponential growth).
    pub max_backoff_secs: u64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Calculate backoff duration for a given retry count.
    ///
    /// Uses exponential backoff: `initial_backoff * multiplier^retry_count`,
    /// capped at `max_backoff_secs`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let backoff =
            self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(retry_count as i32);
        Duration::from_secs(backoff.min(self.max_backoff_secs as f64) as u64)
    }

    /// Check whether another attempt is allowed after `attempts` tries.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_secs: 1,
            max_backoff_secs: 30,
            backoff_multiplier: 2.0,
        }
    }
}
