use foundation::time::Time;
use serde::{Deserialize, Serialize};

/// Backoff schedule for failed tile fetches.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before an error becomes permanent (until invalidation).
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_ms: f64,
    pub max_backoff_ms: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 1_000.0,
            max_backoff_ms: 30_000.0,
        }
    }
}

impl RetryPolicy {
    /// Never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the `attempt`-th failure: `base_ms · 2^(attempt-1)`, capped.
    pub fn backoff_ms(&self, attempt: u32) -> f64 {
        let exp = attempt.saturating_sub(1).min(30);
        (self.base_ms * f64::from(1u32 << exp)).min(self.max_backoff_ms)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// When the next attempt may start, or `None` if no attempts remain.
    pub fn retry_at(&self, attempts: u32, failed_at: Time) -> Option<Time> {
        if self.is_exhausted(attempts) {
            return None;
        }
        Some(failed_at.after(self.backoff_ms(attempts)))
    }
}
