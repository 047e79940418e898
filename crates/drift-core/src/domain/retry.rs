//! Retry policy: decides backoff delays for follow-up jobs after a transient failure.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff, capped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Backoff multiplier.
    pub multiplier: f64,

    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting at all; used by tests and the inline executor.
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            multiplier: 1.0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `retries` (1-indexed).
    ///
    /// delay = base * multiplier^(retries - 1), clamped to `max_delay_ms`.
    ///
    /// Example with base=2s, multiplier=2.0:
    /// - retry 1: 2s
    /// - retry 2: 4s
    /// - retry 3: 8s
    pub fn next_delay(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}
