//! Decision model: what to do with a candidate after a transient failure.
//!
//! This module defines the Decision type (what to do next) and the Decider trait
//! (how to determine it from the candidate's retry budget).

use std::time::Duration;

use super::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Re-enqueue after a delay and try the same stage again.
    Retry { delay: Duration, reason: String },

    /// Retry budget spent; force FAILED with MAX_RETRIES_EXCEEDED.
    GiveUp { reason: String },
}

/// Deciders are pure functions: given the retry bookkeeping they return the
/// next action without side effects. Applying it is the harness's job.
pub trait Decider: Send + Sync {
    fn decide(&self, retry_count: u32, max_retries: u32) -> Decision;
}

/// Retry while `retry_count < max_retries`, with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryDecider {
    retry_policy: RetryPolicy,
}

impl RetryDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl Default for RetryDecider {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Decider for RetryDecider {
    fn decide(&self, retry_count: u32, max_retries: u32) -> Decision {
        if retry_count >= max_retries {
            Decision::GiveUp {
                reason: format!("Max retries reached: {retry_count}/{max_retries}"),
            }
        } else {
            let delay = self.retry_policy.next_delay(retry_count);
            Decision::Retry {
                delay,
                reason: format!("Retry {retry_count}/{max_retries} after {delay:?}"),
            }
        }
    }
}
