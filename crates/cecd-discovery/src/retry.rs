//! Per-device retry bookkeeping for discovery queries

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

/// How often and how many times a query may be repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_interval: Duration) -> Self {
        Self {
            max_attempts,
            min_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send the query now; the attempt has been counted
    Attempt,
    /// Too soon since the previous attempt
    Wait,
    /// Ceiling reached and the last attempt had its full interval to be answered
    Exhausted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    last_attempt: Option<Instant>,
}

impl RetryState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    pub fn poll(&mut self, policy: &RetryPolicy, now: Instant) -> RetryDecision {
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < policy.min_interval {
                return RetryDecision::Wait;
            }
        }
        if self.attempts >= policy.max_attempts {
            return RetryDecision::Exhausted;
        }
        self.attempts += 1;
        self.last_attempt = Some(now);
        RetryDecision::Attempt
    }
}
