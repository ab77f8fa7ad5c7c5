//! Bounded retry policy
//!
//! Retries belong to the navigation loop, never to the adapters. A policy
//! only answers two questions: may another attempt be made, and how long to
//! wait before it.

use carnav_sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with a hard attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds)
    pub backoff_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_backoff_ms() -> u64 {
    4000
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
            max_backoff_ms,
        }
    }

    /// A single attempt, no retries
    pub fn once() -> Self {
        Self::new(1, 0, 0)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    ///
    /// `min(backoff_ms * 2^(attempt - 1), max_backoff_ms)`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let ms = self
            .backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn validate(&self, name: &str) -> Result<(), EngineError> {
        if self.max_attempts == 0 {
            return Err(EngineError::Config(format!(
                "{}.max_attempts must be at least 1",
                name
            )));
        }
        if self.backoff_ms > self.max_backoff_ms {
            return Err(EngineError::Config(format!(
                "{}.backoff_ms ({}) exceeds max_backoff_ms ({})",
                name, self.backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 500, default_max_backoff_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = RetryPolicy::new(6, 500, 3000);
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(3000));
        assert_eq!(policy.delay_after(60), Duration::from_millis(3000));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::new(3, 10, 10);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!RetryPolicy::once().allows_retry(1));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::new(0, 10, 10).validate("capture_retry").is_err());
        assert!(RetryPolicy::new(2, 100, 10).validate("capture_retry").is_err());
        RetryPolicy::default().validate("capture_retry").unwrap();
    }
}
