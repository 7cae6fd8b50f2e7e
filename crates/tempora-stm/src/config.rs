//! Transaction manager configuration.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry behavior for conflicting transactions.
///
/// Delays grow as `base * 2^(attempt - 1)` plus up to 50% random jitter,
/// clamped to `max_delay_ms`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 1,
            max_delay_ms: 50,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Backoff before retrying after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let base = self.base_delay().saturating_mul(2u32.saturating_pow(exp));
        let jitter_ms = if base.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2)
        };
        (base + Duration::from_millis(jitter_ms)).min(self.max_delay())
    }
}

/// Settings for [`TransactionManager`](crate::TransactionManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StmConfig {
    pub retry: RetryPolicy,
    /// Check that commit locks are taken in strictly ascending `VarId` order.
    pub paranoid_lock_order: bool,
    /// Consecutive aborts after which commits also serialize on one global
    /// lock. `None` disables the fallback.
    pub fallback_abort_threshold: Option<u32>,
}

impl Default for StmConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            paranoid_lock_order: cfg!(debug_assertions),
            fallback_abort_threshold: Some(64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_clamped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(4), Duration::from_millis(20));
        for attempt in 1..=10 {
            assert!(policy.delay_for(attempt) <= Duration::from_millis(20));
        }
        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(4) && first <= Duration::from_millis(6));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).attempts(), 1);
        assert_eq!(RetryPolicy::no_retry().delay_for(3), Duration::ZERO);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config: StmConfig = ron::from_str("(retry: (max_attempts: 3))").unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay_ms, RetryPolicy::default().max_delay_ms);
        assert_eq!(config.fallback_abort_threshold, Some(64));
    }
}
