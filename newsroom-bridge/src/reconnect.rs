//! Reconnection backoff policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows with the attempt number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay every time
    Fixed,
    /// `attempt * base`
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
}

/// Bounded reconnect policy
///
/// Delays never decrease from one attempt to the next and never exceed
/// `max_delay`. After `max_attempts` retries the manager gives up and waits
/// for a manual reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    /// How long a session must stay open before the retry counter resets
    pub reset_after_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            max_attempts: 10,
            reset_after_ms: 3_000,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay_ms: delay.as_millis() as u64,
            max_delay_ms: delay.as_millis() as u64,
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1) as u64;
        let base = self.base_delay_ms;
        let raw = match self.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let shift = (attempt - 1).min(32) as u32;
                base.saturating_mul(1u64 << shift)
            }
        };
        Duration::from_millis(raw.min(self.max_delay_ms.max(base)))
    }

    /// Whether retry number `attempt` is still allowed
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    pub fn reset_after(&self) -> Duration {
        Duration::from_millis(self.reset_after_ms)
    }
}
