//! Rate-limit backoff policy
//!
//! Linear backoff with a cap: attempt `a` waits `min(base * a, cap)` plus a
//! uniform jitter in `[0, max_jitter]`. The attempt counter belongs to a
//! single request and starts again at 1 for the next one.

use super::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Backoff schedule derived from [`RetryConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    max_jitter: Duration,
}

impl RetryPolicy {
    /// Create a policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts, the first one included
    /// * `base_delay` - Linear step per attempt
    /// * `max_delay` - Cap applied before jitter
    /// * `max_jitter` - Upper bound of the random jitter
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        max_jitter: Duration,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            max_jitter,
        }
    }

    /// Build the policy from the `[retry]` config table
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs_f64(config.base_delay_secs),
            Duration::from_secs_f64(config.max_delay_secs),
            Duration::from_millis(config.max_jitter_ms),
        )
    }

    /// Total attempts allowed per request
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Largest possible sleep, jitter included
    pub fn max_total_delay(&self) -> Duration {
        self.max_delay + self.max_jitter
    }

    /// Deterministic part of the wait after failed attempt `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }

    /// Wait after failed attempt `attempt`, jitter included
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.backoff_delay(attempt) + jitter
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
