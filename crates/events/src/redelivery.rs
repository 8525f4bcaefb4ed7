//! Redelivery policy for nacked deliveries.

use std::time::Duration;

/// How the wait between redeliveries grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed,
    /// Delay doubles each attempt.
    #[default]
    Exponential,
    /// Delay grows by `base_delay` each attempt.
    Linear,
}

/// Decides whether (and when) a nacked delivery comes back.
///
/// `max_attempts` counts deliveries, not retries: with `max_attempts = 5` a payload is
/// handed out at most five times before it is dead-lettered.
#[derive(Debug, Clone, PartialEq)]
pub struct RedeliveryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RedeliveryPolicy {
    /// Redeliver immediately, up to `max_attempts` deliveries.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Wait before handing out delivery number `attempt + 1`, after `attempt` failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2_u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };

        delay.min(self.max_delay)
    }

    /// Whether a delivery that just failed on `attempt` gets another go.
    pub fn should_redeliver(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
