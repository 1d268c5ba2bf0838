use crate::config::{ConcurrentRetryConfig, DelayMode, RetryConfig};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    delay: Duration,
    mode: DelayMode,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.delay_ms),
            mode: config.delay_mode,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Pause after failed attempt `attempt` (1-based) before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.mode {
            DelayMode::Constant => self.delay,
            DelayMode::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }
}

/// Sizing of speculative batches.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    enabled: bool,
    threshold: u32,
    base: u32,
    pub timeout: Duration,
    growth: bool,
    multiplier_cap: u32,
    absolute_cap: u32,
}

impl BatchPolicy {
    pub fn from_config(config: &ConcurrentRetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold: config.threshold,
            base: config.base_count.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            growth: config.exponential_growth,
            multiplier_cap: config.multiplier_cap.max(1),
            absolute_cap: config.absolute_cap.max(1),
        }
    }

    /// Number of sequential attempts before batches take over.
    pub fn sequential_budget(&self, max_attempts: u32) -> u32 {
        if self.enabled {
            self.threshold.min(max_attempts)
        } else {
            max_attempts
        }
    }

    /// Size of batch `batch` (1-based) with `remaining` attempts left.
    pub fn batch_size(&self, batch: u32, remaining: u32) -> u32 {
        let multiplier = if self.growth {
            2u32.saturating_pow(batch.saturating_sub(1))
                .min(self.multiplier_cap)
        } else {
            1
        };
        self.base
            .saturating_mul(multiplier)
            .min(self.absolute_cap)
            .min(remaining)
    }
}
