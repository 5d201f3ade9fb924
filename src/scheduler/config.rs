//! Scheduler configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TierloadError};

/// Tunables for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay used between idle batches when the host has no idle signal.
    pub idle_fallback_delay_ms: u64,
    /// Hold background batches while the network is slow.
    pub pause_background_on_slow_network: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_fallback_delay_ms: 50,
            pause_background_on_slow_network: true,
        }
    }
}

impl SchedulerConfig {
    pub fn with_idle_fallback_delay(mut self, delay: Duration) -> Self {
        self.idle_fallback_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn idle_fallback_delay(&self) -> Duration {
        Duration::from_millis(self.idle_fallback_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.idle_fallback_delay_ms == 0 {
            return Err(TierloadError::InvalidConfig(
                "scheduler.idle_fallback_delay_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
