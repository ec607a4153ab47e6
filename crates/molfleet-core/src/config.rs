//! Configuration types for rollouts

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rollout::DelaySchedule;

/// Timing of the post-apply confirmation poll and the self-reload countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Wait before the first descriptor re-fetch; the node restarts its service
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Wait between later re-fetch attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Total re-fetch attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Visible countdown ticks before a session reload after a self apply
    #[serde(default = "default_reload_countdown")]
    pub reload_countdown: u32,
    /// Length of one countdown tick
    #[serde(default = "default_countdown_tick_ms")]
    pub countdown_tick_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_retry_delay_ms() -> u64 {
    3_000
}

fn default_max_attempts() -> u32 {
    4
}

fn default_reload_countdown() -> u32 {
    10
}

fn default_countdown_tick_ms() -> u64 {
    1_000
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
            reload_countdown: default_reload_countdown(),
            countdown_tick_ms: default_countdown_tick_ms(),
        }
    }
}

impl RolloutConfig {
    /// Delay schedule for confirmation attempts
    #[must_use]
    pub fn schedule(&self) -> DelaySchedule {
        DelaySchedule {
            initial: Duration::from_millis(self.initial_delay_ms),
            retry: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Length of one reload countdown tick
    #[must_use]
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RolloutConfig = serde_json::from_str(r#"{"max_attempts": 6}"#).unwrap();

        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.initial_delay_ms, 5_000);
        assert_eq!(config.schedule().retry, Duration::from_secs(3));
    }
}
