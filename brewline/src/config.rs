//! Orchestrator and retry configuration.
//!
//! All durations are stored as milliseconds so configs stay plain JSON/TOML
//! numbers; accessors hand out [`Duration`] values.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded-retry parameters for one network hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total tries per hop, first call included (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second try, in milliseconds (default: 250).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling, in milliseconds (default: 5000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// The delay after the `attempt`-th failed try: exponential from the
    /// base, capped at the ceiling.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Timing parameters of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Retry policy applied to every network hop.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-call timeout, in milliseconds (default: 10000).
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Pause between confirmation polls, in milliseconds (default: 2000).
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,

    /// How long a submitted call may stay unconfirmed before the attempt
    /// fails, in milliseconds (default: 120000).
    #[serde(default = "default_confirm_deadline_ms")]
    pub confirm_deadline_ms: u64,

    /// Overall attempt deadline, in milliseconds (default: 300000).
    #[serde(default = "default_attempt_deadline_ms")]
    pub attempt_deadline_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_confirm_poll_ms() -> u64 {
    2_000
}

fn default_confirm_deadline_ms() -> u64 {
    120_000
}

fn default_attempt_deadline_ms() -> u64 {
    300_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout_ms: default_call_timeout_ms(),
            confirm_poll_ms: default_confirm_poll_ms(),
            confirm_deadline_ms: default_confirm_deadline_ms(),
            attempt_deadline_ms: default_attempt_deadline_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Pause between confirmation polls.
    #[must_use]
    pub const fn confirm_poll(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_ms)
    }

    /// Confirmation deadline per submitted call.
    #[must_use]
    pub const fn confirm_deadline(&self) -> Duration {
        Duration::from_millis(self.confirm_deadline_ms)
    }

    /// Overall attempt deadline.
    #[must_use]
    pub const fn attempt_deadline(&self) -> Duration {
        Duration::from_millis(self.attempt_deadline_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 250,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(8), Duration::from_millis(1_000));
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: OrchestratorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
    }
}
