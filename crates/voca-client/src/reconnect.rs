//! Exponential-backoff reconnection policy for the signaling socket.

use std::time::Duration;

use voca_config::ReconnectConfig;

/// Upper bound on any single reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl ReconnectPolicy {
    /// `min(base × 2^attempt, 30s)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(MAX_RECONNECT_DELAY, |delay| delay.min(MAX_RECONNECT_DELAY))
    }
}

/// Attempt budget for one signaling channel.
#[derive(Debug, Default)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called whenever a socket opens successfully.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consume one attempt and return how long to wait before it, or `None`
    /// when the policy is disabled, the caller forbids reconnecting, or the
    /// budget is spent.
    pub fn next_delay(&mut self, policy: &ReconnectPolicy, permitted: bool) -> Option<Duration> {
        if !policy.enabled || !permitted || self.attempts >= policy.max_attempts {
            return None;
        }
        let delay = policy.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }
}
