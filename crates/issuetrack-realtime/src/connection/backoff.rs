//! Reconnect delay policy.

use std::time::Duration;

use issuetrack_core::config::RealtimeConfig;

/// Bounded exponential backoff.
///
/// Delays never decrease across consecutive failures and never exceed the
/// cap. [`reset`](Self::reset) after a successful connection starts the
/// sequence over from the initial delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: u32,
    current: Option<Duration>,
    attempts: u32,
}

impl ExponentialBackoff {
    /// Create a policy. `max` below `initial` is raised to `initial`, and a
    /// multiplier of zero is treated as one.
    pub fn new(initial: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1),
            current: None,
            attempts: 0,
        }
    }

    /// Build from the realtime settings.
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.backoff_multiplier,
        )
    }

    /// The delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(previous) => previous
                .checked_mul(self.multiplier)
                .unwrap_or(self.max)
                .min(self.max),
        };
        self.current = Some(delay);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.current = None;
        self.attempts = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
