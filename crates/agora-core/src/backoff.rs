//! Exponential backoff for resubscribing to the broadcast bus.

use std::time::Duration;

use agora_types::config::ListenerConfig;

/// Floor for the first delay so a zero config can never spin.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Delay bounds: start at `initial`, double per failure, cap at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_DELAY);
        Self {
            initial,
            max: max.max(initial),
        }
    }

    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Fresh backoff state at the initial delay.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            current: self.initial,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ListenerConfig::default())
    }
}

/// Running backoff state.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    /// The delay to wait now; the following call returns double, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.policy.max);
        delay
    }

    /// Back to the initial delay after a healthy period.
    pub fn reset(&mut self) {
        self.current = self.policy.initial;
    }
}
