//! Reconnect delay schedule.

use std::time::Duration;

pub const DEFAULT_FLOOR: Duration = Duration::from_secs(1);
pub const DEFAULT_CEILING: Duration = Duration::from_secs(30);

/// Doubling delay between reconnect attempts, clamped to `[floor, ceiling]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_FLOOR, DEFAULT_CEILING)
    }
}

impl Backoff {
    #[must_use]
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let floor = floor.max(Duration::from_millis(1));
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay the next reconnect will wait.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the current delay and double it for the attempt after.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}
