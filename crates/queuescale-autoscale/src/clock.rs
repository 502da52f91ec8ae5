//! Cooldown clock: the only state carried between poll cycles.

use std::time::{Duration, Instant};

/// Timestamps of the last applied scale-up and scale-down.
///
/// Both start at construction time, so no scaling action can happen
/// until a full cooldown interval has passed since startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownClock {
    last_scale_up: Instant,
    last_scale_down: Instant,
}

impl CooldownClock {
    pub fn new(now: Instant) -> Self {
        Self {
            last_scale_up: now,
            last_scale_down: now,
        }
    }

    pub fn last_scale_up(&self) -> Instant {
        self.last_scale_up
    }

    pub fn last_scale_down(&self) -> Instant {
        self.last_scale_down
    }

    pub fn record_scale_up(&mut self, now: Instant) {
        self.last_scale_up = now;
    }

    pub fn record_scale_down(&mut self, now: Instant) {
        self.last_scale_down = now;
    }

    /// Time since the last scale-up, zero if `now` is earlier.
    pub fn since_scale_up(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_scale_up)
    }

    /// Time since the last scale-down, zero if `now` is earlier.
    pub fn since_scale_down(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_scale_down)
    }
}
