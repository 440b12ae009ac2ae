//! Lockout debouncer: after an accepted edge, further changes are ignored for the
//! lockout period.

use std::time::{Duration, Instant};

/// Accepted edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// Edge detector with lockout debounce for one button.
#[derive(Debug, Clone)]
pub struct Debouncer {
    lockout: Duration,
    pressed: bool,
    last_edge: Option<Instant>,
}

impl Debouncer {
    pub fn new(lockout: Duration) -> Self {
        Self {
            lockout,
            pressed: false,
            last_edge: None,
        }
    }

    /// Feeds one sample (`true` = pressed) taken at `now`.
    pub fn sample(&mut self, pressed: bool, now: Instant) -> Option<Edge> {
        if pressed == self.pressed {
            return None;
        }
        let locked = self
            .last_edge
            .is_some_and(|last| now.saturating_duration_since(last) < self.lockout);
        if locked {
            return None;
        }
        self.pressed = pressed;
        self.last_edge = Some(now);
        Some(if pressed { Edge::Pressed } else { Edge::Released })
    }

    /// Debounced state.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}
