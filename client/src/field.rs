//! Track geometry and the phase chronometer

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub start: f64,
    pub finish: f64,
    /// Reference point for countdown steps, result reveals and run times.
    pub chrono: Instant,
}

impl Field {
    pub fn new(start: f64, finish: f64, now: Instant) -> Self {
        Self {
            start,
            finish,
            chrono: now,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.chrono = now;
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.chrono)
    }
}
