//! Per-participant race state

use crate::field::Field;
use crate::input::Intent;
use shared::{RunnerPosition, COLOR_SCHEMES, MAX_SPEED};
use std::time::{Duration, Instant};

/// Running animation frames; frame 0 is the standing pose.
pub const RUNNING_FRAMES: usize = 6;
const ANIMATION_BASE: f64 = 30.0;
const STRIDE_IMPULSE: f64 = 1500.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Runner {
    pub position: f64,
    /// Vertical display offset of the runner's lane.
    pub lane: f64,
    pub speed: f64,
    pub color: usize,
    pub selected: bool,
    pub arrived: bool,
    pub run_time: Duration,
    pub frame: usize,
    animation_step: u32,
    frames_since_stride: u32,
    max_frame_interval: u32,
}

/// What a frame of colour selection changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Choice {
    pub toggled: bool,
    pub color_changed: bool,
}

impl Runner {
    pub fn new(index: usize, field: &Field, max_frame_interval: u32) -> Self {
        Self {
            position: field.start,
            lane: 50.0 + index as f64 * 20.0,
            speed: 0.0,
            color: index % COLOR_SCHEMES,
            selected: false,
            arrived: false,
            run_time: Duration::ZERO,
            frame: 0,
            animation_step: 0,
            frames_since_stride: 0,
            max_frame_interval,
        }
    }

    /// Integrates one frame of local input.
    ///
    /// A stride sets the speed from how many frames passed since the previous
    /// one, so fast tapping runs faster. Going `max_frame_interval` frames
    /// without a stride stops the runner.
    pub fn advance(&mut self, stride: bool) {
        if self.arrived {
            return;
        }

        if self.frames_since_stride < self.max_frame_interval {
            self.frames_since_stride += 1;
            if stride {
                let frames = f64::from(self.frames_since_stride);
                self.speed = (STRIDE_IMPULSE / (frames * frames * frames)).min(MAX_SPEED);
                self.frames_since_stride = 0;
            }
        } else {
            self.speed = 0.0;
            if stride {
                self.frames_since_stride = 0;
            }
        }

        self.position += self.speed;
    }

    /// Applies one frame of colour selection input.
    pub fn choose(&mut self, intent: Intent) -> Choice {
        let mut choice = Choice::default();

        match intent {
            Intent::Action => {
                self.selected = !self.selected;
                choice.toggled = true;
            }
            Intent::Previous if !self.selected => {
                self.color = (self.color + COLOR_SCHEMES - 1) % COLOR_SCHEMES;
                choice.color_changed = true;
            }
            Intent::Next if !self.selected => {
                self.color = (self.color + 1) % COLOR_SCHEMES;
                choice.color_changed = true;
            }
            _ => {}
        }

        choice
    }

    /// Marks the runner arrived once it crosses the finish. Until then the run
    /// time keeps tracking the field chrono, so it freezes at arrival.
    pub fn check_arrival(&mut self, field: &Field, now: Instant) {
        if self.arrived {
            return;
        }
        self.arrived = self.position >= field.finish;
        self.run_time = field.elapsed(now);
    }

    pub fn apply_report(&mut self, report: &RunnerPosition) {
        self.position = report.position;
        self.speed = report.speed;
    }

    /// Accepts the server's time for this runner, arrived or not.
    pub fn finalize(&mut self, run_time: Duration) {
        self.arrived = true;
        self.run_time = run_time;
    }

    pub fn update_animation(&mut self) {
        if self.speed <= 0.0 || self.arrived {
            self.frame = 0;
            self.animation_step = 0;
            return;
        }

        self.animation_step += 1;
        let period = (ANIMATION_BASE / self.speed).max(1.0) as u32;
        if self.animation_step >= period {
            self.animation_step = 0;
            self.frame = self.frame % RUNNING_FRAMES + 1;
        }
    }

    pub fn reset(&mut self, field: &Field) {
        self.position = field.start;
        self.speed = 0.0;
        self.arrived = false;
        self.run_time = Duration::ZERO;
        self.frame = 0;
        self.animation_step = 0;
        self.frames_since_stride = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::MAX_FRAME_INTERVAL;

    fn test_field() -> Field {
        Field::new(50.0, 750.0, Instant::now())
    }

    #[test]
    fn test_runner_creation() {
        let field = test_field();
        let runner = Runner::new(2, &field, MAX_FRAME_INTERVAL);
        assert_eq!(runner.position, 50.0);
        assert_eq!(runner.lane, 90.0);
        assert_eq!(runner.color, 2);
        assert!(!runner.arrived);
        assert!(!runner.selected);
    }

    #[test]
    fn test_stride_speed_is_capped() {
        let field = test_field();
        let mut runner = Runner::new(0, &field, MAX_FRAME_INTERVAL);

        runner.advance(true);
        assert_approx_eq!(runner.speed, MAX_SPEED);
        assert_approx_eq!(runner.position, 60.0);
    }

    #[test]
    fn test_slow_strides_run_slower() {
        let field = test_field();
        let mut runner = Runner::new(0, &field, MAX_FRAME_INTERVAL);

        for _ in 0..9 {
            runner.advance(false);
        }
        runner.advance(true);

        assert_approx_eq!(runner.speed, 1.5);
        assert_approx_eq!(runner.position, 51.5);
    }

    #[test]
    fn test_runner_stops_without_strides() {
        let field = test_field();
        let mut runner = Runner::new(0, &field, 5);

        runner.advance(true);
        for _ in 0..5 {
            runner.advance(false);
        }
        assert!(runner.speed > 0.0);

        runner.advance(false);
        assert_eq!(runner.speed, 0.0);
        let stopped_at = runner.position;

        runner.advance(false);
        assert_eq!(runner.position, stopped_at);

        // A stride restarts the stride clock.
        runner.advance(true);
        runner.advance(true);
        assert_approx_eq!(runner.speed, MAX_SPEED);
    }

    #[test]
    fn test_arrival_is_idempotent_and_freezes_time() {
        let start = Instant::now();
        let field = Field::new(50.0, 750.0, start);
        let mut runner = Runner::new(0, &field, MAX_FRAME_INTERVAL);

        runner.position = 700.0;
        runner.check_arrival(&field, start + Duration::from_millis(500));
        assert!(!runner.arrived);
        assert_eq!(runner.run_time, Duration::from_millis(500));

        runner.position = 750.0;
        runner.check_arrival(&field, start + Duration::from_millis(900));
        assert!(runner.arrived);
        assert_eq!(runner.run_time, Duration::from_millis(900));

        runner.check_arrival(&field, start + Duration::from_millis(2000));
        assert!(runner.arrived);
        assert_eq!(runner.run_time, Duration::from_millis(900));
    }

    #[test]
    fn test_arrived_runner_does_not_move() {
        let field = test_field();
        let mut runner = Runner::new(0, &field, MAX_FRAME_INTERVAL);
        runner.finalize(Duration::from_secs(3));

        runner.advance(true);
        assert_eq!(runner.position, field.start);
        assert_eq!(runner.run_time, Duration::from_secs(3));
    }

    #[test]
    fn test_choose_cycles_colors_until_selected() {
        let field = test_field();
        let mut runner = Runner::new(0, &field, MAX_FRAME_INTERVAL);

        let choice = runner.choose(Intent::Previous);
        assert!(choice.color_changed);
        assert_eq!(runner.color, COLOR_SCHEMES - 1);

        runner.choose(Intent::Next);
        runner.choose(Intent::Next);
        assert_eq!(runner.color, 1);

        let choice = runner.choose(Intent::Action);
        assert!(choice.toggled);
        assert!(runner.selected);

        let choice = runner.choose(Intent::Next);
        assert_eq!(choice, Choice::default());
        assert_eq!(runner.color, 1);

        runner.choose(Intent::Action);
        assert!(!runner.selected);
    }

    #[test]
    fn test_animation_follows_speed() {
        let field = test_field();
        let mut runner = Runner::new(0, &field, MAX_FRAME_INTERVAL);

        runner.update_animation();
        assert_eq!(runner.frame, 0);

        runner.speed = MAX_SPEED;
        for _ in 0..3 {
            runner.update_animation();
        }
        assert_eq!(runner.frame, 1);

        for _ in 0..3 * RUNNING_FRAMES {
            runner.update_animation();
        }
        assert_eq!(runner.frame, 1);

        runner.arrived = true;
        runner.update_animation();
        assert_eq!(runner.frame, 0);
    }

    #[test]
    fn test_reset_returns_to_start() {
        let field = test_field();
        let mut runner = Runner::new(1, &field, MAX_FRAME_INTERVAL);
        runner.choose(Intent::Next);
        runner.choose(Intent::Action);
        runner.advance(true);
        runner.finalize(Duration::from_secs(8));

        runner.reset(&field);
        assert_eq!(runner.position, field.start);
        assert_eq!(runner.speed, 0.0);
        assert!(!runner.arrived);
        assert_eq!(runner.run_time, Duration::ZERO);
        assert_eq!(runner.color, 2);
        assert!(runner.selected);
    }
}
