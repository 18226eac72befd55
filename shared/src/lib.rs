//! Definitions shared by every participant of a race: the line protocol and
//! the constants both sides must agree on.

use std::time::Duration;

pub mod protocol;

pub use protocol::{ClientMessage, ProtocolError, RunnerPosition, ServerMessage};

/// Number of runners in a race, one per connected client.
pub const RUNNER_COUNT: usize = 4;

/// Number of selectable colour schemes for a runner.
pub const COLOR_SCHEMES: usize = 8;

pub const TRACK_START: f64 = 50.0;
pub const TRACK_FINISH: f64 = 750.0;

/// Frames a runner may go without a stride before it stops.
pub const MAX_FRAME_INTERVAL: u32 = 20;
pub const MAX_SPEED: f64 = 10.0;

pub const STEP_INTERVAL: Duration = Duration::from_millis(1000);
pub const COUNTDOWN_STEPS: u32 = 5;
pub const RESULT_STEPS: u32 = 4;
