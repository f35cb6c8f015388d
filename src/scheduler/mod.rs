pub mod machine;
pub mod runtime;
pub mod timer;

pub use machine::{Effect, Projection, SchedulerState, Signal, TimerId};
pub use runtime::SchedulerHandle;
pub use timer::PauseTimer;

use crate::config::{validate_min_duration, validate_repeat_count, validate_shadowing_time};
use crate::error::Result;
use serde::Serialize;

/// Practice parameters the scheduler runs with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    /// How many times each segment is played before advancing.
    pub repeat_count: u32,
    /// Pause length as a multiple of the segment's spoken length.
    pub shadowing_time: f64,
    /// Segments shorter than this many seconds are skipped.
    pub min_duration: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repeat_count: 3,
            shadowing_time: 1.0,
            min_duration: 0.0,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        validate_repeat_count(self.repeat_count)?;
        validate_shadowing_time(self.shadowing_time)?;
        validate_min_duration(self.min_duration)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Not attached yet, or nothing to play.
    #[default]
    Idle,
    Playing,
    PausedForShadowing,
    Ended,
    Error,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Playing => write!(f, "playing"),
            Phase::PausedForShadowing => write!(f, "shadowing"),
            Phase::Ended => write!(f, "ended"),
            Phase::Error => write!(f, "error"),
        }
    }
}
