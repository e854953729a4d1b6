//! Run duration and deadline.

use std::fmt;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::input::InputError;

/// Longest accepted run: 120 hours.
pub const MAX_RUN_SECS: u64 = 432_000;

/// A validated run length in (0, 432000] seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDuration(Duration);

impl RunDuration {
    pub const TWELVE_HOURS: RunDuration = RunDuration(Duration::from_secs(12 * 60 * 60));
    pub const TWENTY_FOUR_HOURS: RunDuration = RunDuration(Duration::from_secs(24 * 60 * 60));

    pub fn from_secs(secs: i64) -> Result<Self, InputError> {
        if secs <= 0 || secs as u64 > MAX_RUN_SECS {
            return Err(InputError::DurationOutOfRange(secs.to_string()));
        }
        Ok(Self(Duration::from_secs(secs as u64)))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    pub fn as_secs(self) -> u64 {
        self.0.as_secs()
    }
}

impl fmt::Display for RunDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seconds", self.as_secs())
    }
}

/// Fixed start point plus allotted duration.
#[derive(Debug, Clone, Copy)]
pub struct RunDeadline {
    start: Instant,
    duration: RunDuration,
}

impl RunDeadline {
    pub fn starting_now(clock: &dyn Clock, duration: RunDuration) -> Self {
        Self {
            start: clock.now(),
            duration,
        }
    }

    pub fn duration(&self) -> RunDuration {
        self.duration
    }

    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_duration_since(self.start)
    }

    pub fn is_exceeded(&self, clock: &dyn Clock) -> bool {
        self.elapsed(clock) >= self.duration.as_duration()
    }
}
