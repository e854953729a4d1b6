//! Time source for the run loop.
//!
//! Every settle delay, poll interval and deadline check goes through a
//! [`Clock`], so a 24-hour soak run can be replayed in tests against virtual
//! time.

use std::time::{Duration, Instant};

pub trait Clock {
    /// Current point in time.
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `Instant` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
