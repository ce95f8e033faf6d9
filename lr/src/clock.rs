//! Wall-clock source
//!
//! Rate gates are plain comparisons against "now", evaluated synchronously inside
//! `update`/`warn`. The clock is injectable so those gates can be driven in tests.

use chrono::{DateTime, Local, TimeDelta};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        debug!(%start, "ManualClock::new: called");
        Self { now: Mutex::new(start) }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let delta = to_delta(by);
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
        debug!(now = %*now, "ManualClock::advance: moved");
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Convert a std duration to a chrono delta, saturating on overflow
pub fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
