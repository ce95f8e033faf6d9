//! Time-based rate gate

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::clock::to_delta;

/// When a gate first opens after a session is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateStart {
    /// The interval must elapse after session entry before the gate opens
    #[default]
    AfterInterval,
    /// The first check after entry passes unconditionally
    Immediate,
}

/// Opens when at least `interval` has passed since it was last marked
#[derive(Debug, Clone)]
pub struct RateGate {
    interval: Duration,
    last: Option<DateTime<Local>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last(&self) -> Option<DateTime<Local>> {
        self.last
    }

    /// Reset the gate at session entry according to `start`
    pub fn arm(&mut self, now: DateTime<Local>, start: GateStart) {
        debug!(?start, "RateGate::arm: called");
        self.last = match start {
            GateStart::AfterInterval => Some(now),
            GateStart::Immediate => None,
        };
    }

    /// Whether an action may run at `now`
    pub fn is_open(&self, now: DateTime<Local>) -> bool {
        match self.last {
            None => true,
            Some(last) => now - last >= to_delta(self.interval),
        }
    }

    /// Record that the gated action ran at `now`
    pub fn mark(&mut self, now: DateTime<Local>) {
        self.last = Some(now);
    }
}
