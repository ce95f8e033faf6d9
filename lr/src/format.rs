//! Human-readable time formatting for chat messages

use chrono::{DateTime, Local, TimeDelta};
use std::time::Duration;
use tracing::trace;

use crate::clock::to_delta;

/// Timestamp layout used in every message
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Format a timestamp for display (e.g. "2024-03-01 14:05")
pub fn timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Describe the magnitude of a time span in words (e.g. "a minute", "3 hours")
///
/// The sign is ignored.
pub fn natural_delta(delta: TimeDelta) -> String {
    trace!(?delta, "natural_delta: called");
    let secs = delta.num_seconds().unsigned_abs();
    let mins = secs / 60;
    let hours = mins / 60;
    let days = hours / 24;
    let years = days / 365;

    if secs == 0 {
        "a moment".to_string()
    } else if secs == 1 {
        "a second".to_string()
    } else if secs < 60 {
        format!("{} seconds", secs)
    } else if mins == 1 {
        "a minute".to_string()
    } else if mins < 60 {
        format!("{} minutes", mins)
    } else if hours == 1 {
        "an hour".to_string()
    } else if hours < 24 {
        format!("{} hours", hours)
    } else if days == 1 {
        "a day".to_string()
    } else if days < 365 {
        format!("{} days", days)
    } else if years == 1 {
        "a year".to_string()
    } else {
        format!("{} years", years)
    }
}

/// Describe a configured interval in words
pub fn natural_interval(interval: Duration) -> String {
    natural_delta(to_delta(interval))
}

/// Describe a point in time relative to now (e.g. "5 minutes from now", "an hour ago")
///
/// `delta` is `target - now`.
pub fn natural_time(delta: TimeDelta) -> String {
    trace!(?delta, "natural_time: called");
    if delta.num_seconds() == 0 {
        "now".to_string()
    } else if delta > TimeDelta::zero() {
        format!("{} from now", natural_delta(delta))
    } else {
        format!("{} ago", natural_delta(delta))
    }
}
