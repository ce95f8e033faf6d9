//! Warning aggregation
//!
//! Warnings are buffered by exact text with a repeat count, in first-seen order,
//! and flushed as one combined message at most once per aggregation window.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::format::natural_interval;
use crate::gate::{GateStart, RateGate};

/// One distinct warning text and how often it was raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningEntry {
    pub text: String,
    pub count: u64,
}

/// Insertion-ordered mapping from warning text to occurrence count
#[derive(Debug, Clone, Default)]
pub struct WarningBuffer {
    entries: Vec<WarningEntry>,
    index: HashMap<String, usize>,
}

impl WarningBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `text`, returning its count so far
    pub fn record(&mut self, text: &str) -> u64 {
        if let Some(&i) = self.index.get(text) {
            self.entries[i].count += 1;
            return self.entries[i].count;
        }
        self.index.insert(text.to_string(), self.entries.len());
        self.entries.push(WarningEntry {
            text: text.to_string(),
            count: 1,
        });
        1
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct texts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total number of occurrences across all texts
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.count).sum()
    }

    pub fn count_of(&self, text: &str) -> Option<u64> {
        self.index.get(text).map(|&i| self.entries[i].count)
    }

    pub fn entries(&self) -> &[WarningEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Compose the outgoing message for the buffered warnings
    ///
    /// `window` is the aggregation window named in the text. Returns `None` when empty.
    pub fn compose(&self, window: Duration) -> Option<String> {
        debug!(distinct = self.entries.len(), "WarningBuffer::compose: called");
        match self.entries.as_slice() {
            [] => None,
            [single] => {
                let mut message = single.text.clone();
                if single.count > 1 {
                    message.push_str(&format!(
                        "\n\nThis warning happened {} times in the last {}.",
                        single.count,
                        natural_interval(window)
                    ));
                }
                Some(message)
            }
            many => {
                let mut message = format!(
                    "Multiple warnings were accumulated in the last {}:",
                    natural_interval(window)
                );
                for entry in many {
                    message.push_str("\n----\n");
                    message.push_str(&entry.text);
                    if entry.count > 1 {
                        message.push_str(&format!("\nThis warning happened {} times.", entry.count));
                    }
                }
                Some(message)
            }
        }
    }
}

/// Buffer plus the rate gate that decides when it may be flushed
#[derive(Debug, Clone)]
pub struct WarningAggregator {
    buffer: WarningBuffer,
    gate: RateGate,
}

impl WarningAggregator {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            buffer: WarningBuffer::new(),
            gate: RateGate::new(min_interval),
        }
    }

    pub fn arm(&mut self, now: DateTime<Local>, start: GateStart) {
        self.gate.arm(now, start);
    }

    pub fn record(&mut self, text: &str) -> u64 {
        let count = self.buffer.record(text);
        debug!(count, distinct = self.buffer.len(), "WarningAggregator::record: buffered");
        count
    }

    pub fn buffer(&self) -> &WarningBuffer {
        &self.buffer
    }

    pub fn last_flush(&self) -> Option<DateTime<Local>> {
        self.gate.last()
    }

    /// Whether a flush should be attempted now
    pub fn is_due(&self, now: DateTime<Local>, force: bool) -> bool {
        !self.buffer.is_empty() && (force || self.gate.is_open(now))
    }

    /// Compose the pending message, naming this aggregator's window
    pub fn compose(&self) -> Option<String> {
        self.buffer.compose(self.gate.interval())
    }

    /// Record a flush attempt; the buffer is only cleared when it was delivered
    pub fn finish_flush(&mut self, now: DateTime<Local>, delivered: bool) {
        debug!(delivered, "WarningAggregator::finish_flush: called");
        self.gate.mark(now);
        if delivered {
            self.buffer.clear();
        }
    }
}
