//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use loopreport::{
    EditMessage, ManualClock, MessageId, Reporter, SendMessage, SessionConfig, Transport, TransportError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send { text: String, reply_to: Option<MessageId> },
    Edit { message_id: MessageId, text: String },
}

/// Transport that records every call; message ids start at 1
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
    offline: AtomicBool,
}

impl RecordingTransport {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<(String, Option<MessageId>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { text, reply_to } => Some((text, reply_to)),
                Call::Edit { .. } => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Edit { message_id, text } => Some((message_id, text)),
                Call::Send { .. } => None,
            })
            .collect()
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TransportError::Timeout(Duration::from_secs(1)))
        } else {
            Ok(())
        }
    }
}

impl Transport for RecordingTransport {
    fn send_message(&self, request: &SendMessage) -> Result<MessageId, TransportError> {
        self.calls.lock().unwrap().push(Call::Send {
            text: request.text.clone(),
            reply_to: request.reply_to,
        });
        self.check()?;
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn edit_message(&self, request: &EditMessage) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::Edit {
            message_id: request.message_id,
            text: request.text.clone(),
        });
        self.check()
    }
}

/// Reporter over a recording transport and a manual clock
pub fn reporter() -> (Arc<RecordingTransport>, Arc<ManualClock>, Reporter) {
    let transport = Arc::new(RecordingTransport::default());
    let clock = Arc::new(ManualClock::default());
    let reporter = Reporter::new(transport.clone()).with_clock(clock.clone());
    (transport, clock, reporter)
}

/// Session settings with both windows set to `secs`
pub fn intervals(name: &str, secs: u64) -> SessionConfig {
    SessionConfig::named(name)
        .with_update_interval(Duration::from_secs(secs))
        .with_warn_interval(Duration::from_secs(secs))
}
