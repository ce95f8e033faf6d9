//! Safe messenger
//!
//! Wraps a [`Transport`] so that no transport failure ever reaches the caller.
//! Failures become `warn!` diagnostics and the call degrades to "nothing
//! happened". Panics are not caught: they unwind through here untouched.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::telegram::{EditMessage, MessageId, SendMessage, Transport};

/// Messenger that converts transport errors into warnings
#[derive(Clone)]
pub struct SafeMessenger {
    transport: Arc<dyn Transport>,
}

impl SafeMessenger {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        debug!("SafeMessenger::new: called");
        Self { transport }
    }

    /// Send a message, optionally as a reply
    ///
    /// Returns the handle of the new message, or `None` if it could not be sent.
    pub fn send(&self, text: &str, reply_to: Option<MessageId>) -> Option<MessageId> {
        debug!(?reply_to, text_len = text.len(), "SafeMessenger::send: called");
        let request = SendMessage::new(text).reply_to(reply_to);
        match self.transport.send_message(&request) {
            Ok(id) => {
                debug!(%id, "SafeMessenger::send: delivered");
                Some(id)
            }
            Err(e) if e.is_api_error() => {
                warn!(error = %e, transient = e.is_transient(), "Telegram rejected the message");
                None
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Could not send message to Telegram");
                None
            }
        }
    }

    /// Edit a previously sent message
    ///
    /// Returns whether the edit was accepted.
    pub fn edit(&self, message_id: MessageId, text: &str) -> bool {
        debug!(%message_id, text_len = text.len(), "SafeMessenger::edit: called");
        match self.transport.edit_message(&EditMessage::new(message_id, text)) {
            Ok(()) => true,
            Err(e) if e.is_api_error() => {
                warn!(error = %e, %message_id, transient = e.is_transient(), "Telegram rejected the edit");
                false
            }
            Err(e) => {
                warn!(error = %e, %message_id, transient = e.is_transient(), "Could not edit message in Telegram");
                false
            }
        }
    }
}

impl std::fmt::Debug for SafeMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeMessenger").finish_non_exhaustive()
    }
}
