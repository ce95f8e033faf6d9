//! Bot API request and response types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::error::TransportError;

/// Free-form Bot API parameters forwarded verbatim (e.g. `parse_mode`)
pub type Parameters = serde_json::Map<String, Value>;

/// Opaque handle of a message that the endpoint accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `sendMessage` request
#[derive(Debug, Clone, PartialEq)]
pub struct SendMessage {
    pub text: String,
    pub reply_to: Option<MessageId>,
}

impl SendMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reply_to: None,
        }
    }

    /// Address this message as a reply to an earlier one
    pub fn reply_to(mut self, message_id: Option<MessageId>) -> Self {
        self.reply_to = message_id;
        self
    }

    /// Build the JSON body; request fields take precedence over `defaults`
    pub fn to_body(&self, chat_id: &str, defaults: &Parameters) -> Value {
        debug!(%chat_id, reply_to = ?self.reply_to, "SendMessage::to_body: called");
        let mut body = defaults.clone();
        body.insert("chat_id".to_string(), Value::String(chat_id.to_string()));
        body.insert("text".to_string(), Value::String(self.text.clone()));
        match self.reply_to {
            Some(id) => {
                body.insert("reply_to_message_id".to_string(), Value::from(id.0));
            }
            None => {
                body.remove("reply_to_message_id");
            }
        }
        Value::Object(body)
    }
}

/// An `editMessageText` request
#[derive(Debug, Clone, PartialEq)]
pub struct EditMessage {
    pub message_id: MessageId,
    pub text: String,
}

impl EditMessage {
    pub fn new(message_id: MessageId, text: impl Into<String>) -> Self {
        Self {
            message_id,
            text: text.into(),
        }
    }

    /// Build the JSON body; request fields take precedence over `defaults`
    pub fn to_body(&self, chat_id: &str, defaults: &Parameters) -> Value {
        debug!(%chat_id, message_id = %self.message_id, "EditMessage::to_body: called");
        let mut body = defaults.clone();
        // Edits never carry a reply target
        body.remove("reply_to_message_id");
        body.insert("chat_id".to_string(), Value::String(chat_id.to_string()));
        body.insert("message_id".to_string(), Value::from(self.message_id.0));
        body.insert("text".to_string(), Value::String(self.text.clone()));
        Value::Object(body)
    }
}

/// Envelope every Bot API method responds with
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the envelope, turning `ok: false` into [`TransportError::Api`]
    pub fn into_result(self, http_status: u16) -> Result<T, TransportError> {
        if !self.ok {
            return Err(TransportError::Api {
                status: self.error_code.unwrap_or(http_status),
                description: self.description.unwrap_or_else(|| "no description".to_string()),
            });
        }
        self.result
            .ok_or_else(|| TransportError::InvalidResponse("response is ok but carries no result".to_string()))
    }
}

/// The part of a sent `Message` object this crate cares about
#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub message_id: MessageId,
}

/// Check whether an edit was rejected only because the text did not change
pub fn is_not_modified(err: &TransportError) -> bool {
    match err {
        TransportError::Api { description, .. } => description.contains("message is not modified"),
        _ => false,
    }
}
