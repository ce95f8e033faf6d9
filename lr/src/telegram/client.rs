//! Transport trait and the Telegram Bot API implementation

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::types::{ApiResponse, EditMessage, MessageId, Parameters, SendMessage, SentMessage, is_not_modified};
use crate::config::{Credentials, TelegramConfig};
use crate::error::TransportError;

/// Default request timeout, short enough that a dead connection cannot stall the monitored loop
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default Bot API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Outbound "send" and "edit" operations against a chat endpoint
///
/// Each call is exactly one network round-trip. Failures are returned, never
/// swallowed; downgrading them to diagnostics is the job of
/// [`SafeMessenger`](crate::messenger::SafeMessenger).
pub trait Transport: Send + Sync {
    /// Create a new message, returning its handle
    fn send_message(&self, request: &SendMessage) -> Result<MessageId, TransportError>;

    /// Replace the text of an existing message
    fn edit_message(&self, request: &EditMessage) -> Result<(), TransportError>;
}

/// Telegram Bot API client
///
/// Holds one reusable connection pool; the chat id and default parameters are
/// applied to every request.
pub struct TelegramClient {
    base_url: String,
    token: String,
    chat_id: String,
    defaults: Parameters,
    timeout: Duration,
    http: Client,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .field("chat_id", &self.chat_id)
            .field("defaults", &self.defaults)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Create a client against the public Bot API with default settings
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, TransportError> {
        Self::build(
            DEFAULT_BASE_URL.to_string(),
            token.into(),
            chat_id.into(),
            Parameters::new(),
            DEFAULT_TIMEOUT,
        )
    }

    /// Create a client from configuration and resolved credentials
    pub fn from_config(config: &TelegramConfig, credentials: Credentials) -> Result<Self, TransportError> {
        debug!(base_url = %config.base_url, timeout_ms = config.timeout_ms, "TelegramClient::from_config: called");
        Self::build(
            config.base_url.clone(),
            credentials.token,
            credentials.chat_id,
            config.parameters.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    fn build(
        base_url: String,
        token: String,
        chat_id: String,
        defaults: Parameters,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("loopreport/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::from_reqwest(e.without_url(), timeout))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
            defaults,
            timeout,
            http,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// POST a JSON body to a Bot API method and unwrap the response envelope
    fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, TransportError> {
        debug!(%method, "TelegramClient::call: called");
        // The URL embeds the bot token, keep it out of error messages
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .map_err(|e| TransportError::from_reqwest(e.without_url(), self.timeout))?;

        let status = response.status();
        debug!(%status, "TelegramClient::call: response received");
        let text = response
            .text()
            .map_err(|e| TransportError::from_reqwest(e.without_url(), self.timeout))?;

        match serde_json::from_str::<ApiResponse<T>>(&text) {
            Ok(envelope) => envelope.into_result(status.as_u16()),
            Err(e) if status.is_success() => {
                debug!(%e, "TelegramClient::call: malformed success body");
                Err(TransportError::Json(e))
            }
            Err(_) => {
                debug!("TelegramClient::call: non-JSON error body");
                Err(TransportError::Api {
                    status: status.as_u16(),
                    description: text.chars().take(200).collect(),
                })
            }
        }
    }
}

impl Transport for TelegramClient {
    fn send_message(&self, request: &SendMessage) -> Result<MessageId, TransportError> {
        debug!(reply_to = ?request.reply_to, text_len = request.text.len(), "TelegramClient::send_message: called");
        let body = request.to_body(&self.chat_id, &self.defaults);
        let sent: SentMessage = self.call("sendMessage", &body)?;
        debug!(message_id = %sent.message_id, "TelegramClient::send_message: sent");
        Ok(sent.message_id)
    }

    fn edit_message(&self, request: &EditMessage) -> Result<(), TransportError> {
        debug!(message_id = %request.message_id, text_len = request.text.len(), "TelegramClient::edit_message: called");
        let body = request.to_body(&self.chat_id, &self.defaults);
        match self.call::<Value>("editMessageText", &body) {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => {
                debug!("TelegramClient::edit_message: text unchanged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
