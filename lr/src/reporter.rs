//! Reporter - entry point for loop reporting
//!
//! Owns the safe messenger and the session defaults. One-off messages go out
//! through [`Reporter::send_message`]; loops are reported through sessions
//! created with [`Reporter::report_loop`].

use eyre::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::TransportError;
use crate::messenger::SafeMessenger;
use crate::session::{Session, SessionConfig};
use crate::telegram::{MessageId, TelegramClient, Transport};

/// Sends safe messages and creates loop sessions
#[derive(Clone)]
pub struct Reporter {
    messenger: SafeMessenger,
    clock: Arc<dyn Clock>,
    defaults: SessionConfig,
}

impl Reporter {
    /// Create a reporter on top of any transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        debug!("Reporter::new: called");
        Self {
            messenger: SafeMessenger::new(transport),
            clock: Arc::new(SystemClock),
            defaults: SessionConfig::default(),
        }
    }

    /// Create a reporter for the public Bot API
    pub fn telegram(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, TransportError> {
        let client = TelegramClient::new(token, chat_id)?;
        Ok(Self::new(Arc::new(client)))
    }

    /// Create a reporter from configuration, resolving credentials from the environment
    pub fn from_config(config: &Config) -> Result<Self> {
        debug!("Reporter::from_config: called");
        let credentials = config.credentials()?;
        let client = TelegramClient::from_config(&config.telegram, credentials)
            .context("Failed to create Telegram client")?;
        Ok(Self::new(Arc::new(client)).with_session_defaults(config.reporting.session_config()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults applied by [`Reporter::report_loop`]
    pub fn with_session_defaults(mut self, defaults: SessionConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn session_defaults(&self) -> &SessionConfig {
        &self.defaults
    }

    /// Send a message outside of any loop; failures become warnings
    ///
    /// Nothing rate-limits this method, so do not call it once per iteration.
    pub fn send_message(&self, text: &str) -> Option<MessageId> {
        self.messenger.send(text, None)
    }

    /// Send a message as a reply; failures become warnings
    pub fn reply(&self, text: &str, to: MessageId) -> Option<MessageId> {
        self.messenger.send(text, Some(to))
    }

    /// Edit a message; failures become warnings
    pub fn edit_message(&self, message_id: MessageId, text: &str) -> bool {
        self.messenger.edit(message_id, text)
    }

    /// Configure a session for a loop of `total` iterations using the defaults
    pub fn report_loop(&self, total: u64, name: Option<&str>) -> Session {
        let mut config = self.defaults.clone();
        if let Some(name) = name {
            config.name = Some(name.to_string());
        }
        self.report_loop_with(total, config)
    }

    /// Configure a session for a loop of `total` iterations
    pub fn report_loop_with(&self, total: u64, config: SessionConfig) -> Session {
        debug!(total, name = ?config.name, "Reporter::report_loop_with: called");
        Session::new(self.messenger.clone(), self.clock.clone(), total, config, None)
    }
}
