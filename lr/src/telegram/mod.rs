//! Telegram transport
//!
//! Thin plumbing around the two Bot API methods the reporter needs:
//! `sendMessage` and `editMessageText`.

pub mod client;
mod types;

pub use client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, TelegramClient, Transport};
pub use types::{ApiResponse, EditMessage, MessageId, Parameters, SendMessage, SentMessage, is_not_modified};
