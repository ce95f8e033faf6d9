//! loopreport - loop progress reporting to a Telegram chat
//!
//! Reports the status of a long-running loop to a chat without ever letting a
//! notification failure interrupt the loop itself.
//!
//! # Core Concepts
//!
//! - **One message per loop**: the progress message is sent once and then edited in place
//! - **Rate gates**: updates and warnings go out at most once per configured interval
//! - **Warning aggregation**: repeated or distinct warnings collapse into one reply
//! - **Never fatal**: transport failures become log warnings, only API misuse is an error
//! - **Subloops**: child sessions thread their messages under the parent's progress message
//!
//! # Example
//!
//! ```ignore
//! use loopreport::{Reporter, SessionConfig};
//!
//! let reporter = Reporter::telegram(token, chat_id)?;
//! let mut session = reporter.report_loop(999, Some("Processing files"));
//! session.run(|scope| -> eyre::Result<()> {
//!     for path in &paths {
//!         process(path)?;
//!         scope.update(1)?;
//!     }
//!     Ok(())
//! })?;
//! ```
//!
//! # Modules
//!
//! - [`telegram`] - Transport trait and Bot API client
//! - [`messenger`] - Failure-absorbing wrapper around a transport
//! - [`session`] - Loop session state machine and scope guard
//! - [`warnings`] - Warning buffer and message composition
//! - [`reporter`] - Entry point creating sessions
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod gate;
pub mod messenger;
pub mod reporter;
pub mod session;
pub mod telegram;
pub mod warnings;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, Credentials, ReportingConfig, TelegramConfig};
pub use error::{TransportError, UsageError};
pub use gate::{GateStart, RateGate};
pub use messenger::SafeMessenger;
pub use reporter::Reporter;
pub use session::{ActiveSession, Outcome, ProgressMessage, Session, SessionConfig, SessionState};
pub use telegram::{EditMessage, MessageId, Parameters, SendMessage, TelegramClient, Transport};
pub use warnings::{WarningAggregator, WarningBuffer, WarningEntry};
