//! CLI argument parsing for lr

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lr")]
#[command(author, version, about = "Report loop progress to a Telegram chat", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Chat to report to, overriding the configuration
    #[arg(long)]
    pub chat_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a one-off message
    Send {
        /// Message text
        #[arg(required = true)]
        text: String,

        /// Reply to this message id
        #[arg(short, long)]
        reply_to: Option<i64>,
    },

    /// Replace the text of a message
    Edit {
        /// Id of the message to edit
        #[arg(required = true)]
        message_id: i64,

        /// New message text
        #[arg(required = true)]
        text: String,
    },

    /// Report progress of a stream: every stdin line is one iteration
    Track {
        /// Expected number of lines
        #[arg(short, long)]
        total: u64,

        /// Loop name (default: timestamped)
        #[arg(short, long)]
        name: Option<String>,

        /// Minimum seconds between progress updates
        #[arg(long)]
        update_interval: Option<u64>,

        /// Minimum seconds between warning messages
        #[arg(long)]
        warn_interval: Option<u64>,

        /// Lines matching this regex are also sent as warnings
        #[arg(short, long)]
        warn_pattern: Option<String>,

        /// Do not echo stdin to stdout
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run a simulated loop to see the reports in a chat
    Demo {
        /// Which scenario to run
        #[arg(value_enum)]
        scenario: Scenario,

        /// Number of iterations of the main loop
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Total simulated run time in seconds
        #[arg(short, long, default_value = "60")]
        seconds: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    /// A loop in which everything works fine
    Normal,
    /// A loop that fails part way through
    Error,
    /// A loop raising repeated and distinct warnings
    Warnings,
    /// A loop with nested subloops
    Subloop,
}
