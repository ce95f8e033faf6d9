//! loopreport configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gate::GateStart;
use crate::session::SessionConfig;
use crate::telegram::{DEFAULT_BASE_URL, Parameters};

/// Main loopreport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Telegram endpoint and credentials
    pub telegram: TelegramConfig,

    /// Reporting cadence
    pub reporting: ReportingConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .loopreport.yml
        let local_config = PathBuf::from(".loopreport.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/loopreport/loopreport.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("loopreport").join("loopreport.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are ignored here; `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".loopreport.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("loopreport").join("loopreport.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolve bot token and chat id
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn credentials(&self) -> Result<Credentials> {
        self.telegram.credentials()
    }
}

/// Bot token and target chat, resolved from the environment
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Telegram endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the bot token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Chat to report to; overrides `chat-id-env`
    #[serde(rename = "chat-id")]
    pub chat_id: Option<String>,

    /// Environment variable containing the chat id
    #[serde(rename = "chat-id-env")]
    pub chat_id_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Extra Bot API parameters sent with every request (e.g. parse_mode)
    pub parameters: Parameters,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_env: "TELEGRAM_BOT_TOKEN".to_string(),
            chat_id: None,
            chat_id_env: "TELEGRAM_CHAT_ID".to_string(),
            timeout_ms: 1000,
            parameters: Parameters::new(),
        }
    }
}

impl TelegramConfig {
    pub fn credentials(&self) -> Result<Credentials> {
        let token = std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| eyre::eyre!("Telegram bot token not found. Set the {} environment variable.", self.token_env))?;

        let chat_id = match &self.chat_id {
            Some(id) => id.clone(),
            None => std::env::var(&self.chat_id_env).ok().filter(|c| !c.is_empty()).ok_or_else(|| {
                eyre::eyre!(
                    "Telegram chat id not found. Set telegram.chat-id in the config or the {} environment variable.",
                    self.chat_id_env
                )
            })?,
        };

        Ok(Credentials { token, chat_id })
    }
}

/// Reporting cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Minimum seconds between progress updates
    #[serde(rename = "min-update-interval-secs")]
    pub min_update_interval_secs: u64,

    /// Minimum seconds between warning messages
    #[serde(rename = "min-warn-interval-secs")]
    pub min_warn_interval_secs: u64,

    /// Whether the first update waits for the interval after the start message
    #[serde(rename = "first-update")]
    pub first_update: GateStart,

    /// Whether the first warning waits for the interval after the start message
    #[serde(rename = "first-warning")]
    pub first_warning: GateStart,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            min_update_interval_secs: 60,
            min_warn_interval_secs: 60,
            first_update: GateStart::AfterInterval,
            first_warning: GateStart::AfterInterval,
        }
    }
}

impl ReportingConfig {
    /// Session defaults derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            name: None,
            min_update_interval: Duration::from_secs(self.min_update_interval_secs),
            min_warn_interval: Duration::from_secs(self.min_warn_interval_secs),
            first_update: self.first_update,
            first_warning: self.first_warning,
        }
    }
}
