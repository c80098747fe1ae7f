//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the `--config` command-line flag
//! 2. `$MAILRELAY_CONFIG` (environment variable)
//! 3. `~/.config/mailrelay/config.toml` (Linux)
//!    `%APPDATA%\mailrelay\config.toml` (Windows)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::split::{BreakerSkip, Splitter, DEFAULT_BREAKERS, DEFAULT_MAX_LENGTH};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Where messages are read from.
    pub source: SourceConfig,
    /// Where notifications go.
    pub delivery: DeliveryConfig,
    /// Text segmentation.
    pub split: SplitConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// File holding the last committed message id.
    /// Defaults to `state.toml` in the cache directory.
    pub state_file: Option<PathBuf>,
    /// Directory for archives under construction. Defaults to the system temp dir.
    pub spool_dir: Option<PathBuf>,
    /// Override cache directory for state and logs.
    pub cache_dir: Option<PathBuf>,
    /// Pause between two delivered messages, in milliseconds.
    pub send_delay_ms: u64,
    /// Caption language: "en" or "ru". Defaults to the system locale.
    pub lang: Option<String>,
}

/// Kind of mail source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Imap,
    Mbox,
}

/// Mail source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// IMAP server host name.
    pub host: String,
    /// IMAP over TLS port.
    pub port: u16,
    pub login: String,
    pub password: String,
    pub mailbox: String,
    /// IMAP SEARCH criteria, e.g. "ALL" or "UNSEEN".
    pub criteria: String,
    /// Open the mailbox with EXAMINE and leave `\Seen` flags untouched.
    pub read_only: bool,
    /// MBOX file, for `kind = "mbox"`.
    pub path: Option<PathBuf>,
}

/// Kind of notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Telegram,
    Directory,
}

/// Delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub mode: DeliveryMode,
    /// Telegram bot token.
    pub token: String,
    /// Telegram chat id (numeric id or `@channel`).
    pub chat_id: String,
    /// Bot API base URL, for self-hosted Bot API servers.
    pub api_url: String,
    /// Output directory, for `mode = "directory"`.
    pub output_dir: Option<PathBuf>,
}

/// Text segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Longest chunk, in characters.
    pub max_length: usize,
    /// Breakers in priority order.
    pub breakers: Vec<String>,
    /// "single-char" or "full-breaker".
    pub skip: BreakerSkip,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            state_file: None,
            spool_dir: None,
            cache_dir: None,
            send_delay_ms: 5000,
            lang: None,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Imap,
            host: String::new(),
            port: 993,
            login: String::new(),
            password: String::new(),
            mailbox: "INBOX".to_string(),
            criteria: "ALL".to_string(),
            read_only: false,
            path: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Telegram,
            token: String::new(),
            chat_id: String::new(),
            api_url: "https://api.telegram.org".to_string(),
            output_dir: None,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            breakers: DEFAULT_BREAKERS.iter().map(|b| b.to_string()).collect(),
            skip: BreakerSkip::SingleChar,
        }
    }
}

impl Config {
    /// Check that the selected source and delivery modes have what they need.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        match self.source.kind {
            SourceKind::Imap => {
                if self.source.host.trim().is_empty() {
                    missing.push("source.host");
                }
                if self.source.login.is_empty() {
                    missing.push("source.login");
                }
                if self.source.password.is_empty() {
                    missing.push("source.password");
                }
            }
            SourceKind::Mbox => {
                if self.source.path.is_none() {
                    missing.push("source.path");
                }
            }
        }

        match self.delivery.mode {
            DeliveryMode::Telegram => {
                if self.delivery.token.is_empty() {
                    missing.push("delivery.token");
                }
                if self.delivery.chat_id.is_empty() {
                    missing.push("delivery.chat_id");
                }
            }
            DeliveryMode::Directory => {
                if self.delivery.output_dir.is_none() {
                    missing.push("delivery.output_dir");
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RelayError::Config(format!(
                "missing settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Splitter built from the `[split]` section.
    pub fn splitter(&self) -> Splitter {
        Splitter::new(self.split.max_length)
            .with_breakers(self.split.breakers.iter().cloned())
            .with_skip(self.split.skip)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.general.send_delay_ms)
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration.
///
/// An explicit path must exist. Otherwise the standard location is used when
/// present and the built-in defaults when not. Unreadable or malformed files
/// are an error: running with default credentials is never useful.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(RelayError::FileNotFound(path.to_path_buf()));
            }
            path.to_path_buf()
        }
        None => match config_file_path() {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!("No config file found, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| RelayError::io(&path, e))?;
    let config = parse_config(&contents)
        .map_err(|e| RelayError::Config(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Parse a TOML configuration document.
pub fn parse_config(contents: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str::<Config>(contents)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILRELAY_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailrelay").join("config.toml"))
}

/// Return the cache directory for state and logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailrelay")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailrelay.log")
}

/// Return the state file path.
pub fn state_file_path(config: &Config) -> PathBuf {
    config
        .general
        .state_file
        .clone()
        .unwrap_or_else(|| cache_dir(config).join("state.toml"))
}
