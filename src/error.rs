//! Centralized error types for mailrelay.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailrelay library.
///
/// Charset decode failures never show up here: the header decoder recovers
/// from them locally and hands back the raw text instead.
#[derive(Error, Debug)]
pub enum RelayError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The mail source could not connect, authenticate or fetch.
    ///
    /// Aborts the whole batch without advancing the persisted state.
    #[error("Mail transport error: {0}")]
    Transport(String),

    /// A raw message could not be parsed at all.
    #[error("Parse error in message {sequence_id}: {reason}")]
    Parse { sequence_id: u64, reason: String },

    /// Writing or sealing a message archive failed.
    ///
    /// Fatal for the current message only: the partial archive is discarded.
    #[error("Archive error for '{name}': {reason}")]
    Archive { name: String, reason: String },

    /// The notification sink rejected a text or a file.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// The persisted state file is unreadable or corrupt.
    #[error("State file '{path}' is invalid: {reason}")]
    State { path: PathBuf, reason: String },

    /// The configuration is missing a required value.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `Archive` variant from any displayable cause.
    pub fn archive(name: &str, reason: impl std::fmt::Display) -> Self {
        Self::Archive {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must stop the whole batch rather than one message.
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::State { .. })
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `RelayError::io`).
impl From<std::io::Error> for RelayError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
