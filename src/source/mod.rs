//! Mail sources: where raw messages come from.
//!
//! A source yields `(sequence_id, raw bytes)` pairs in ascending id order,
//! lazily and once. Connection handling stays inside the source.

pub mod imap;
pub mod mbox;

use crate::config::{SourceConfig, SourceKind};
use crate::error::{RelayError, Result};

/// One fetched message, consumed once by the relay pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Monotonically increasing id within the mailbox (IMAP UID, mbox ordinal).
    pub sequence_id: u64,
    /// Headers and body as received.
    pub raw: Vec<u8>,
}

/// Lazy, non-restartable stream of fetched messages.
pub type MessageStream<'a> = Box<dyn Iterator<Item = Result<FetchedMessage>> + 'a>;

/// A mailbox the relay can read from.
pub trait MailSource {
    /// Fetch messages matching `criteria` whose id is greater than `since_id`,
    /// in ascending id order.
    ///
    /// Connection, authentication and read failures surface as
    /// [`RelayError::Transport`], either here or as a stream item.
    fn fetch(&mut self, criteria: &str, since_id: u64) -> Result<MessageStream<'_>>;
}

/// Build the source selected in the configuration.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn MailSource>> {
    match config.kind {
        SourceKind::Imap => Ok(Box::new(imap::ImapSource::from_config(config)?)),
        SourceKind::Mbox => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| RelayError::Config("source.path is required for mbox".into()))?;
            Ok(Box::new(mbox::MboxSource::new(path)))
        }
    }
}
