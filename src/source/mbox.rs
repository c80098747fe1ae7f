//! Local MBOX file as a mail source.

use std::path::PathBuf;

use tracing::{debug, info};

use super::{FetchedMessage, MailSource, MessageStream};
use crate::error::{RelayError, Result};
use crate::parser::mbox::MboxReader;

/// Reads messages from an MBOX file. The sequence id is the 1-based position
/// of the message in the file, so appending to the file keeps ids stable.
pub struct MboxSource {
    path: PathBuf,
}

impl MboxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MailSource for MboxSource {
    fn fetch(&mut self, criteria: &str, since_id: u64) -> Result<MessageStream<'_>> {
        if !criteria.eq_ignore_ascii_case("ALL") {
            debug!(criteria, "MBOX source ignores search criteria other than ALL");
        }
        info!(path = %self.path.display(), since_id, "Reading MBOX");

        let reader = MboxReader::open(&self.path).map_err(to_transport)?;
        let stream = reader.filter_map(move |item| match item {
            Ok(message) if message.ordinal <= since_id => None,
            Ok(message) => Some(Ok(FetchedMessage {
                sequence_id: message.ordinal,
                raw: message.raw,
            })),
            Err(e) => Some(Err(to_transport(e))),
        });
        Ok(Box::new(stream))
    }
}

fn to_transport(e: RelayError) -> RelayError {
    match e {
        RelayError::Transport(_) => e,
        other => RelayError::Transport(other.to_string()),
    }
}
