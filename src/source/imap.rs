//! IMAP mailbox over TLS as a mail source.

use std::collections::VecDeque;
use std::net::TcpStream;

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use super::{FetchedMessage, MailSource, MessageStream};
use crate::config::SourceConfig;
use crate::error::{RelayError, Result};

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// Reads messages from an IMAP mailbox. The sequence id is the message UID.
pub struct ImapSource {
    host: String,
    port: u16,
    login: String,
    password: String,
    mailbox: String,
    read_only: bool,
}

impl ImapSource {
    pub fn new(host: &str, port: u16, login: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            login: login.to_string(),
            password: password.to_string(),
            mailbox: "INBOX".to_string(),
            read_only: false,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(RelayError::Config("source.host is required for imap".into()));
        }
        Ok(Self::new(&config.host, config.port, &config.login, &config.password)
            .with_mailbox(&config.mailbox)
            .read_only(config.read_only))
    }

    pub fn with_mailbox(mut self, mailbox: &str) -> Self {
        self.mailbox = mailbox.to_string();
        self
    }

    /// Use EXAMINE and `BODY.PEEK[]` so fetched messages keep their flags.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    fn connect(&self) -> Result<ImapSession> {
        let tls = TlsConnector::builder().build().map_err(transport)?;
        let client = imap::connect((self.host.as_str(), self.port), self.host.as_str(), &tls)
            .map_err(transport)?;
        let session = client
            .login(&self.login, &self.password)
            .map_err(|(e, _)| transport(e))?;
        debug!(host = %self.host, login = %self.login, "IMAP login succeeded");
        Ok(session)
    }
}

impl MailSource for ImapSource {
    fn fetch(&mut self, criteria: &str, since_id: u64) -> Result<MessageStream<'_>> {
        let mut session = self.connect()?;
        let opened = if self.read_only {
            session.examine(&self.mailbox)
        } else {
            session.select(&self.mailbox)
        };
        opened.map_err(transport)?;

        let mut uids: Vec<u32> = session
            .uid_search(criteria)
            .map_err(transport)?
            .into_iter()
            .filter(|&uid| u64::from(uid) > since_id)
            .collect();
        uids.sort_unstable();

        info!(
            mailbox = %self.mailbox,
            criteria,
            since_id,
            count = uids.len(),
            "IMAP search done"
        );

        Ok(Box::new(ImapFetch {
            session,
            uids: uids.into(),
            query: if self.read_only { "BODY.PEEK[]" } else { "RFC822" },
        }))
    }
}

/// Fetches one message per UID, lazily. Logs out when dropped.
struct ImapFetch {
    session: ImapSession,
    uids: VecDeque<u32>,
    query: &'static str,
}

impl Iterator for ImapFetch {
    type Item = Result<FetchedMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let uid = self.uids.pop_front()?;
            let fetches = match self.session.uid_fetch(uid.to_string(), self.query) {
                Ok(fetches) => fetches,
                Err(e) => {
                    self.uids.clear();
                    return Some(Err(transport(e)));
                }
            };

            match fetches.iter().find_map(|f| f.body()) {
                Some(body) => {
                    return Some(Ok(FetchedMessage {
                        sequence_id: u64::from(uid),
                        raw: body.to_vec(),
                    }))
                }
                None => warn!(uid, "IMAP server returned no body, skipping"),
            }
        }
    }
}

impl Drop for ImapFetch {
    fn drop(&mut self) {
        if let Err(e) = self.session.logout() {
            debug!(error = %e, "IMAP logout failed");
        }
    }
}

fn transport(e: impl std::fmt::Display) -> RelayError {
    RelayError::Transport(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = SourceConfig {
            host: "imap.example.com".into(),
            login: "bot".into(),
            password: "pw".into(),
            mailbox: "Archive".into(),
            read_only: true,
            ..SourceConfig::default()
        };
        let source = ImapSource::from_config(&config).unwrap();
        assert_eq!(source.port, 993);
        assert_eq!(source.mailbox, "Archive");
        assert!(source.read_only);
    }

    #[test]
    fn test_from_config_requires_host() {
        assert!(matches!(
            ImapSource::from_config(&SourceConfig::default()),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_unreachable_server_is_transport_error() {
        let mut source = ImapSource::new("127.0.0.1", 1, "bot", "pw");
        assert!(matches!(
            source.fetch("ALL", 0),
            Err(RelayError::Transport(_))
        ));
    }
}
