//! Integration tests for the relay pipeline: naming, extraction, archiving,
//! delivery order and commit semantics.

use std::io::{Cursor, Read};
use std::path::Path;

use mailrelay::error::{RelayError, Result};
use mailrelay::relay::{self, RelayOptions};
use mailrelay::sink::directory::DirectorySink;
use mailrelay::sink::NotificationSink;
use mailrelay::source::mbox::MboxSource;
use mailrelay::source::{FetchedMessage, MailSource, MessageStream};
use mailrelay::split::Splitter;
use mailrelay::state::StateStore;

// ─── Test doubles ───────────────────────────────────────────────────

/// Serves a fixed list of messages; can fail on connect or mid-stream.
#[derive(Default)]
struct MemorySource {
    messages: Vec<(u64, Vec<u8>)>,
    fail_connect: bool,
    fail_at: Option<u64>,
}

impl MemorySource {
    fn new(messages: Vec<(u64, String)>) -> Self {
        Self {
            messages: messages
                .into_iter()
                .map(|(id, raw)| (id, raw.into_bytes()))
                .collect(),
            ..Self::default()
        }
    }
}

impl MailSource for MemorySource {
    fn fetch(&mut self, _criteria: &str, since_id: u64) -> Result<MessageStream<'_>> {
        if self.fail_connect {
            return Err(RelayError::Transport("connection refused".into()));
        }
        let fail_at = self.fail_at;
        let items: Vec<Result<FetchedMessage>> = self
            .messages
            .iter()
            .filter(|(id, _)| *id > since_id)
            .map(|(id, raw)| {
                if Some(*id) == fail_at {
                    Err(RelayError::Transport("connection reset".into()))
                } else {
                    Ok(FetchedMessage {
                        sequence_id: *id,
                        raw: raw.clone(),
                    })
                }
            })
            .collect();
        Ok(Box::new(items.into_iter()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text(String),
    File {
        name: String,
        bytes: Vec<u8>,
        caption: Option<String>,
    },
}

/// Records every delivery; rejects files whose name contains `fail_on`.
#[derive(Default)]
struct RecordingSink {
    sent: Vec<Sent>,
    fail_on: Option<String>,
}

impl NotificationSink for RecordingSink {
    fn send_text(&mut self, text: &str) -> Result<()> {
        self.sent.push(Sent::Text(text.to_string()));
        Ok(())
    }

    fn send_file(&mut self, file_name: &str, bytes: &[u8], caption: Option<&str>) -> Result<()> {
        if let Some(pattern) = &self.fail_on {
            if file_name.contains(pattern.as_str()) {
                return Err(RelayError::Delivery(format!("rejected {file_name}")));
            }
        }
        self.sent.push(Sent::File {
            name: file_name.to_string(),
            bytes: bytes.to_vec(),
            caption: caption.map(String::from),
        });
        Ok(())
    }
}

impl RecordingSink {
    fn file_names(&self) -> Vec<&str> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::File { name, .. } => Some(name.as_str()),
                Sent::Text(_) => None,
            })
            .collect()
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

/// 100 lines of 49 characters plus a newline: 5000 characters.
fn long_body() -> String {
    let filler = "lorem ipsum dolor sit amet ".repeat(2);
    (0..100)
        .map(|i| format!("{i:03} {}.\n", &filler[..44]))
        .collect()
}

fn multipart_message(subject: &str, from: &str, body: &str) -> String {
    format!(
        "From: {from}\n\
Subject: {subject}\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"sep\"\n\
\n\
--sep\n\
Content-Type: text/plain; charset=utf-8\n\
Content-Transfer-Encoding: 8bit\n\
\n\
{body}\n\
--sep\n\
Content-Type: application/pdf\n\
Content-Disposition: attachment; filename=\"report.pdf\"\n\
Content-Transfer-Encoding: base64\n\
\n\
JVBERi0xLjQKJcOkw7zDtsOfCg==\n\
--sep--\n"
    )
}

fn simple_message(subject: &str) -> String {
    format!(
        "From: bob@example.com\nSubject: {subject}\nContent-Type: text/plain; charset=utf-8\n\nHello from {subject}\n"
    )
}

fn zip_entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut entry = archive.by_name(name).expect("entry exists");
    let mut out = Vec::new();
    entry.read_to_end(&mut out).expect("read entry");
    out
}

fn state_in(dir: &Path) -> StateStore {
    StateStore::new(dir.join("state.toml"))
}

// ─── End-to-end ─────────────────────────────────────────────────────

#[test]
fn test_end_to_end_long_body_with_attachment() {
    let body = long_body();
    assert_eq!(body.chars().count(), 5000);
    let raw = multipart_message("=?UTF-8?B?VGVzdA==?=", "alice@example.com", &body);

    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let mut source = MemorySource::new(vec![(17, raw)]);
    let mut sink = RecordingSink::default();

    let report =
        relay::run_batch(&mut source, &state, &mut sink, &RelayOptions::default()).unwrap();
    assert_eq!(report.delivered, vec![17]);
    assert_eq!(report.last_seen_id, 17);
    assert_eq!(state.load().unwrap(), 17);

    // Text first, then the full text as a file, then the archive
    assert_eq!(sink.sent.len(), 3);
    let Sent::Text(first_chunk) = &sink.sent[0] else {
        panic!("expected a text first, got {:?}", sink.sent[0]);
    };
    assert!(first_chunk.chars().count() <= 4091);
    assert!(body.starts_with(first_chunk.as_str()));
    assert_eq!(first_chunk, &Splitter::default().split(&body)[0]);

    let Sent::File { name, bytes, caption } = &sink.sent[1] else {
        panic!("expected the full text file");
    };
    assert_eq!(name, "Test от alice@example.com.txt");
    assert_eq!(caption.as_deref(), Some("Full text of the message"));
    let full_text = String::from_utf8(bytes.clone()).unwrap();
    assert!(full_text.starts_with("Test от alice@example.com\n\n"));
    assert!(full_text.contains(body.trim_end()));

    let Sent::File { name, bytes, caption } = &sink.sent[2] else {
        panic!("expected the archive");
    };
    assert_eq!(name, "Test от alice@example.com.zip");
    assert_eq!(caption.as_deref(), Some("Test от alice@example.com"));

    let txt = String::from_utf8(zip_entry(bytes, "17.txt")).unwrap();
    assert_eq!(txt.trim_end(), body.trim_end());
    assert_eq!(zip_entry(bytes, "report.pdf"), b"%PDF-1.4\n%\xc3\xa4\xc3\xbc\xc3\xb6\xc3\x9f\n");
}

#[test]
fn test_short_body_sends_no_full_text_file() {
    let tmp = tempfile::tempdir().unwrap();
    let mut source = MemorySource::new(vec![(1, simple_message("Short"))]);
    let mut sink = RecordingSink::default();

    relay::run_batch(&mut source, &state_in(tmp.path()), &mut sink, &RelayOptions::default())
        .unwrap();
    assert!(matches!(&sink.sent[0], Sent::Text(t) if t.starts_with("Hello from Short")));
    assert_eq!(sink.file_names(), vec!["Short от bob@example.com.zip"]);
}

#[test]
fn test_slash_in_name_is_removed_from_archive_name() {
    let tmp = tempfile::tempdir().unwrap();
    let mut source = MemorySource::new(vec![(4, simple_message("Q1/Q2 report"))]);
    let mut sink = RecordingSink::default();

    relay::run_batch(&mut source, &state_in(tmp.path()), &mut sink, &RelayOptions::default())
        .unwrap();
    assert_eq!(sink.file_names(), vec!["Q1Q2 report от bob@example.com.zip"]);
}

// ─── Commit semantics ───────────────────────────────────────────────

#[test]
fn test_failed_message_blocks_commit_but_not_later_messages() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let mut source = MemorySource::new(vec![
        (1, simple_message("one")),
        (2, simple_message("boom")),
        (3, simple_message("three")),
    ]);
    let mut sink = RecordingSink {
        fail_on: Some("boom".into()),
        ..RecordingSink::default()
    };

    let report = relay::run_batch(&mut source, &state, &mut sink, &RelayOptions::default()).unwrap();
    assert_eq!(report.delivered, vec![1, 3]);
    assert_eq!(report.failed, vec![2]);
    assert_eq!(report.last_seen_id, 1);
    assert_eq!(state.load().unwrap(), 1);

    // Next run retries from the failed message
    let mut sink = RecordingSink::default();
    let report = relay::run_batch(&mut source, &state, &mut sink, &RelayOptions::default()).unwrap();
    assert_eq!(report.delivered, vec![2, 3]);
    assert_eq!(state.load().unwrap(), 3);
}

#[test]
fn test_archive_failure_does_not_advance_state() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let mut source = MemorySource::new(vec![(1, simple_message("one"))]);
    let mut sink = RecordingSink::default();
    let options = RelayOptions {
        spool_dir: Some(tmp.path().join("missing-spool")),
        ..RelayOptions::default()
    };

    let report = relay::run_batch(&mut source, &state, &mut sink, &options).unwrap();
    assert_eq!(report.failed, vec![1]);
    assert!(sink.sent.is_empty(), "nothing is delivered before the archive is sealed");
    assert_eq!(state.load().unwrap(), 0);
}

#[test]
fn test_transport_failure_mid_batch_aborts() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let mut source = MemorySource::new(vec![
        (1, simple_message("one")),
        (2, simple_message("two")),
        (3, simple_message("three")),
    ]);
    source.fail_at = Some(2);
    let mut sink = RecordingSink::default();

    let err = relay::run_batch(&mut source, &state, &mut sink, &RelayOptions::default()).unwrap_err();
    assert!(matches!(err, RelayError::Transport(_)));
    assert_eq!(state.load().unwrap(), 1);
    assert_eq!(sink.file_names(), vec!["one от bob@example.com.zip"]);
}

#[test]
fn test_transport_failure_on_connect_keeps_state() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    state.commit(5).unwrap();
    let mut source = MemorySource {
        fail_connect: true,
        ..MemorySource::default()
    };
    let mut sink = RecordingSink::default();

    assert!(relay::run_batch(&mut source, &state, &mut sink, &RelayOptions::default()).is_err());
    assert_eq!(state.load().unwrap(), 5);
    assert!(sink.sent.is_empty());
}

// ─── MBOX to directory ──────────────────────────────────────────────

#[test]
fn test_mbox_to_directory_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let mbox = tmp.path().join("inbox.mbox");
    let mut contents = String::new();
    for subject in ["first", "second"] {
        contents.push_str("From bob@example.com Thu Jan 01 00:00:00 2024\n");
        contents.push_str(&simple_message(subject));
        contents.push('\n');
    }
    std::fs::write(&mbox, contents).unwrap();

    let out = tmp.path().join("out");
    let state = state_in(tmp.path());
    let mut source = MboxSource::new(&mbox);
    let mut sink = DirectorySink::create(&out).unwrap();

    let report = relay::run_batch(&mut source, &state, &mut sink, &RelayOptions::default()).unwrap();
    assert_eq!(report.delivered, vec![1, 2]);
    assert!(out.join("first от bob@example.com.zip").exists());
    assert!(out.join("second от bob@example.com.zip").exists());

    let again = relay::run_batch(&mut source, &state, &mut sink, &RelayOptions::default()).unwrap();
    assert!(again.delivered.is_empty());
    assert_eq!(again.last_seen_id, 2);
}
