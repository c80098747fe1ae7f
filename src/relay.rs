//! The relay pipeline: fetch, name, extract, archive, deliver, commit.
//!
//! Messages are handled one at a time. `last_seen_id` only moves forward
//! over messages whose whole pipeline succeeded, and never past a failed one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{file_stem, ArchiveBuilder, SealedArchive};
use crate::config::Config;
use crate::error::Result;
use crate::i18n::{self, Lang};
use crate::parser::header::read_mail_headers;
use crate::parser::mime::{extract_parts, parse_message, part_tree, plain_text_body};
use crate::sink::NotificationSink;
use crate::source::{FetchedMessage, MailSource};
use crate::split::Splitter;
use crate::state::StateStore;

/// Knobs of one relay run.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub splitter: Splitter,
    /// Where archives are spooled while being built.
    pub spool_dir: Option<PathBuf>,
    /// Search criteria handed to the source.
    pub criteria: String,
    /// Pause between two messages.
    pub send_delay: Duration,
    /// Language of captions.
    pub lang: Lang,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            splitter: Splitter::default(),
            spool_dir: None,
            criteria: "ALL".to_string(),
            send_delay: Duration::ZERO,
            lang: Lang::En,
        }
    }
}

impl RelayOptions {
    pub fn from_config(config: &Config, lang: Lang) -> Self {
        Self {
            splitter: config.splitter(),
            spool_dir: config.general.spool_dir.clone(),
            criteria: config.source.criteria.clone(),
            send_delay: config.send_delay(),
            lang,
        }
    }
}

/// A message turned into its deliverable parts.
#[derive(Debug)]
pub struct PackedMessage {
    pub sequence_id: u64,
    /// `"{subject} от {sender}"`.
    pub name: String,
    /// Unnamed `text/plain` body, if any.
    pub plain_text: Option<String>,
    pub archive: SealedArchive,
}

/// Outcome of one delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub sequence_id: u64,
    pub name: String,
    /// Number of archive entries.
    pub entries: usize,
    /// Number of chunks the plain-text body split into (0 without one).
    pub chunks: usize,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub delivered: Vec<u64>,
    pub failed: Vec<u64>,
    /// Persisted id after the batch.
    pub last_seen_id: u64,
}

/// Name the message, extract its parts and seal them in one archive.
///
/// On any failure the partial archive is discarded.
pub fn pack_message(sequence_id: u64, raw: &[u8], spool_dir: Option<&Path>) -> Result<PackedMessage> {
    let name = read_mail_headers(raw).mail_name();
    let message = parse_message(raw, sequence_id)?;
    let root = part_tree(&message);

    let mut archive = ArchiveBuilder::open(&name, spool_dir)?;
    let files = extract_parts(&root, sequence_id, |file| {
        archive.write(&file.filename, file.bytes).map(|_| ())
    })?;
    let archive = archive.seal()?;
    debug!(sequence_id, name = %name, files, "Packed message");

    Ok(PackedMessage {
        sequence_id,
        plain_text: plain_text_body(&root, sequence_id),
        name,
        archive,
    })
}

/// Hand a packed message to the sink.
///
/// Sends the first chunk of the body as text, the full body as a `.txt` file
/// when it did not fit, then the archive. Returns the number of chunks.
pub fn deliver(
    packed: &PackedMessage,
    sink: &mut dyn NotificationSink,
    splitter: &Splitter,
    lang: Lang,
) -> Result<usize> {
    let mut chunk_count = 0;

    if let Some(body) = &packed.plain_text {
        let chunks = splitter.split(body);
        chunk_count = chunks.len();

        if let Some(first) = chunks.first().filter(|c| !c.trim().is_empty()) {
            sink.send_text(first)?;
        }
        if chunks.len() > 1 {
            let full_text = format!("{}\n\n{}", packed.name, body);
            sink.send_file(
                &format!("{}.txt", file_stem(&packed.name)),
                full_text.as_bytes(),
                Some(i18n::in_lang(lang).caption_full_text()),
            )?;
        }
    }

    let bytes = packed.archive.bytes()?;
    sink.send_file(&packed.archive.file_name(), &bytes, Some(&packed.name))?;
    Ok(chunk_count)
}

/// Run the full pipeline for one fetched message.
pub fn process_message(
    message: &FetchedMessage,
    sink: &mut dyn NotificationSink,
    options: &RelayOptions,
) -> Result<DeliveredMessage> {
    let packed = pack_message(message.sequence_id, &message.raw, options.spool_dir.as_deref())?;
    let chunks = deliver(&packed, sink, &options.splitter, options.lang)?;

    info!(
        sequence_id = message.sequence_id,
        name = %packed.name,
        entries = packed.archive.entries().len(),
        chunks,
        "Delivered message"
    );
    Ok(DeliveredMessage {
        sequence_id: message.sequence_id,
        entries: packed.archive.entries().len(),
        name: packed.name,
        chunks,
    })
}

/// Fetch everything newer than the persisted id and deliver it in order.
///
/// A transport or state failure aborts the batch. Any other failure is
/// logged and only blocks the commit point: later messages are still
/// delivered, but `last_seen_id` stays before the failed one so it is
/// retried next run.
pub fn run_batch(
    source: &mut dyn MailSource,
    state: &StateStore,
    sink: &mut dyn NotificationSink,
    options: &RelayOptions,
) -> Result<BatchReport> {
    let since_id = state.load()?;
    let mut report = BatchReport {
        last_seen_id: since_id,
        ..BatchReport::default()
    };
    info!(since_id, criteria = %options.criteria, "Starting batch");

    let mut first = true;
    for fetched in source.fetch(&options.criteria, since_id)? {
        let message = fetched?;
        if message.sequence_id <= since_id {
            debug!(sequence_id = message.sequence_id, "Already delivered, skipping");
            continue;
        }

        if !first && !options.send_delay.is_zero() {
            std::thread::sleep(options.send_delay);
        }
        first = false;

        match process_message(&message, sink, options) {
            Ok(_) => {
                report.delivered.push(message.sequence_id);
                if report.failed.is_empty() {
                    state.commit(message.sequence_id)?;
                    report.last_seen_id = message.sequence_id;
                }
            }
            Err(e) if e.is_fatal_for_batch() => return Err(e),
            Err(e) => {
                warn!(sequence_id = message.sequence_id, error = %e, "Message failed");
                report.failed.push(message.sequence_id);
            }
        }
    }

    info!(
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        last_seen_id = report.last_seen_id,
        "Batch finished"
    );
    Ok(report)
}
