//! Streaming MBOX reader.
//!
//! Yields one message at a time, reading line-by-line through a buffered
//! reader. Never loads the entire file into memory. Tolerant of malformed
//! input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{RelayError, Result};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Default maximum message size in bytes (256 MB).
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// One message read from an MBOX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MboxMessage {
    /// 1-based position of the message in the file.
    pub ordinal: u64,
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// RFC 5322 bytes, without the separator line.
    pub raw: Vec<u8>,
}

/// Pull-based MBOX reader.
///
/// Tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - UTF-8 BOM at the start of the file
pub struct MboxReader<R> {
    reader: R,
    path: PathBuf,
    max_message_size: usize,
    /// Separator line of the next message, read while finishing the previous one.
    pending_separator: Option<(u64, Vec<u8>)>,
    offset: u64,
    ordinal: u64,
    prev_line_was_empty: bool,
    first_line: bool,
    done: bool,
}

impl MboxReader<BufReader<File>> {
    /// Open an MBOX file for sequential reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayError::FileNotFound(path.clone())
            } else {
                RelayError::io(&path, e)
            }
        })?;
        Ok(Self::new(
            BufReader::with_capacity(READ_BUFFER_SIZE, file),
            path,
        ))
    }
}

impl<R: BufRead> MboxReader<R> {
    /// Wrap any buffered reader. `path` is only used in error messages.
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            max_message_size: MAX_MESSAGE_SIZE,
            pending_separator: None,
            offset: 0,
            ordinal: 0,
            prev_line_was_empty: true,
            first_line: true,
            done: false,
        }
    }

    /// Override the per-message size cap. Longer messages are truncated.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    fn read_message(&mut self) -> Result<Option<MboxMessage>> {
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut message_start = self.offset;
        let mut truncated = false;

        if let Some((start, separator)) = self.pending_separator.take() {
            message_start = start;
            message_buf.extend_from_slice(&separator);
        }

        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);
        loop {
            line_buf.clear();
            let line_len = self
                .reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| RelayError::io(&self.path, e))?;
            if line_len == 0 {
                break;
            }
            let line_start = self.offset;
            self.offset += line_len as u64;

            let is_separator = is_mbox_separator(&line_buf);
            let was_first = self.first_line;
            let prev_empty = self.prev_line_was_empty;
            self.first_line = false;
            self.prev_line_was_empty = is_blank_line(&line_buf);

            if is_separator {
                if !was_first && !prev_empty {
                    warn!(
                        offset = line_start,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if message_buf.is_empty() {
                    message_start = line_start;
                    message_buf.extend_from_slice(&line_buf);
                    continue;
                }
                self.pending_separator = Some((line_start, line_buf.clone()));
                return Ok(Some(self.finish(message_start, message_buf)));
            }

            if message_buf.len() + line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line_buf);
            } else if !truncated {
                warn!(
                    offset = message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                truncated = true;
            }
        }

        self.done = true;
        if message_buf.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        Ok(Some(self.finish(message_start, message_buf)))
    }

    fn finish(&mut self, offset: u64, message_buf: Vec<u8>) -> MboxMessage {
        self.ordinal += 1;
        let raw = strip_mbox_separator(&message_buf).to_vec();
        MboxMessage {
            ordinal: self.ordinal,
            offset,
            raw,
        }
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = Result<MboxMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_message() {
            Ok(message) => message.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Skip the `From ` separator line at the start of an MBOX message.
pub fn strip_mbox_separator(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF_u8, 0xBB, 0xBF][..]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF_u8, 0xBB, 0xBF][..]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
