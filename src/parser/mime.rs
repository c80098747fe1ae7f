//! MIME handling: build a part tree from a raw message, classify its leaves
//! and hand each one out as an archive entry.

use std::borrow::Cow;

use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Encoding, Message, MessageParser, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::model::part::{ExtractedFile, MessagePart, PartKind};
use crate::parser::header::{
    decode_base64_bytes, decode_filename, decode_header_bytes, get_header, header_block,
    header_param, unfold_headers,
};
use crate::parser::mbox::strip_mbox_separator;

/// Maximum multipart nesting that is walked. Deeper containers are skipped.
pub const MAX_DEPTH: usize = 32;

/// Parse a raw RFC 5322 message.
///
/// A leading mbox `From ` separator line is tolerated.
pub fn parse_message(raw_message: &[u8], sequence_id: u64) -> Result<Message<'_>> {
    MessageParser::default()
        .parse(strip_mbox_separator(raw_message))
        .ok_or_else(|| RelayError::Parse {
            sequence_id,
            reason: "not an RFC 5322 message".into(),
        })
}

/// Build the [`MessagePart`] tree of a parsed message.
///
/// Part bodies borrow from `message` unless transfer decoding produced new bytes.
pub fn part_tree<'m>(message: &'m Message<'_>) -> MessagePart<'m> {
    convert_part(message, 0, 0).unwrap_or_default()
}

fn convert_part<'m>(message: &'m Message<'_>, part_id: usize, depth: usize) -> Option<MessagePart<'m>> {
    let part = message.parts.get(part_id)?;
    let content_type = content_type_of(part);

    match &part.body {
        PartType::Multipart(children) => {
            if depth >= MAX_DEPTH {
                warn!(depth, content_type = %content_type, "Multipart nesting too deep, skipping");
                return None;
            }
            let children = children
                .iter()
                .filter_map(|&child| convert_part(message, child, depth + 1))
                .collect();
            Some(MessagePart::multipart(&content_type, children))
        }
        PartType::Text(text) | PartType::Html(text) => Some(MessagePart::text_leaf(
            &content_type,
            declared_filename(message, part).as_deref(),
            transfer_decoded_body(message, part),
            &**text,
        )),
        _ => Some(MessagePart::leaf(
            &content_type,
            declared_filename(message, part).as_deref(),
            part.contents(),
        )),
    }
}

/// The filename as written in the part's own headers: `filename=` of
/// `Content-Disposition`, then `name=` of `Content-Type`.
///
/// Falls back to mail-parser's reading for forms not handled here (RFC 2231
/// continuations).
fn declared_filename(message: &Message<'_>, part: &mail_parser::MessagePart<'_>) -> Option<String> {
    let raw_headers = message
        .raw_message
        .get(part.offset_header..part.offset_body)
        .unwrap_or_default();
    let headers = unfold_headers(&decode_header_bytes(header_block(raw_headers)));

    get_header(&headers, "content-disposition")
        .and_then(|value| header_param(value, "filename"))
        .or_else(|| get_header(&headers, "content-type").and_then(|value| header_param(value, "name")))
        .or_else(|| part.attachment_name().map(String::from))
}

/// Body bytes of a part with only the Content-Transfer-Encoding undone.
///
/// Unlike mail-parser's text view, no charset conversion happens. A body
/// that fails to decode is kept as it appears in the message.
fn transfer_decoded_body<'m>(
    message: &'m Message<'_>,
    part: &mail_parser::MessagePart<'_>,
) -> Cow<'m, [u8]> {
    let raw = message
        .raw_message
        .get(part.offset_body..part.offset_end)
        .unwrap_or_default();
    if part.is_encoding_problem {
        return Cow::Borrowed(raw);
    }

    let decoded = match part.encoding {
        Encoding::None => return Cow::Borrowed(raw),
        Encoding::Base64 => decode_base64_bytes(raw),
        Encoding::QuotedPrintable => quoted_printable_decode(raw),
    };
    match decoded {
        Some(bytes) => Cow::Owned(bytes),
        None => {
            warn!(encoding = ?part.encoding, "Transfer decoding failed, keeping raw body");
            Cow::Borrowed(raw)
        }
    }
}

/// `type/subtype` of a part, inferred from the body kind when the header is missing.
fn content_type_of(part: &mail_parser::MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        },
        None => match part.body {
            PartType::Text(_) => "text/plain",
            PartType::Html(_) => "text/html",
            PartType::Message(_) => "message/rfc822",
            PartType::Multipart(_) => "multipart/mixed",
            _ => "application/octet-stream",
        }
        .to_string(),
    }
    .to_ascii_lowercase()
}

/// Decide the archive filename of a leaf part.
///
/// - unnamed `text/html` → `"<id>.html"`
/// - any part with a declared filename → that name, KOI8-R encoded words decoded
/// - unnamed `text/plain` → `"<id>.txt"`
/// - anything else → `None`
pub fn classify(part: &MessagePart<'_>, sequence_id: u64) -> Option<(String, PartKind)> {
    match (part.content_type.as_str(), part.declared_filename()) {
        ("text/html", None) => Some((format!("{sequence_id}.html"), PartKind::Html)),
        (_, Some(name)) => {
            let decoded = decode_filename(name);
            let filename = if decoded.trim().is_empty() {
                format!("{sequence_id}.bin")
            } else {
                decoded
            };
            Some((filename, PartKind::Attachment))
        }
        ("text/plain", None) => Some((format!("{sequence_id}.txt"), PartKind::PlainText)),
        _ => None,
    }
}

/// Depth-first walk over the classified leaves of `root`, in document order.
fn walk_leaves<'r, 'a, F>(root: &'r MessagePart<'a>, sequence_id: u64, mut visit: F) -> Result<usize>
where
    F: FnMut(&'r MessagePart<'a>, String, PartKind) -> Result<()>,
{
    let mut stack = vec![(root, 0usize)];
    let mut visited = 0;

    while let Some((part, depth)) = stack.pop() {
        if !part.is_leaf() {
            if depth >= MAX_DEPTH {
                warn!(sequence_id, depth, "Multipart nesting too deep, skipping");
                continue;
            }
            stack.extend(part.children.iter().rev().map(|child| (child, depth + 1)));
            continue;
        }

        match classify(part, sequence_id) {
            Some((filename, kind)) => {
                visit(part, filename, kind)?;
                visited += 1;
            }
            None => {
                debug!(sequence_id, content_type = %part.content_type, "Skipping unclassified part");
            }
        }
    }

    Ok(visited)
}

/// Visit every leaf of `root` depth-first in document order, classify it and
/// pass each archivable one to `on_file`.
///
/// Unclassified leaves are skipped. The first error from `on_file` stops the
/// walk and is returned. Returns the number of files handed out.
pub fn extract_parts<'r, 'a, F>(root: &'r MessagePart<'a>, sequence_id: u64, mut on_file: F) -> Result<usize>
where
    F: FnMut(ExtractedFile<'r>) -> Result<()>,
{
    walk_leaves(root, sequence_id, |part, filename, kind| {
        debug!(sequence_id, filename = %filename, size = part.body.len(), "Extracting part");
        on_file(ExtractedFile {
            filename,
            kind,
            bytes: &part.body,
        })
    })
}

/// Collect every archivable leaf of `root`.
pub fn collect_parts<'r>(root: &'r MessagePart<'_>, sequence_id: u64) -> Vec<ExtractedFile<'r>> {
    let mut files = Vec::new();
    // The callback never fails
    let _ = extract_parts(root, sequence_id, |file| {
        files.push(file);
        Ok(())
    });
    files
}

/// The plain-text body of a message: every unnamed `text/plain` leaf in its
/// UTF-8 reading, joined with line breaks. `None` when there is none.
pub fn plain_text_body(root: &MessagePart<'_>, sequence_id: u64) -> Option<String> {
    let mut texts = Vec::new();
    let _ = walk_leaves(root, sequence_id, |part, _, kind| {
        if kind == PartKind::PlainText {
            texts.push(part.text().into_owned());
        }
        Ok(())
    });

    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}
