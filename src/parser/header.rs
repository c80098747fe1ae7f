//! Header decoding: folding, charset-ambiguous encoded words (RFC 2047) and
//! the archive name built from Subject and From.
//!
//! Real-world senders tag KOI8-R text as UTF-8 and vice versa, so every
//! encoded word is decoded with its declared charset first and the other
//! known charset second. When both fail the raw header is kept as-is.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::debug;

use crate::model::header::{DecodedHeaderField, DetectedCharset, KnownCharset, MailHeaders};
use crate::parser::mbox::strip_mbox_separator;

/// Separator between the subject and the sender in a composed mail name.
pub const NAME_SEPARATOR: &str = " от ";

/// Base64 engine that accepts missing or superfluous padding, as mail clients
/// produce both.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// One piece of a header value, as seen by the encoded-word scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// Text outside any encoded word.
    Literal(&'a str),
    /// `=?<tag>?B?<payload>?=`, where `<tag>` matched a known charset.
    Encoded {
        charset: KnownCharset,
        payload: &'a str,
    },
}

/// Decode every UTF-8 or KOI8-R encoded word in a header value.
///
/// Example: `"=?UTF-8?B?SGVsbG8=?="` → `"Hello"`.
///
/// Returns the input unmodified (with [`DetectedCharset::Raw`]) when no
/// encoded word is present or when any word fails to decode in both
/// charsets.
pub fn decode_header(raw: &str) -> DecodedHeaderField {
    decode_with(raw, &KnownCharset::ALL)
}

/// Decode the `From` header.
///
/// Same as [`decode_header`], then the whole result is tried once more as a
/// base64-encoded UTF-8 string, which some legacy senders emit. The second
/// pass is kept only when it yields printable, non-empty text.
pub fn decode_sender(raw: &str) -> DecodedHeaderField {
    let decoded = decode_header(raw);
    match decode_base64_text(decoded.text.trim(), KnownCharset::Utf8) {
        Some(text) if !text.is_empty() && !text.chars().any(char::is_control) => {
            debug!(sender = %text, "Sender was base64-encoded twice");
            DecodedHeaderField {
                text,
                charset: DetectedCharset::Utf8,
            }
        }
        _ => decoded,
    }
}

/// Decode an attachment filename. Only KOI8-R encoded words are recognized.
pub fn decode_filename(raw: &str) -> String {
    decode_with(raw, &[KnownCharset::Koi8R]).text
}

/// Build the `"{subject} от {sender}"` name used for the archive and captions.
///
/// Path separators are removed so the result is a single valid filename.
pub fn compose_mail_name(subject: &str, sender: &str) -> String {
    strip_path_separators(&format!("{subject}{NAME_SEPARATOR}{sender}"))
}

/// Remove `/` and `\` from a string.
pub fn strip_path_separators(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '/' | '\\')).collect()
}

fn decode_with(raw: &str, charsets: &[KnownCharset]) -> DecodedHeaderField {
    let segments = scan_encoded_words(raw, charsets);
    if !segments
        .iter()
        .any(|s| matches!(s, Segment::Encoded { .. }))
    {
        return DecodedHeaderField::raw(raw);
    }

    let mut text = String::with_capacity(raw.len());
    let mut detected: Option<KnownCharset> = None;

    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            Segment::Literal(literal) => {
                // Whitespace between two encoded words is not part of the value (RFC 2047 §6.2)
                let between_words = i > 0
                    && matches!(segments[i - 1], Segment::Encoded { .. })
                    && matches!(segments.get(i + 1), Some(Segment::Encoded { .. }));
                if !(between_words && literal.trim().is_empty()) {
                    text.push_str(literal);
                }
            }
            Segment::Encoded { charset, payload } => match decode_payload(payload, charset) {
                Some((word, used)) => {
                    text.push_str(&word);
                    detected.get_or_insert(used);
                }
                None => {
                    debug!(
                        header = raw,
                        charset = charset.tag(),
                        "Encoded word undecodable in every known charset, keeping raw text"
                    );
                    return DecodedHeaderField::raw(raw);
                }
            },
        }
    }

    DecodedHeaderField {
        text,
        charset: detected.map_or(DetectedCharset::Raw, DetectedCharset::from),
    }
}

/// Split a header value into literal text and recognized encoded words.
///
/// Matching is a case-insensitive substring search for `=?<tag>?b?`, with no
/// token-boundary checks. A marker without a closing `?=` stays literal.
fn scan_encoded_words<'a>(input: &'a str, charsets: &[KnownCharset]) -> Vec<Segment<'a>> {
    // ASCII lowercasing keeps byte offsets identical to `input`
    let lowered = input.to_ascii_lowercase();
    let markers: Vec<(KnownCharset, String)> = charsets
        .iter()
        .map(|&c| (c, format!("=?{}?b?", c.tag())))
        .collect();

    let mut segments = Vec::new();
    let mut pos = 0;
    let mut literal_start = 0;

    while pos < input.len() {
        let next = markers
            .iter()
            .filter_map(|(charset, marker)| {
                lowered[pos..]
                    .find(marker.as_str())
                    .map(|at| (pos + at, *charset, marker.len()))
            })
            .min_by_key(|&(at, _, _)| at);

        let Some((start, charset, marker_len)) = next else {
            break;
        };

        let payload_start = start + marker_len;
        match input[payload_start..].find("?=") {
            Some(end) => {
                if literal_start < start {
                    segments.push(Segment::Literal(&input[literal_start..start]));
                }
                segments.push(Segment::Encoded {
                    charset,
                    payload: &input[payload_start..payload_start + end],
                });
                pos = payload_start + end + 2;
                literal_start = pos;
            }
            None => {
                pos = payload_start;
            }
        }
    }

    if literal_start < input.len() {
        segments.push(Segment::Literal(&input[literal_start..]));
    }
    segments
}

/// Decode one base64 payload with `declared`, then with its fallback charset.
fn decode_payload(payload: &str, declared: KnownCharset) -> Option<(String, KnownCharset)> {
    let bytes = decode_base64(payload)?;
    [declared, declared.fallback()]
        .into_iter()
        .find_map(|charset| decode_bytes(&bytes, charset).map(|text| (text, charset)))
}

fn decode_base64_text(payload: &str, charset: KnownCharset) -> Option<String> {
    decode_bytes(&decode_base64(payload)?, charset)
}

fn decode_base64(payload: &str) -> Option<Vec<u8>> {
    decode_base64_bytes(payload.as_bytes())
}

/// Lenient base64 decode of a header payload or a transfer-encoded body.
/// Whitespace (including line breaks) is ignored.
pub fn decode_base64_bytes(encoded: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = encoded
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return None;
    }
    LENIENT_BASE64.decode(&compact).ok()
}

/// Strict decode: `None` if the bytes are not valid in `charset`.
fn decode_bytes(bytes: &[u8], charset: KnownCharset) -> Option<String> {
    charset
        .encoding()
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

// ── Raw header access ───────────────────────────────────────────

/// Read and decode Subject and From from a raw message.
///
/// Missing headers decode to empty strings.
pub fn read_mail_headers(raw_message: &[u8]) -> MailHeaders {
    let text = decode_header_bytes(header_block(strip_mbox_separator(raw_message)));
    let headers = unfold_headers(&text);

    MailHeaders {
        subject: decode_header(get_header(&headers, "subject").unwrap_or_default()),
        sender: decode_sender(get_header(&headers, "from").unwrap_or_default()),
    }
}

impl MailHeaders {
    /// The `"{subject} от {sender}"` archive name, safe as a filename.
    pub fn mail_name(&self) -> String {
        compose_mail_name(&self.subject.text, &self.sender.text)
    }
}

/// The header block of a raw message (everything before the first blank line).
pub fn header_block(raw_message: &[u8]) -> &[u8] {
    &raw_message[..find_header_end(raw_message).unwrap_or(raw_message.len())]
}

/// Find the byte offset where headers end (position of the first blank line).
fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if data[i..].starts_with(b"\r\n\r\n") {
            return Some(i);
        }
    }
    None
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to KOI8-R, which maps every byte.
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF_u8, 0xBB, 0xBF][..]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::KOI8_R.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Get the first value for a header name (`name` must be lowercase).
pub fn get_header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Value of parameter `name` in a structured header such as
/// `attachment; filename="a b.pdf"`, with quotes and backslash escapes removed.
///
/// Encoded words in the value are returned untouched.
pub fn header_param(value: &str, name: &str) -> Option<String> {
    split_params(value).into_iter().skip(1).find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| unquote(raw.trim()))
    })
}

/// Split on `;` outside quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"') else {
        return value.to_string();
    };
    let inner = inner.strip_suffix('"').unwrap_or(inner);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            _ => out.push(c),
        }
    }
    out
}
