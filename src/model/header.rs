//! Decoded header values and the charsets they were recovered with.

use std::fmt;

/// Charsets the header decoder knows how to try.
///
/// The set is closed: each member has its own decode attempt and a fixed
/// fallback to the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownCharset {
    Utf8,
    Koi8R,
}

impl KnownCharset {
    /// All known charsets, in detection order.
    pub const ALL: [KnownCharset; 2] = [KnownCharset::Utf8, KnownCharset::Koi8R];

    /// The charset tag as it appears inside an encoded word (`=?<tag>?B?`).
    pub fn tag(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Koi8R => "koi8-r",
        }
    }

    /// The charset tried when decoding with `self` fails.
    pub fn fallback(self) -> Self {
        match self {
            Self::Utf8 => Self::Koi8R,
            Self::Koi8R => Self::Utf8,
        }
    }

    /// The `encoding_rs` codec for this charset.
    pub fn encoding(self) -> &'static encoding_rs::Encoding {
        match self {
            Self::Utf8 => encoding_rs::UTF_8,
            Self::Koi8R => encoding_rs::KOI8_R,
        }
    }
}

/// Which charset actually produced a [`DecodedHeaderField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectedCharset {
    Utf8,
    Koi8R,
    /// No encoded word was found, or decoding failed and the raw text was kept.
    Raw,
}

impl From<KnownCharset> for DetectedCharset {
    fn from(charset: KnownCharset) -> Self {
        match charset {
            KnownCharset::Utf8 => Self::Utf8,
            KnownCharset::Koi8R => Self::Koi8R,
        }
    }
}

/// A header value after encoded-word decoding.
///
/// When decoding fails the raw input is stored unmodified in `text` and
/// `charset` is [`DetectedCharset::Raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeaderField {
    pub text: String,
    pub charset: DetectedCharset,
}

impl DecodedHeaderField {
    /// Wrap a value that was passed through untouched.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            charset: DetectedCharset::Raw,
        }
    }

    /// Whether any encoded word was successfully decoded.
    pub fn was_decoded(&self) -> bool {
        self.charset != DetectedCharset::Raw
    }
}

impl fmt::Display for DecodedHeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The decoded headers a relayed message is named and captioned with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailHeaders {
    pub subject: DecodedHeaderField,
    pub sender: DecodedHeaderField,
}
