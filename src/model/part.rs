//! MIME tree nodes and the files extracted from them.
//!
//! Part bodies are borrowed from the parsed message where possible. Text
//! bodies are undone from their transfer encoding only, so they keep their
//! original charset.

use std::borrow::Cow;

/// A node of a (possibly nested) MIME tree.
#[derive(Debug, Clone, Default)]
pub struct MessagePart<'a> {
    /// Lowercased `type/subtype` (e.g. `"text/plain"`).
    pub content_type: String,

    /// Declared filename from `Content-Disposition` or `Content-Type`, as
    /// written in the header. Encoded words are not decoded yet.
    pub filename: Option<String>,

    /// Transfer-decoded body bytes. Empty for multipart containers.
    pub body: Cow<'a, [u8]>,

    /// Body of a text leaf converted to UTF-8 from its declared charset.
    pub decoded_text: Option<&'a str>,

    /// Child parts in document order. Empty for leaves.
    pub children: Vec<MessagePart<'a>>,
}

impl<'a> MessagePart<'a> {
    /// Build a leaf part.
    pub fn leaf(content_type: &str, filename: Option<&str>, body: &'a [u8]) -> Self {
        Self {
            content_type: content_type.to_ascii_lowercase(),
            filename: filename.map(String::from),
            body: Cow::Borrowed(body),
            decoded_text: None,
            children: Vec::new(),
        }
    }

    /// Build a text leaf: raw `body` bytes plus their UTF-8 reading.
    pub fn text_leaf(
        content_type: &str,
        filename: Option<&str>,
        body: Cow<'a, [u8]>,
        decoded_text: &'a str,
    ) -> Self {
        Self {
            body,
            decoded_text: Some(decoded_text),
            ..Self::leaf(content_type, filename, &[])
        }
    }

    /// Build a multipart container.
    pub fn multipart(content_type: &str, children: Vec<MessagePart<'a>>) -> Self {
        Self {
            content_type: content_type.to_ascii_lowercase(),
            filename: None,
            body: Cow::Borrowed(&[]),
            decoded_text: None,
            children,
        }
    }

    /// Leaves are the only parts ever written to an archive.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The declared filename, treating an empty value as absent.
    pub fn declared_filename(&self) -> Option<&str> {
        self.filename.as_deref().filter(|name| !name.is_empty())
    }

    /// The body as text: the charset-decoded reading when there is one,
    /// otherwise the bytes read as UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        match self.decoded_text {
            Some(text) => Cow::Borrowed(text),
            None => String::from_utf8_lossy(&self.body),
        }
    }
}

/// How a leaf part was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// Unnamed `text/html` body.
    Html,
    /// Unnamed `text/plain` body.
    PlainText,
    /// Any part with a declared filename.
    Attachment,
}

/// One archive entry: a filename and the bytes to store under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile<'a> {
    /// Never empty.
    pub filename: String,
    pub kind: PartKind,
    pub bytes: &'a [u8],
}
