//! Content classification.
//!
//! Splits upstream responses into text (read and rewritten as a string) and
//! binary (passed through as bytes) by declared content type.

use serde::Serialize;

/// Content type assumed when the upstream declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Broad family of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// HTML or XHTML.
    Markup,
    /// JavaScript.
    Script,
    /// CSS.
    Style,
    /// Plain text, JSON, XML and other structured text.
    Structured,
    /// Anything else.
    Binary,
}

impl ContentKind {
    /// Classifies a declared content type.
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("html") {
            ContentKind::Markup
        } else if ct.contains("javascript") || ct.contains("ecmascript") {
            ContentKind::Script
        } else if ct.contains("css") {
            ContentKind::Style
        } else if ct.contains("text") || ct.contains("json") || ct.contains("xml") {
            ContentKind::Structured
        } else {
            ContentKind::Binary
        }
    }

    /// Returns true for every kind except [`ContentKind::Binary`].
    pub fn is_text(self) -> bool {
        !matches!(self, ContentKind::Binary)
    }
}

/// A response body: decoded text or raw bytes, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Decoded text body.
    Text(String),
    /// Raw binary body.
    Bytes(Vec<u8>),
}

impl Body {
    /// Decodes raw bytes according to the content kind.
    pub fn decode(bytes: Vec<u8>, kind: ContentKind) -> Self {
        if kind.is_text() {
            match String::from_utf8(bytes) {
                Ok(text) => Body::Text(text),
                Err(e) => Body::Text(String::from_utf8_lossy(e.as_bytes()).into_owned()),
            }
        } else {
            Body::Bytes(bytes)
        }
    }

    /// Returns the text, if this is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Bytes(_) => None,
        }
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Body::Text(text) => text.len(),
            Body::Bytes(bytes) => bytes.len(),
        }
    }

    /// Returns true if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns the declared content type, or [`DEFAULT_CONTENT_TYPE`] when absent.
pub fn declared_content_type(header: Option<&str>) -> String {
    match header.map(str::trim) {
        Some(ct) if !ct.is_empty() => ct.to_string(),
        _ => DEFAULT_CONTENT_TYPE.to_string(),
    }
}
