//! The relay's final answer.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::fallback::Source;

/// Message returned when every source is exhausted.
pub const UNREACHABLE_MESSAGE: &str = "Unable to connect to the requested site";

/// Content type of the placeholder page.
pub const PLACEHOLDER_CONTENT_TYPE: &str = "text/html";

/// Page served for targets the relay never fetches.
pub const PLACEHOLDER_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Ferry</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
            background: #f4f5f7;
            color: #333;
        }
        .container {
            text-align: center;
            padding: 2rem;
            max-width: 480px;
        }
        h1 {
            margin: 0 0 1rem 0;
            font-size: 1.6rem;
        }
        p {
            margin: 0.5rem 0;
            opacity: 0.8;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>Search pages open outside the frame</h1>
        <p>Search engines cannot be displayed here.</p>
        <p>Enter a site address to continue browsing.</p>
    </div>
</body>
</html>"#;

/// The outcome of one relay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyResult {
    /// Text content, rewritten for framing.
    Text {
        /// Rewritten body.
        content: String,
        /// Declared content type.
        content_type: String,
        /// Status to report.
        status: u16,
        /// `Set-Cookie` values from every identity attempt, in order.
        set_cookies: Vec<String>,
        /// Where the content came from.
        source: Source,
    },
    /// Binary content as a data URI.
    Media {
        /// `data:<type>;base64,<payload>`.
        content: String,
        /// Declared content type.
        content_type: String,
    },
    /// Nothing could be retrieved.
    Unreachable {
        /// Human-readable failure message.
        message: String,
    },
}

impl ProxyResult {
    /// The placeholder page result.
    pub fn placeholder() -> Self {
        ProxyResult::Text {
            content: PLACEHOLDER_PAGE_HTML.to_string(),
            content_type: PLACEHOLDER_CONTENT_TYPE.to_string(),
            status: 200,
            set_cookies: Vec::new(),
            source: Source::Placeholder,
        }
    }

    /// Wraps binary content.
    pub fn media(bytes: &[u8], content_type: &str) -> Self {
        ProxyResult::Media {
            content: data_uri(bytes, content_type),
            content_type: content_type.to_string(),
        }
    }

    /// The terminal failure result.
    pub fn unreachable() -> Self {
        ProxyResult::Unreachable {
            message: UNREACHABLE_MESSAGE.to_string(),
        }
    }

    /// Returns true for binary results.
    pub fn is_media(&self) -> bool {
        matches!(self, ProxyResult::Media { .. })
    }
}

/// Encodes `bytes` as a base64 data URI.
pub fn data_uri(bytes: &[u8], content_type: &str) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_carries_content_type() {
        assert_eq!(data_uri(b"hi", "image/png"), "data:image/png;base64,aGk=");
        assert_eq!(data_uri(&[], "application/pdf"), "data:application/pdf;base64,");
    }

    #[test]
    fn media_result() {
        let result = ProxyResult::media(&[0x25, 0x50, 0x44, 0x46], "application/pdf");
        assert!(result.is_media());
        match result {
            ProxyResult::Media { content, content_type } => {
                assert_eq!(content_type, "application/pdf");
                assert!(content.starts_with("data:application/pdf;base64,"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn placeholder_is_html() {
        match ProxyResult::placeholder() {
            ProxyResult::Text { content_type, status, source, content, .. } => {
                assert_eq!(content_type, "text/html");
                assert_eq!(status, 200);
                assert_eq!(source, Source::Placeholder);
                assert!(content.starts_with("<!DOCTYPE html>"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
