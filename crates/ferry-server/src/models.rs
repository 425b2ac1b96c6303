//! API request and response models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ferry_fetch::ProxyResult;

use crate::error::ErrorResponse;

/// Request body for POST /api/proxy.
#[derive(Debug, Deserialize)]
pub struct ProxyRequest {
    /// Target URL. Required; a scheme is added when missing.
    pub url: Option<String>,
    /// HTTP method to forward (default: GET).
    #[serde(default)]
    pub method: Option<String>,
    /// Caller headers. Only `x-proxy-cookie` and `content-type` are used.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request body to forward.
    #[serde(default)]
    pub body: Option<String>,
}

/// Text content response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResponse {
    pub content: String,
    pub content_type: String,
    pub status: u16,
    pub set_cookies: Vec<String>,
}

/// Binary content response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResponse {
    /// `data:` URI.
    pub content: String,
    pub content_type: String,
    pub is_media: bool,
}

/// Response body for POST /api/proxy.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProxyResponse {
    Text(TextResponse),
    Media(MediaResponse),
    Error(ErrorResponse),
}

impl From<ProxyResult> for ProxyResponse {
    fn from(result: ProxyResult) -> Self {
        match result {
            ProxyResult::Text {
                content,
                content_type,
                status,
                set_cookies,
                ..
            } => ProxyResponse::Text(TextResponse {
                content,
                content_type,
                status,
                set_cookies,
            }),
            ProxyResult::Media {
                content,
                content_type,
            } => ProxyResponse::Media(MediaResponse {
                content,
                content_type,
                is_media: true,
            }),
            ProxyResult::Unreachable { message } => {
                ProxyResponse::Error(ErrorResponse { error: message })
            }
        }
    }
}

/// Response body for GET /api/health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_fetch::Source;
    use serde_json::json;

    #[test]
    fn request_defaults() {
        let req: ProxyRequest = serde_json::from_value(json!({ "url": "a.test" })).unwrap();
        assert_eq!(req.url.as_deref(), Some("a.test"));
        assert!(req.method.is_none());
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
    }

    #[test]
    fn text_shape() {
        let response = ProxyResponse::from(ProxyResult::Text {
            content: "<p>x</p>".to_string(),
            content_type: "text/html".to_string(),
            status: 404,
            set_cookies: vec!["a=1".to_string()],
            source: Source::Direct,
        });
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "content": "<p>x</p>",
                "contentType": "text/html",
                "status": 404,
                "setCookies": ["a=1"]
            })
        );
    }

    #[test]
    fn media_shape() {
        let response = ProxyResponse::from(ProxyResult::media(b"GIF89a", "image/gif"));
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["isMedia"], true);
        assert_eq!(value["contentType"], "image/gif");
        assert!(value["content"].as_str().unwrap().starts_with("data:image/gif;base64,"));
        assert!(value.get("status").is_none());
    }

    #[test]
    fn unreachable_shape() {
        let response = ProxyResponse::from(ProxyResult::unreachable());
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({ "error": ferry_fetch::UNREACHABLE_MESSAGE })
        );
    }
}
