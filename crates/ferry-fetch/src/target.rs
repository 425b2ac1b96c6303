//! The resource a request asks the relay to fetch.

use std::collections::HashMap;

use reqwest::Method;
use url::Url;

use ferry_core::PLACEHOLDER_URL;

use crate::error::{FetchError, Result};

/// Origin used for referer/origin headers when the target URL does not parse.
pub const FALLBACK_ORIGIN: &str = "https://www.google.com";

/// Caller header carrying a cookie string to forward upstream.
pub const PROXY_COOKIE_HEADER: &str = "x-proxy-cookie";

/// A normalized fetch target.
#[derive(Debug, Clone)]
pub struct FetchTarget {
    /// URL to fetch.
    pub url: String,
    /// Scheme + host + port of `url`, or [`FALLBACK_ORIGIN`].
    pub origin: String,
    /// HTTP method.
    pub method: Method,
    /// Cookie string forwarded from the caller.
    pub cookie: Option<String>,
    /// Content type of `body`, if the caller supplied one.
    pub content_type: Option<String>,
    /// Request body.
    pub body: Option<String>,
}

impl FetchTarget {
    /// Creates a GET target for `url`.
    pub fn get(url: &str) -> Self {
        let url = normalize_url(url);
        let origin = origin_of(&url);
        Self {
            url,
            origin,
            method: Method::GET,
            cookie: None,
            content_type: None,
            body: None,
        }
    }

    /// Builds a target from the parts of an inbound relay request.
    ///
    /// Header names are matched case-insensitively. A URL that does not parse
    /// is kept as given with [`FALLBACK_ORIGIN`]; fetching it fails later.
    pub fn from_parts(
        url: &str,
        method: Option<&str>,
        headers: &HashMap<String, String>,
        body: Option<String>,
    ) -> Result<Self> {
        let mut target = Self::get(url);

        if let Some(m) = method.map(str::trim).filter(|m| !m.is_empty()) {
            target.method = Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| FetchError::InvalidMethod(m.to_string()))?;
        }

        let header = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        };
        target.cookie = header(PROXY_COOKIE_HEADER);
        target.content_type = header("content-type");
        target.body = body;

        Ok(target)
    }

    /// Points the target at a different URL, recomputing the origin.
    pub fn retarget(&mut self, url: &str) {
        self.url = url.to_string();
        self.origin = origin_of(url);
    }

    /// Returns true when the method carries no side effects worth protecting.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

/// Trims `url` and prepends `https://` when it has no scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") || url.is_empty() || url == PLACEHOLDER_URL {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("https://{}", url)
    }
}

/// Returns the origin of `url`, or [`FALLBACK_ORIGIN`] if it has none.
pub fn origin_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => parsed.origin().ascii_serialization(),
        _ => FALLBACK_ORIGIN.to_string(),
    }
}
