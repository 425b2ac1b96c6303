//! Request identities presented to upstream servers.
//!
//! Each [`IdentityProfile`] is a static bundle of browser-like headers. The
//! relay walks an ordered sequence of them per request and stops at the first
//! one the target accepts.

use serde::Serialize;

/// Client-hint header values sent alongside a Chromium user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientHints {
    /// Value for `sec-ch-ua`.
    pub brands: &'static str,
    /// Value for `sec-ch-ua-platform`.
    pub platform: &'static str,
}

/// An immutable request identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdentityProfile {
    /// Short name used in logs.
    pub name: &'static str,
    /// Value for `User-Agent`.
    pub user_agent: &'static str,
    /// Client hints, if the emulated client sends them.
    pub client_hints: Option<ClientHints>,
    /// Platform label (e.g. "Windows", "iOS").
    pub platform: &'static str,
    /// Whether the identity presents as a mobile client.
    pub mobile: bool,
}

impl IdentityProfile {
    /// Returns the identity's own headers as `(name, value)` pairs.
    ///
    /// Navigation headers (accept, referer, ...) are added by the executor.
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        let mut headers = vec![("user-agent", self.user_agent)];
        if let Some(hints) = &self.client_hints {
            headers.push(("sec-ch-ua", hints.brands));
            headers.push(("sec-ch-ua-platform", hints.platform));
            headers.push((
                "sec-ch-ua-mobile",
                if self.mobile { "?1" } else { "?0" },
            ));
        }
        headers
    }

    /// Returns true for search-crawler identities.
    pub fn is_crawler(&self) -> bool {
        self.platform == "crawler"
    }
}

/// Desktop Chrome on Windows.
pub const CHROME_DESKTOP: IdentityProfile = IdentityProfile {
    name: "chrome-desktop",
    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    client_hints: Some(ClientHints {
        brands: r#""Chromium";v="124", "Google Chrome";v="124", "Not-A.Brand";v="99""#,
        platform: r#""Windows""#,
    }),
    platform: "Windows",
    mobile: false,
};

/// Safari on iPhone.
pub const SAFARI_MOBILE: IdentityProfile = IdentityProfile {
    name: "safari-mobile",
    user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    client_hints: None,
    platform: "iOS",
    mobile: true,
};

/// Firefox on macOS.
pub const FIREFOX_DESKTOP: IdentityProfile = IdentityProfile {
    name: "firefox-desktop",
    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    client_hints: None,
    platform: "macOS",
    mobile: false,
};

/// Search-engine crawler identity.
///
/// Used alone for domains that block generic browsers, and for the cache mirror.
pub const SEARCH_CRAWLER: IdentityProfile = IdentityProfile {
    name: "search-crawler",
    user_agent: "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
    client_hints: None,
    platform: "crawler",
    mobile: false,
};

/// The default identity sequence, tried in this order.
pub static DEFAULT_IDENTITIES: [IdentityProfile; 3] =
    [CHROME_DESKTOP, SAFARI_MOBILE, FIREFOX_DESKTOP];

/// The single-identity sequence for hostile domains.
pub static CRAWLER_IDENTITIES: [IdentityProfile; 1] = [SEARCH_CRAWLER];

/// Returns the default identity sequence by reference.
pub fn default_identities() -> Vec<&'static IdentityProfile> {
    DEFAULT_IDENTITIES.iter().collect()
}

/// Returns the crawler-only identity sequence by reference.
pub fn crawler_identities() -> Vec<&'static IdentityProfile> {
    CRAWLER_IDENTITIES.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sequence_order() {
        let names: Vec<_> = default_identities().iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["chrome-desktop", "safari-mobile", "firefox-desktop"]);
    }

    #[test]
    fn crawler_sequence_is_single() {
        let ids = crawler_identities();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].is_crawler());
    }

    #[test]
    fn chrome_sends_client_hints() {
        let headers = CHROME_DESKTOP.headers();
        assert!(headers.iter().any(|(k, _)| *k == "sec-ch-ua"));
        assert!(headers.contains(&("sec-ch-ua-mobile", "?0")));
    }

    #[test]
    fn safari_has_no_client_hints() {
        let headers = SAFARI_MOBILE.headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "user-agent");
        assert!(SAFARI_MOBILE.mobile);
    }

    #[test]
    fn user_agents_are_single_line() {
        for id in DEFAULT_IDENTITIES.iter().chain(CRAWLER_IDENTITIES.iter()) {
            assert!(!id.user_agent.contains('\n'), "{} has a newline", id.name);
            assert!(!id.user_agent.contains("  "), "{} has double spaces", id.name);
        }
    }
}
