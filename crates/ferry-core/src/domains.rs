//! Domain routing.
//!
//! Decides, before any network traffic, where a target URL is actually fetched
//! from and which identities are used to fetch it.
//!
//! Rules are matched by host pattern:
//! - exact (`reddit.com`)
//! - single wildcard (`*.bing.com`, one subdomain level)
//! - double wildcard (`**.reddit.com`, any depth)
//!
//! The first matching rule of each kind wins.

use url::Url;

use crate::identity::{crawler_identities, default_identities, IdentityProfile};

/// Internal URL served by the relay itself instead of a live fetch.
pub const PLACEHOLDER_URL: &str = "ferry:placeholder";

/// What a matching rule does to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// Replace the target with the internal placeholder page.
    Placeholder,
    /// Rewrite the host to a lighter-weight mirror host.
    Mirror {
        /// Host to fetch from instead.
        host: String,
    },
    /// Use only the search-crawler identity.
    CrawlerOnly,
}

/// A host pattern with the action it triggers.
#[derive(Debug, Clone)]
pub struct DomainRule {
    /// Domain pattern (exact or wildcard like `*.domain.com`).
    pub pattern: String,
    /// Action for matching hosts.
    pub kind: RuleKind,
}

impl DomainRule {
    /// Creates a new rule. The pattern is stored lowercased.
    pub fn new(pattern: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            pattern: pattern.into().to_ascii_lowercase(),
            kind,
        }
    }

    /// Creates a placeholder rule.
    pub fn placeholder(pattern: impl Into<String>) -> Self {
        Self::new(pattern, RuleKind::Placeholder)
    }

    /// Creates a mirror rule.
    pub fn mirror(pattern: impl Into<String>, host: impl Into<String>) -> Self {
        Self::new(pattern, RuleKind::Mirror { host: host.into() })
    }

    /// Creates a crawler-only rule.
    pub fn crawler_only(pattern: impl Into<String>) -> Self {
        Self::new(pattern, RuleKind::CrawlerOnly)
    }

    fn is_double_wildcard(&self) -> bool {
        self.pattern.starts_with("**.")
    }

    fn is_single_wildcard(&self) -> bool {
        self.pattern.starts_with("*.") && !self.is_double_wildcard()
    }

    fn base_domain(&self) -> &str {
        if self.is_double_wildcard() {
            &self.pattern[3..]
        } else if self.is_single_wildcard() {
            &self.pattern[2..]
        } else {
            &self.pattern
        }
    }

    /// Checks if a host matches this rule's pattern.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.split(':').next().unwrap_or(host);
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let base = self.base_domain();

        if self.is_double_wildcard() {
            host == base || host.ends_with(&format!(".{}", base))
        } else if self.is_single_wildcard() {
            if host == base {
                return true;
            }
            match host.strip_suffix(&format!(".{}", base)) {
                Some(prefix) => !prefix.contains('.'),
                None => false,
            }
        } else {
            host == self.pattern
        }
    }
}

/// Returns the bundled routing rules.
pub fn bundled_rules() -> Vec<DomainRule> {
    vec![
        // Search engines are never fetched live
        DomainRule::placeholder("google.com"),
        DomainRule::placeholder("www.google.com"),
        DomainRule::placeholder("*.bing.com"),
        DomainRule::placeholder("*.duckduckgo.com"),
        DomainRule::placeholder("search.yahoo.com"),
        DomainRule::placeholder("yandex.com"),
        DomainRule::placeholder("www.yandex.com"),
        // Discussion sites with a lighter mirror
        DomainRule::mirror("**.reddit.com", "old.reddit.com"),
        // Sites that block generic browsers but admit crawlers
        DomainRule::crawler_only("**.reddit.com"),
        DomainRule::crawler_only("**.quora.com"),
        DomainRule::crawler_only("**.medium.com"),
    ]
}

/// The outcome of routing a target URL.
#[derive(Debug, Clone)]
pub struct Route {
    /// The URL to fetch, possibly rewritten.
    pub url: String,
    /// Identities to try, in order.
    pub identities: Vec<&'static IdentityProfile>,
    /// Whether `url` is the internal placeholder page.
    pub placeholder: bool,
}

impl Route {
    fn placeholder() -> Self {
        Self {
            url: PLACEHOLDER_URL.to_string(),
            identities: Vec::new(),
            placeholder: true,
        }
    }
}

/// Routes target URLs according to a list of [`DomainRule`]s.
#[derive(Debug, Clone)]
pub struct DomainClassifier {
    rules: Vec<DomainRule>,
}

impl Default for DomainClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DomainClassifier {
    /// Creates a classifier with the given rules.
    pub fn new(rules: Vec<DomainRule>) -> Self {
        Self { rules }
    }

    /// Creates a classifier with the bundled rules.
    pub fn with_defaults() -> Self {
        Self::new(bundled_rules())
    }

    /// Returns the configured rules.
    pub fn rules(&self) -> &[DomainRule] {
        &self.rules
    }

    fn find(&self, host: &str, pred: impl Fn(&RuleKind) -> bool) -> Option<&DomainRule> {
        self.rules
            .iter()
            .find(|rule| pred(&rule.kind) && rule.matches(host))
    }

    /// Resolves a target URL into the URL to fetch and the identities to use.
    ///
    /// Never fails: a URL without a host keeps its text and gets the default
    /// identity sequence.
    pub fn resolve(&self, url: &str) -> Route {
        if url == PLACEHOLDER_URL {
            return Route::placeholder();
        }
        let Some(mut parsed) = Url::parse(url).ok().filter(|u| u.host_str().is_some()) else {
            tracing::debug!(url_len = url.len(), "Unroutable target, using defaults");
            return Route {
                url: url.to_string(),
                identities: default_identities(),
                placeholder: false,
            };
        };
        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

        if self
            .find(&host, |k| matches!(k, RuleKind::Placeholder))
            .is_some()
        {
            tracing::debug!(%host, "Search engine target, serving placeholder");
            return Route::placeholder();
        }

        if let Some(DomainRule {
            kind: RuleKind::Mirror { host: mirror },
            ..
        }) = self.find(&host, |k| matches!(k, RuleKind::Mirror { .. }))
        {
            if host != *mirror && parsed.set_host(Some(mirror.as_str())).is_ok() {
                tracing::debug!(from = %host, to = %mirror, "Rewrote target to mirror host");
            }
        }

        let identities = if self
            .find(&host, |k| matches!(k, RuleKind::CrawlerOnly))
            .is_some()
        {
            crawler_identities()
        } else {
            default_identities()
        };

        Route {
            url: parsed.to_string(),
            identities,
            placeholder: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== DomainRule Tests ====================

    #[test]
    fn rule_matches_exact() {
        let rule = DomainRule::placeholder("google.com");
        assert!(rule.matches("google.com"));
        assert!(rule.matches("GOOGLE.com:443"));
        assert!(!rule.matches("docs.google.com"));
        assert!(!rule.matches("notgoogle.com"));
    }

    #[test]
    fn rule_pattern_case_insensitive() {
        let rule = DomainRule::crawler_only("Intranet.Example.COM");
        assert_eq!(rule.pattern, "intranet.example.com");
        assert!(rule.matches("intranet.example.com"));
        assert!(rule.matches("INTRANET.example.com"));

        let rule = DomainRule::placeholder("*.Search.Example");
        assert!(rule.matches("www.search.example"));
    }

    #[test]
    fn rule_matches_single_wildcard() {
        let rule = DomainRule::placeholder("*.bing.com");
        assert!(rule.matches("bing.com"));
        assert!(rule.matches("www.bing.com"));
        assert!(!rule.matches("a.b.bing.com"));
    }

    #[test]
    fn rule_matches_double_wildcard() {
        let rule = DomainRule::crawler_only("**.reddit.com");
        assert!(rule.matches("reddit.com"));
        assert!(rule.matches("www.reddit.com"));
        assert!(rule.matches("a.b.reddit.com"));
        assert!(!rule.matches("notreddit.com"));
    }

    // ==================== Placeholder Tests ====================

    #[test]
    fn search_engine_resolves_to_placeholder() {
        let classifier = DomainClassifier::with_defaults();
        for url in [
            "https://www.google.com/search?q=test",
            "https://google.com/",
            "http://www.google.com/maps?x=1#frag",
            "https://www.bing.com/search?q=rust",
            "https://duckduckgo.com/?q=a",
        ] {
            let route = classifier.resolve(url);
            assert!(route.placeholder, "{url}");
            assert_eq!(route.url, PLACEHOLDER_URL);
        }
    }

    #[test]
    fn placeholder_url_resolves_to_itself() {
        let route = DomainClassifier::with_defaults().resolve(PLACEHOLDER_URL);
        assert!(route.placeholder);
        assert!(route.identities.is_empty());
    }

    #[test]
    fn non_search_google_subdomain_is_fetched() {
        let route = DomainClassifier::with_defaults().resolve("https://docs.google.com/doc");
        assert!(!route.placeholder);
        assert_eq!(route.url, "https://docs.google.com/doc");
    }

    // ==================== Mirror Tests ====================

    #[test]
    fn reddit_rewritten_to_old_reddit() {
        let route = DomainClassifier::with_defaults().resolve("https://www.reddit.com/r/test");
        assert_eq!(route.url, "https://old.reddit.com/r/test");
        assert_eq!(route.identities.len(), 1);
        assert!(route.identities[0].is_crawler());
    }

    #[test]
    fn reddit_mirror_preserves_path_and_query() {
        let route = DomainClassifier::with_defaults()
            .resolve("https://reddit.com/r/rust/comments/abc/?sort=new&limit=5");
        assert_eq!(
            route.url,
            "https://old.reddit.com/r/rust/comments/abc/?sort=new&limit=5"
        );
    }

    #[test]
    fn old_reddit_left_alone() {
        let route = DomainClassifier::with_defaults().resolve("https://old.reddit.com/r/test");
        assert_eq!(route.url, "https://old.reddit.com/r/test");
    }

    // ==================== Identity Selection Tests ====================

    #[test]
    fn ordinary_domain_uses_default_sequence() {
        let route = DomainClassifier::with_defaults().resolve("https://example.com/page");
        assert_eq!(route.identities.len(), 3);
        assert_eq!(route.identities[0].name, "chrome-desktop");
        assert!(!route.placeholder);
    }

    #[test]
    fn hostile_domain_uses_crawler() {
        let route = DomainClassifier::with_defaults().resolve("https://www.quora.com/q");
        assert_eq!(route.identities.len(), 1);
        assert_eq!(route.identities[0].name, "search-crawler");
    }

    #[test]
    fn unparseable_url_falls_back_to_defaults() {
        let route = DomainClassifier::with_defaults().resolve("not a url");
        assert_eq!(route.url, "not a url");
        assert_eq!(route.identities.len(), 3);
        assert!(!route.placeholder);
    }

    #[test]
    fn custom_rules() {
        let classifier = DomainClassifier::new(vec![DomainRule::mirror(
            "**.example.org",
            "lite.example.org",
        )]);
        let route = classifier.resolve("https://www.example.org/a?b=c");
        assert_eq!(route.url, "https://lite.example.org/a?b=c");
        assert_eq!(route.identities.len(), 3);
    }
}
