//! Block-page detection.
//!
//! A successful HTTP exchange can still deliver an interstitial instead of the
//! page (captcha walls, bot checks). [`BlockDetector`] is the predicate the
//! fetch loop consults for text bodies; [`PhraseBlockDetector`] is the default
//! implementation backed by a case-insensitive [`RegexSet`].

use regex::{RegexSet, RegexSetBuilder};

/// Phrases that mark a body as a block page.
pub const DEFAULT_BLOCK_PHRASES: &[&str] = &["captcha", "access denied", "security check"];

/// Decides whether a text body is a block page.
pub trait BlockDetector: Send + Sync {
    /// Returns true if `body` looks like a block page.
    fn is_blocked(&self, body: &str) -> bool;
}

/// Keyword-based block detector.
///
/// Matching is approximate: pages that merely mention a phrase are flagged too.
#[derive(Debug, Clone)]
pub struct PhraseBlockDetector {
    phrases: Vec<String>,
    set: RegexSet,
}

impl PhraseBlockDetector {
    /// Creates a detector for the given literal phrases.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let phrases: Vec<String> = phrases.into_iter().map(Into::into).collect();
        let escaped: Vec<String> = phrases.iter().map(|p| regex::escape(p)).collect();
        let set = RegexSetBuilder::new(&escaped)
            .case_insensitive(true)
            .build()
            .expect("escaped literals always compile");
        Self { phrases, set }
    }

    /// Creates a detector with [`DEFAULT_BLOCK_PHRASES`].
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_BLOCK_PHRASES.iter().copied())
    }

    /// Returns the configured phrases.
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Returns the first phrase found in `body`, if any.
    pub fn matched_phrase(&self, body: &str) -> Option<&str> {
        self.set
            .matches(body)
            .into_iter()
            .next()
            .map(|i| self.phrases[i].as_str())
    }
}

impl Default for PhraseBlockDetector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl BlockDetector for PhraseBlockDetector {
    fn is_blocked(&self, body: &str) -> bool {
        self.set.is_match(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_default_phrases_case_insensitively() {
        let detector = PhraseBlockDetector::with_defaults();
        assert!(detector.is_blocked("<h1>Please complete the CAPTCHA</h1>"));
        assert!(detector.is_blocked("Access Denied"));
        assert!(detector.is_blocked("Running a Security Check..."));
    }

    #[test]
    fn ordinary_page_not_blocked() {
        let detector = PhraseBlockDetector::with_defaults();
        assert!(!detector.is_blocked("<html><body>Hello world</body></html>"));
        assert!(!detector.is_blocked(""));
    }

    #[test]
    fn matched_phrase_reports_phrase() {
        let detector = PhraseBlockDetector::with_defaults();
        assert_eq!(detector.matched_phrase("ACCESS DENIED"), Some("access denied"));
        assert_eq!(detector.matched_phrase("fine"), None);
    }

    #[test]
    fn custom_phrases_are_literal() {
        let detector = PhraseBlockDetector::new(["verify you are human", "a.b"]);
        assert!(detector.is_blocked("Please VERIFY you are human"));
        assert!(!detector.is_blocked("axb"));
        assert!(detector.is_blocked("a.b"));
        assert!(!detector.is_blocked("captcha"));
    }

    #[test]
    fn usable_as_trait_object() {
        let detector: Box<dyn BlockDetector> = Box::new(PhraseBlockDetector::default());
        assert!(detector.is_blocked("captcha"));
    }
}
