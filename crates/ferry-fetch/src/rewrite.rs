//! Text rewriting for display inside a sandboxed frame.
//!
//! ## Pipeline
//!
//! ```text
//! text ─▶ strip markers ─▶ inject <base> ─▶ generative rewrite ─▶ inject guard ─▶ neutralize
//!         (XFO/CSP meta,   (markup only,    (markup/script,        (after <body>,    (top !== self,
//!          integrity,       if missing)      bounded, raced)        or prepended)     top.location =)
//!          nonce)
//! ```
//!
//! Every step except the generative one is a pure string transform. The
//! generative step either replaces the leading window of the document or
//! leaves the content exactly as it was.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::RelayConfig;
use crate::content::ContentKind;
use crate::generate::{TextGenerator, NO_CHANGE_SENTINEL};

/// Attribute marking the injected guard script.
pub const GUARD_MARKER: &str = "data-ferry-guard";

/// Instruction sent ahead of the document to the text generator.
pub const REWRITE_INSTRUCTION: &str = "You are given the beginning of a web document. \
Remove any logic that detects being embedded in a frame and breaks out of it, redirects \
the top window, or refuses to render (frame-busting), and remove subresource integrity \
checks. Keep everything else byte-for-byte identical. Reply with only the rewritten code. \
If nothing needs to change, reply with exactly NO_CHANGE.";

/// Script injected into every markup and script response.
pub const GUARD_SCRIPT: &str = r#"(function () {
  var w = window;
  try { Object.defineProperty(navigator, 'webdriver', { get: function () { return false; } }); } catch (e) {}
  try {
    w.onbeforeunload = null;
    w.addEventListener('beforeunload', function (e) { e.stopImmediatePropagation(); }, true);
    Object.defineProperty(w, 'onbeforeunload', { set: function () {}, get: function () { return null; } });
  } catch (e) {}
  try {
    var open = w.open;
    w.open = function (url, name, features) {
      if (name === '_top' || name === '_parent') { name = '_self'; }
      return open.call(w, url, name, features);
    };
  } catch (e) {}
  try {
    if (!w.chrome) { w.chrome = { runtime: {} }; }
    else if (!w.chrome.runtime) { w.chrome.runtime = {}; }
  } catch (e) {}
  try {
    var perms = w.navigator.permissions;
    if (perms && perms.query) {
      var query = perms.query.bind(perms);
      perms.query = function (p) {
        if (p && p.name === 'notifications') {
          return Promise.resolve({ state: typeof Notification !== 'undefined' ? Notification.permission : 'default' });
        }
        return query(p);
      };
    }
  } catch (e) {}
  try {
    var embedded = w.parent !== w;
    if (embedded) {
      Object.defineProperty(w, 'top', { get: function () { return w; } });
      Object.defineProperty(w, 'parent', { get: function () { return w; } });
    }
  } catch (e) {}
})();"#;

static XFO_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta\b[^>]*http-equiv\s*=\s*["']?\s*x-frame-options[^>]*>"#)
        .expect("valid regex")
});

static CSP_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta\b[^>]*http-equiv\s*=\s*["']?\s*content-security-policy(?:-report-only)?[^>]*>"#,
    )
    .expect("valid regex")
});

static INTEGRITY_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(<(?:script|link|style)\b[^>]*?)\s+integrity\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#,
    )
    .expect("valid regex")
});

static NONCE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(<(?:script|link|style)\b[^>]*?)\s+nonce\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
        .expect("valid regex")
});

static BASE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<base[\s>]").expect("valid regex"));

static HEAD_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("valid regex"));

static BODY_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<body(?:\s[^>]*)?>").expect("valid regex"));

static TOP_SELF_CHECK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"if\s*\(\s*(?:(?:window\.)?top\s*!==?\s*(?:window\.)?self|(?:window\.)?self\s*!==?\s*(?:window\.)?top)\s*\)",
    )
    .expect("valid regex")
});

static TOP_LOCATION_ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\w.$])(?:window\.)?top\.location(?:\.href)?\s*=([^=])")
        .expect("valid regex")
});

static CODE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("valid regex"));

static CODE_FENCE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?```\s*$").expect("valid regex"));

/// Removes embedding-control meta tags and integrity/nonce attributes.
pub fn strip_security_markers(content: &str) -> String {
    let out = XFO_META.replace_all(content, "");
    let out = CSP_META.replace_all(&out, "");
    let out = INTEGRITY_ATTR.replace_all(&out, "${1}");
    NONCE_ATTR.replace_all(&out, "${1}").into_owned()
}

/// Inserts `<base href="{origin}/">` right after `<head>` unless a base tag exists.
///
/// Documents without a head get the tag prepended.
pub fn inject_base(content: &str, origin: &str) -> String {
    if BASE_TAG.is_match(content) {
        return content.to_string();
    }
    let tag = format!(r#"<base href="{}/">"#, origin.trim_end_matches('/'));
    insert_after(content, &HEAD_OPEN, &tag)
}

/// Inserts the guard script: after `<body>` for markup, prepended for scripts.
///
/// Already guarded content is returned unchanged.
pub fn inject_guard(content: &str, kind: ContentKind) -> String {
    if content.contains(GUARD_MARKER) {
        return content.to_string();
    }
    match kind {
        ContentKind::Markup => {
            let tag = format!("<script {}>{}</script>", GUARD_MARKER, GUARD_SCRIPT);
            insert_after(content, &BODY_OPEN, &tag)
        }
        ContentKind::Script => format!("/* {} */\n{}\n{}", GUARD_MARKER, GUARD_SCRIPT, content),
        _ => content.to_string(),
    }
}

/// Defuses `if (top !== self)` checks and `top.location =` assignments.
pub fn neutralize_frame_busting(content: &str) -> String {
    let out = TOP_SELF_CHECK.replace_all(content, "if (false)");
    TOP_LOCATION_ASSIGN
        .replace_all(&out, "${1}self.__ferryTopNav =${2}")
        .into_owned()
}

fn insert_after(content: &str, marker: &Regex, insertion: &str) -> String {
    match marker.find(content) {
        Some(m) => {
            let mut out = String::with_capacity(content.len() + insertion.len());
            out.push_str(&content[..m.end()]);
            out.push_str(insertion);
            out.push_str(&content[m.end()..]);
            out
        }
        None => format!("{}{}", insertion, content),
    }
}

/// Splits `content` after `chars` characters.
pub fn split_at_chars(content: &str, chars: usize) -> (&str, &str) {
    match content.char_indices().nth(chars) {
        Some((idx, _)) => content.split_at(idx),
        None => (content, ""),
    }
}

/// Removes surrounding markdown code fences from a model reply.
pub fn strip_code_fences(reply: &str) -> String {
    let trimmed = reply.trim();
    let out = CODE_FENCE_OPEN.replace(trimmed, "");
    CODE_FENCE_CLOSE.replace(&out, "").into_owned()
}

/// Turns a model reply into replacement content, or `None` to keep the original.
///
/// `remainder` is the untouched tail beyond the prompt window and is appended
/// to an accepted reply.
pub fn accept_reply(reply: &str, remainder: &str, min_reply_chars: usize) -> Option<String> {
    let cleaned = strip_code_fences(reply);
    if cleaned.trim() == NO_CHANGE_SENTINEL || cleaned.chars().count() < min_reply_chars {
        return None;
    }
    let mut out = cleaned;
    out.push_str(remainder);
    Some(out)
}

/// Runs the rewrite steps for one text response.
pub struct RewritePipeline<'a> {
    generator: &'a dyn TextGenerator,
    config: &'a RelayConfig,
}

impl<'a> RewritePipeline<'a> {
    /// Creates a pipeline.
    pub fn new(generator: &'a dyn TextGenerator, config: &'a RelayConfig) -> Self {
        Self { generator, config }
    }

    fn wants_generation(&self, content: &str, kind: ContentKind) -> bool {
        if !self.config.ai_rewrite || !matches!(kind, ContentKind::Markup | ContentKind::Script) {
            return false;
        }
        let len = content.chars().count();
        len >= self.config.rewrite_min_chars && len <= self.config.rewrite_max_chars
    }

    /// Asks the generator to rewrite the leading window of `content`.
    ///
    /// Returns `content` unchanged on timeout, error, or an unusable reply.
    pub async fn generate(&self, content: String, kind: ContentKind) -> String {
        if !self.wants_generation(&content, kind) {
            return content;
        }

        let (head, remainder) = split_at_chars(&content, self.config.rewrite_window_chars);
        let prompt = format!("{}\n\n{}", REWRITE_INSTRUCTION, head);

        let pending = self.generator.generate(&prompt);
        let reply = match tokio::time::timeout(self.config.rewrite_timeout, pending).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                debug!(error = %e, "Generative rewrite unavailable");
                return content;
            }
            Err(_) => {
                debug!(
                    timeout_ms = self.config.rewrite_timeout.as_millis() as u64,
                    "Generative rewrite timed out"
                );
                return content;
            }
        };

        match accept_reply(&reply, remainder, self.config.min_reply_chars) {
            Some(rewritten) => {
                debug!(
                    before = content.len(),
                    after = rewritten.len(),
                    "Accepted generative rewrite"
                );
                rewritten
            }
            None => content,
        }
    }

    /// Runs the whole pipeline.
    pub async fn rewrite(&self, content: &str, kind: ContentKind, origin: &str) -> String {
        let mut out = strip_security_markers(content);
        if kind == ContentKind::Markup {
            out = inject_base(&out, origin);
        }
        out = self.generate(out, kind).await;
        out = inject_guard(&out, kind);
        neutralize_frame_busting(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerateError;
    use crate::generate::NoopGenerator;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedGenerator(String);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Ok(self.0.clone())
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("x".repeat(500))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Err(GenerateError::Empty)
        }
    }

    fn page(body: &str) -> String {
        format!("<html><head><title>t</title></head><body>{}</body></html>", body)
    }

    // ==================== Marker Stripping Tests ====================

    #[test]
    fn strips_frame_options_meta() {
        let html = r#"<head><meta http-equiv="X-Frame-Options" content="DENY"><title>a</title></head>"#;
        let out = strip_security_markers(html);
        assert!(!out.to_lowercase().contains("x-frame-options"));
        assert!(out.contains("<title>a</title>"));
    }

    #[test]
    fn strips_csp_meta_variants() {
        let html = "<meta http-equiv='Content-Security-Policy' content=\"frame-ancestors 'none'\">\
                    <META HTTP-EQUIV=content-security-policy-report-only CONTENT=x>";
        let out = strip_security_markers(html);
        assert!(!out.to_lowercase().contains("content-security-policy"));
    }

    #[test]
    fn strips_integrity_and_nonce() {
        let html = r#"<script src="/a.js" integrity="sha384-abc" crossorigin="anonymous" nonce='n1'></script>"#;
        let out = strip_security_markers(html);
        assert_eq!(out, r#"<script src="/a.js" crossorigin="anonymous"></script>"#);
    }

    #[test]
    fn integrity_outside_tags_untouched() {
        let js = "var integrity = check(); var nonce = 1;";
        assert_eq!(strip_security_markers(js), js);
    }

    #[test]
    fn keeps_unrelated_meta() {
        let html = r#"<meta charset="utf-8"><meta name="viewport" content="width=device-width">"#;
        assert_eq!(strip_security_markers(html), html);
    }

    // ==================== Base Injection Tests ====================

    #[test]
    fn injects_base_after_head() {
        let out = inject_base(&page(""), "https://example.com");
        assert!(out.starts_with(r#"<html><head><base href="https://example.com/"><title>"#));
    }

    #[test]
    fn keeps_existing_base() {
        let html = r#"<head><base href="/x/"></head>"#;
        assert_eq!(inject_base(html, "https://example.com"), html);
    }

    #[test]
    fn base_ignores_header_element() {
        let html = "<header>nav</header><head lang=\"en\"></head>";
        let out = inject_base(html, "https://a.test");
        assert!(out.contains(r#"<head lang="en"><base href="https://a.test/">"#));
    }

    // ==================== Guard Injection Tests ====================

    #[test]
    fn guard_after_body_for_markup() {
        let out = inject_guard(&page("<p>x</p>"), ContentKind::Markup);
        let body_at = out.find("<body>").unwrap();
        let guard_at = out.find(GUARD_MARKER).unwrap();
        assert!(guard_at > body_at);
        assert!(out.contains("<p>x</p>"));
        assert!(out.contains("webdriver"));
    }

    #[test]
    fn guard_prepended_for_script() {
        let out = inject_guard("var a = 1;", ContentKind::Script);
        assert!(out.starts_with("/* data-ferry-guard */"));
        assert!(out.ends_with("var a = 1;"));
    }

    #[test]
    fn guard_not_applied_to_css_or_twice() {
        assert_eq!(inject_guard("a{}", ContentKind::Style), "a{}");
        let once = inject_guard(&page(""), ContentKind::Markup);
        assert_eq!(inject_guard(&once, ContentKind::Markup), once);
    }

    #[test]
    fn guard_survives_neutralization() {
        let out = neutralize_frame_busting(GUARD_SCRIPT);
        assert_eq!(out, GUARD_SCRIPT);
    }

    // ==================== Neutralization Tests ====================

    #[test]
    fn neutralizes_top_self_checks() {
        let js = "if (top !== self) { x(); } if(window.top!=window.self){y()} if (self != top) z();";
        let out = neutralize_frame_busting(js);
        assert_eq!(out.matches("if (false)").count(), 3);
    }

    #[test]
    fn neutralizes_top_location_assignment() {
        let js = "top.location = self.location; window.top.location.href='/x';";
        let out = neutralize_frame_busting(js);
        assert!(!out.contains("top.location"));
        assert!(out.contains("self.__ferryTopNav = self.location;"));
        assert!(out.contains("self.__ferryTopNav ='/x';"));
    }

    #[test]
    fn location_of_other_objects_untouched() {
        let js = "var desktop = {}; desktop.location = \"x\"; \
                  a.top.location = 1; $top.location = 2;";
        assert_eq!(neutralize_frame_busting(js), js);

        let out = neutralize_frame_busting("(top.location='/y');x=top.location.href= '/z'");
        assert_eq!(out, "(self.__ferryTopNav ='/y');x=self.__ferryTopNav = '/z'");
    }

    #[test]
    fn comparison_is_not_assignment() {
        let js = "if (top.location == self.location) {}";
        assert_eq!(neutralize_frame_busting(js), js);
    }

    // ==================== Reply Handling Tests ====================

    #[test]
    fn split_at_chars_respects_boundaries() {
        assert_eq!(split_at_chars("héllo", 2), ("hé", "llo"));
        assert_eq!(split_at_chars("abc", 10), ("abc", ""));
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```html\n<p>a</p>\n```"), "<p>a</p>");
        assert_eq!(strip_code_fences("<p>a</p>"), "<p>a</p>");
    }

    #[test]
    fn accept_reply_rules() {
        let long = "x".repeat(60);
        assert_eq!(accept_reply("NO_CHANGE", "", 50), None);
        assert_eq!(accept_reply("```\nNO_CHANGE\n```", "", 50), None);
        assert_eq!(accept_reply("short", "", 50), None);
        assert_eq!(accept_reply(&long, "TAIL", 50), Some(format!("{}TAIL", long)));
    }

    // ==================== Pipeline Tests ====================

    #[tokio::test]
    async fn generation_replaces_window_and_keeps_tail() {
        let config = RelayConfig {
            rewrite_window_chars: 100,
            ..RelayConfig::default()
        };
        let original = format!("<html>{}</html>", "a".repeat(200));
        let replacement = format!("```html\n{}\n```", "b".repeat(80));
        let generator = FixedGenerator(replacement);
        let pipeline = RewritePipeline::new(&generator, &config);

        let out = pipeline.generate(original.clone(), ContentKind::Markup).await;
        let (_, tail) = split_at_chars(&original, 100);
        assert_eq!(out, format!("{}{}", "b".repeat(80), tail));
    }

    #[tokio::test]
    async fn generation_skipped_for_small_large_or_css() {
        let config = RelayConfig::default();
        let generator = FixedGenerator("y".repeat(100));
        let pipeline = RewritePipeline::new(&generator, &config);

        let tiny = "<p>hi</p>".to_string();
        assert_eq!(pipeline.generate(tiny.clone(), ContentKind::Markup).await, tiny);

        let huge = "z".repeat(100_001);
        assert_eq!(pipeline.generate(huge.clone(), ContentKind::Script).await, huge);

        let css = "q".repeat(500);
        assert_eq!(pipeline.generate(css.clone(), ContentKind::Style).await, css);
    }

    #[tokio::test]
    async fn generation_timeout_keeps_original() {
        let config = RelayConfig::default().with_rewrite_timeout(Duration::from_millis(50));
        let pipeline = RewritePipeline::new(&SlowGenerator, &config);
        let original = page(&"p".repeat(200));
        assert_eq!(pipeline.generate(original.clone(), ContentKind::Markup).await, original);
    }

    #[tokio::test]
    async fn generation_error_keeps_original() {
        let config = RelayConfig::default();
        let pipeline = RewritePipeline::new(&FailingGenerator, &config);
        let original = page(&"p".repeat(200));
        assert_eq!(pipeline.generate(original.clone(), ContentKind::Markup).await, original);
    }

    #[tokio::test]
    async fn generation_disabled_by_config() {
        let config = RelayConfig::default().with_ai_rewrite(false);
        let generator = FixedGenerator("y".repeat(100));
        let pipeline = RewritePipeline::new(&generator, &config);
        let original = page(&"p".repeat(200));
        assert_eq!(pipeline.generate(original.clone(), ContentKind::Markup).await, original);
    }

    #[tokio::test]
    async fn full_pipeline_on_markup() {
        let config = RelayConfig::default();
        let pipeline = RewritePipeline::new(&NoopGenerator, &config);
        let html = r#"<html><head><meta http-equiv="X-Frame-Options" content="SAMEORIGIN"></head><body><script>if (top !== self) top.location = location;</script></body></html>"#;

        let out = pipeline
            .rewrite(html, ContentKind::Markup, "https://example.com")
            .await;
        assert!(!out.contains("X-Frame-Options"));
        assert!(out.contains(r#"<base href="https://example.com/">"#));
        assert!(out.contains(GUARD_MARKER));
        assert!(out.contains("if (false)"));
        assert!(!out.contains("top.location"));
    }

    #[tokio::test]
    async fn full_pipeline_on_json_only_strips() {
        let config = RelayConfig::default();
        let pipeline = RewritePipeline::new(&NoopGenerator, &config);
        let json = r#"{"a": 1}"#;
        let out = pipeline
            .rewrite(json, ContentKind::Structured, "https://example.com")
            .await;
        assert_eq!(out, json);
    }
}
