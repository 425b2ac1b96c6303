//! Fallback sources for targets that refused every identity.
//!
//! The chain is an ordered list of [`Mirror`]s tried one at a time, followed
//! by the last-resort candidate from the identity attempts:
//!
//! | Stage | Accepts | Reported status |
//! |---|---|---|
//! | direct attempts | first `Success` that is binary or below 500 | upstream status |
//! | cache mirror | 2xx that is not the mirror's "not found" page | 200 |
//! | archive mirror | nearest snapshot, toolbar removed | 200 |
//! | last resort | latest soft-blocked or 5xx text body | upstream status |
//! | none | - | terminal failure |

use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use ferry_core::identity::{CHROME_DESKTOP, SEARCH_CRAWLER};

use crate::attempt::{exchange, AttemptOutcome, AttemptResult, Exchange, Outbound};
use crate::config::RelayConfig;
use crate::content::Body;
use crate::target::FetchTarget;

/// Phrases that mark the cache mirror's own "not found" page.
pub const CACHE_NOT_FOUND_PHRASES: &[&str] = &[
    "did not match any documents",
    "was not found on this server",
    "Error 404 (Not Found)",
];

static WAYBACK_TOOLBAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<!--\s*BEGIN WAYBACK TOOLBAR INSERT\s*-->.*?<!--\s*END WAYBACK TOOLBAR INSERT\s*-->",
    )
    .expect("valid regex")
});

static WAYBACK_SCRIPT_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<script\b[^>]*\bsrc\s*=\s*["']?[^"'>]*(?:archive\.org|/_static/)[^>]*>\s*</script>"#,
    )
    .expect("valid regex")
});

static WAYBACK_SCRIPT_INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>[^<]*__wm\.[^<]*</script>").expect("valid regex")
});

/// Where the final content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// An identity attempt against the target itself.
    Direct,
    /// The search-engine cache mirror.
    CacheMirror,
    /// The web-archive mirror.
    ArchiveMirror,
    /// A blocked or failing direct response kept as a last resort.
    LastResort,
    /// The relay's own placeholder page.
    Placeholder,
}

/// A response chosen to answer the request.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Status to report.
    pub status: u16,
    /// Declared content type.
    pub content_type: String,
    /// Response body.
    pub body: Body,
    /// Where the response came from.
    pub source: Source,
}

/// Shared handles for mirror lookups.
pub struct MirrorContext<'a> {
    /// HTTP client for this request.
    pub client: &'a Client,
    /// Relay configuration.
    pub config: &'a RelayConfig,
}

/// A secondary source for the same logical resource.
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Fetches `target` through the mirror, or `None` if it has nothing usable.
    async fn fetch(&self, ctx: &MirrorContext<'_>, target: &FetchTarget) -> Option<Fetched>;
}

fn into_fetched(ex: Exchange, source: Source) -> Option<Fetched> {
    if !(200..300).contains(&ex.status) {
        return None;
    }
    Some(Fetched {
        status: 200,
        content_type: ex.content_type,
        body: ex.body?,
        source,
    })
}

/// Search-engine cached-page mirror.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheMirror;

impl CacheMirror {
    /// Returns true if `body` is the mirror's own "not found" page.
    pub fn is_not_found(body: &Body) -> bool {
        body.as_text().is_some_and(|text| {
            CACHE_NOT_FOUND_PHRASES
                .iter()
                .any(|phrase| text.contains(phrase))
        })
    }

    fn lookup_url(endpoint: &str, target: &str) -> Option<String> {
        Url::parse_with_params(endpoint, &[("q", format!("cache:{}", target))])
            .ok()
            .map(String::from)
    }
}

#[async_trait]
impl Mirror for CacheMirror {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self, ctx: &MirrorContext<'_>, target: &FetchTarget) -> Option<Fetched> {
        let url = Self::lookup_url(&ctx.config.cache_endpoint, &target.url)?;
        let outbound = Outbound::navigate(&url, &SEARCH_CRAWLER, None);
        let ex = exchange(
            ctx.client,
            outbound,
            ctx.config.attempt_timeout,
            ctx.config.max_body_bytes,
        )
        .await
        .map_err(|e| debug!(error = %e, "Cache mirror request failed"))
        .ok()?;

        if ex.body.as_ref().is_some_and(Self::is_not_found) {
            debug!("Cache mirror has no copy");
            return None;
        }
        into_fetched(ex, Source::CacheMirror)
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<Snapshot>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    available: bool,
    url: String,
}

/// Web-archive nearest-snapshot mirror.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveMirror;

impl ArchiveMirror {
    /// Removes the archive's injected toolbar and scripts.
    pub fn strip_toolbar(content: &str) -> String {
        let out = WAYBACK_TOOLBAR.replace_all(content, "");
        let out = WAYBACK_SCRIPT_SRC.replace_all(&out, "");
        WAYBACK_SCRIPT_INLINE.replace_all(&out, "").into_owned()
    }

    async fn closest_snapshot(ctx: &MirrorContext<'_>, target: &FetchTarget) -> Option<String> {
        let url = Url::parse_with_params(
            &ctx.config.archive_lookup_endpoint,
            &[("url", target.url.as_str())],
        )
        .ok()?;

        let lookup = async {
            let response = ctx.client.get(url).send().await.ok()?;
            if !response.status().is_success() {
                return None;
            }
            response.json::<AvailabilityResponse>().await.ok()
        };

        let parsed = match tokio::time::timeout(ctx.config.archive_lookup_timeout, lookup).await {
            Ok(parsed) => parsed?,
            Err(_) => {
                debug!("Archive lookup timed out");
                return None;
            }
        };

        parsed
            .archived_snapshots
            .closest
            .filter(|s| s.available && !s.url.is_empty())
            .map(|s| s.url)
    }
}

#[async_trait]
impl Mirror for ArchiveMirror {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn fetch(&self, ctx: &MirrorContext<'_>, target: &FetchTarget) -> Option<Fetched> {
        let snapshot = Self::closest_snapshot(ctx, target).await?;
        debug!(snapshot = %snapshot, "Archive snapshot found");

        let outbound = Outbound::navigate(&snapshot, &CHROME_DESKTOP, None);
        let ex = exchange(
            ctx.client,
            outbound,
            ctx.config.attempt_timeout,
            ctx.config.max_body_bytes,
        )
        .await
        .map_err(|e| debug!(error = %e, "Archive snapshot request failed"))
        .ok()?;

        let mut fetched = into_fetched(ex, Source::ArchiveMirror)?;
        if let Body::Text(text) = &fetched.body {
            fetched.body = Body::Text(Self::strip_toolbar(text));
        }
        Some(fetched)
    }
}

/// Returns the accepted direct response, if the attempts produced one.
///
/// A text success with a 5xx status does not count; binary bodies always do.
pub fn accepted_direct(history: &[AttemptResult]) -> Option<&AttemptResult> {
    history.iter().rev().find(|a| {
        a.outcome == AttemptOutcome::Success
            && (a.is_binary() || a.status.is_some_and(|s| s < 500))
    })
}

/// Returns the body to fall back on when every mirror failed.
///
/// Only soft-blocked and server-error text responses qualify; hard blocks
/// never carry a body.
pub fn last_resort(history: &[AttemptResult]) -> Option<&AttemptResult> {
    history.iter().rev().find(|a| {
        matches!(a.outcome, AttemptOutcome::Success | AttemptOutcome::SoftBlock) && a.body.is_some()
    })
}

fn to_fetched(attempt: &AttemptResult, source: Source) -> Option<Fetched> {
    Some(Fetched {
        status: attempt.status?,
        content_type: attempt.content_type.clone(),
        body: attempt.body.clone()?,
        source,
    })
}

/// The ordered fallback policy.
pub struct FallbackChain {
    mirrors: Vec<Box<dyn Mirror>>,
}

impl Default for FallbackChain {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl FallbackChain {
    /// Creates a chain over the given mirrors, tried in order.
    pub fn new(mirrors: Vec<Box<dyn Mirror>>) -> Self {
        Self { mirrors }
    }

    /// Cache mirror, then archive mirror.
    pub fn with_defaults() -> Self {
        Self::new(vec![Box::new(CacheMirror), Box::new(ArchiveMirror)])
    }

    /// Picks the response for a request given its attempt history.
    ///
    /// Mirrors are only consulted when no direct response was accepted.
    pub async fn resolve(
        &self,
        ctx: &MirrorContext<'_>,
        target: &FetchTarget,
        history: &[AttemptResult],
    ) -> Option<Fetched> {
        if let Some(direct) = accepted_direct(history) {
            return to_fetched(direct, Source::Direct);
        }

        for mirror in &self.mirrors {
            let start = Instant::now();
            let found = mirror.fetch(ctx, target).await;
            debug!(
                mirror = mirror.name(),
                found = found.is_some(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Mirror tried"
            );
            if found.is_some() {
                return found;
            }
        }

        last_resort(history).and_then(|a| to_fetched(a, Source::LastResort))
    }
}
