//! Single-identity fetch attempts.
//!
//! One attempt is one bounded outbound request with one identity, classified
//! into an [`AttemptOutcome`]:
//!
//! ```text
//! send ──timeout/network──▶ TransportError
//!   │
//!   ├─ 403 / 406 / 429 ───▶ HardBlock
//!   │
//!   ├─ binary body ───────▶ Success
//!   │
//!   └─ text body ─ block phrase? ─ yes ─▶ SoftBlock
//!                                └ no ──▶ Success
//! ```

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, SET_COOKIE};
use reqwest::{Client, Method};
use serde::Serialize;
use tracing::debug;

use ferry_core::{BlockDetector, IdentityProfile};

use crate::content::{declared_content_type, Body, ContentKind};
use crate::error::{FetchError, Result};
use crate::target::FetchTarget;

/// Statuses servers use to turn away automated clients.
pub const HARD_BLOCK_STATUSES: [u16; 3] = [403, 406, 429];

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Classification of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Usable response.
    Success,
    /// Response body matched a block phrase.
    SoftBlock,
    /// Response status rejected the client.
    HardBlock,
    /// Timeout or network failure.
    TransportError,
}

/// The record of one identity attempt.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// Name of the identity used.
    pub identity: &'static str,
    /// Outcome classification.
    pub outcome: AttemptOutcome,
    /// HTTP status, if a response arrived.
    pub status: Option<u16>,
    /// Declared content type.
    pub content_type: String,
    /// Response body. Absent for transport errors and hard blocks.
    pub body: Option<Body>,
    /// `Set-Cookie` values seen on the response.
    pub set_cookies: Vec<String>,
}

impl AttemptResult {
    fn failed(identity: &'static str) -> Self {
        Self {
            identity,
            outcome: AttemptOutcome::TransportError,
            status: None,
            content_type: String::new(),
            body: None,
            set_cookies: Vec::new(),
        }
    }

    /// Returns true if the attempt produced a binary body.
    pub fn is_binary(&self) -> bool {
        matches!(self.body, Some(Body::Bytes(_)))
    }
}

/// A fully read upstream response.
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub status: u16,
    pub content_type: String,
    pub set_cookies: Vec<String>,
    /// `None` when the status was a hard block and the body was not read.
    pub body: Option<Body>,
}

/// An outbound request description shared by attempts and mirrors.
pub(crate) struct Outbound<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl<'a> Outbound<'a> {
    /// A GET with an identity's headers plus navigation headers.
    pub fn navigate(url: &'a str, identity: &IdentityProfile, referer: Option<&str>) -> Self {
        let mut headers: Vec<(&'static str, String)> = identity
            .headers()
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        headers.push(("accept", ACCEPT.to_string()));
        headers.push(("accept-language", ACCEPT_LANGUAGE.to_string()));
        headers.push(("upgrade-insecure-requests", "1".to_string()));
        headers.push(("sec-fetch-dest", "document".to_string()));
        headers.push(("sec-fetch-mode", "navigate".to_string()));
        if let Some(referer) = referer {
            headers.push(("referer", referer.to_string()));
            headers.push(("sec-fetch-site", "same-origin".to_string()));
        } else {
            headers.push(("sec-fetch-site", "none".to_string()));
        }
        Self {
            method: Method::GET,
            url,
            headers,
            body: None,
        }
    }
}

/// Sends `outbound` and reads the whole response within `timeout`.
///
/// Hard-block responses are returned without reading the body.
pub(crate) async fn exchange(
    client: &Client,
    outbound: Outbound<'_>,
    timeout: Duration,
    max_body_bytes: usize,
) -> Result<Exchange> {
    match tokio::time::timeout(timeout, read_exchange(client, outbound, max_body_bytes)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

async fn read_exchange(
    client: &Client,
    outbound: Outbound<'_>,
    max_body_bytes: usize,
) -> Result<Exchange> {
    let mut request = client.request(outbound.method, outbound.url);
    for (name, value) in &outbound.headers {
        request = request.header(*name, value.as_str());
    }
    if let Some(body) = outbound.body {
        request = request.body(body);
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let content_type = declared_content_type(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );
    let set_cookies: Vec<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    if HARD_BLOCK_STATUSES.contains(&status) {
        return Ok(Exchange {
            status,
            content_type,
            set_cookies,
            body: None,
        });
    }

    if let Some(len) = response.content_length() {
        if len as usize > max_body_bytes {
            return Err(FetchError::BodyTooLarge(len as usize));
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() > max_body_bytes {
        return Err(FetchError::BodyTooLarge(bytes.len()));
    }

    let kind = ContentKind::from_content_type(&content_type);
    Ok(Exchange {
        status,
        content_type,
        set_cookies,
        body: Some(Body::decode(bytes.to_vec(), kind)),
    })
}

/// Classifies a response by status and body.
pub fn classify(status: u16, body: Option<&Body>, detector: &dyn BlockDetector) -> AttemptOutcome {
    if HARD_BLOCK_STATUSES.contains(&status) {
        return AttemptOutcome::HardBlock;
    }
    match body {
        Some(Body::Text(text)) if detector.is_blocked(text) => AttemptOutcome::SoftBlock,
        Some(_) => AttemptOutcome::Success,
        None => AttemptOutcome::TransportError,
    }
}

/// Performs identity attempts against a target.
pub struct AttemptExecutor<'a> {
    client: &'a Client,
    detector: &'a dyn BlockDetector,
    timeout: Duration,
    max_body_bytes: usize,
}

impl<'a> AttemptExecutor<'a> {
    /// Creates an executor.
    pub fn new(
        client: &'a Client,
        detector: &'a dyn BlockDetector,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            client,
            detector,
            timeout,
            max_body_bytes,
        }
    }

    fn outbound<'t>(&self, target: &'t FetchTarget, identity: &IdentityProfile) -> Outbound<'t> {
        let referer = format!("{}/", target.origin);
        let mut outbound = Outbound::navigate(&target.url, identity, Some(&referer));
        outbound.method = target.method.clone();

        if !target.is_get() {
            outbound.headers.push(("origin", target.origin.clone()));
        }
        if let Some(cookie) = &target.cookie {
            outbound.headers.push(("cookie", cookie.clone()));
        }
        if let Some(body) = &target.body {
            if let Some(ct) = &target.content_type {
                outbound.headers.push(("content-type", ct.clone()));
            }
            outbound.body = Some(body.clone());
        }
        outbound
    }

    /// Performs one attempt with `identity`.
    pub async fn attempt(
        &self,
        target: &FetchTarget,
        identity: &'static IdentityProfile,
    ) -> AttemptResult {
        let start = Instant::now();
        let outbound = self.outbound(target, identity);

        match exchange(self.client, outbound, self.timeout, self.max_body_bytes).await {
            Ok(ex) => {
                let outcome = classify(ex.status, ex.body.as_ref(), self.detector);
                debug!(
                    identity = identity.name,
                    status = ex.status,
                    ?outcome,
                    content_type = %ex.content_type,
                    cookies = ex.set_cookies.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Attempt finished"
                );
                AttemptResult {
                    identity: identity.name,
                    outcome,
                    status: Some(ex.status),
                    content_type: ex.content_type,
                    body: ex.body,
                    set_cookies: ex.set_cookies,
                }
            }
            Err(e) => {
                debug!(
                    identity = identity.name,
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Attempt failed"
                );
                AttemptResult::failed(identity.name)
            }
        }
    }

    /// Tries `identities` strictly in order, stopping at the first success.
    ///
    /// Returns every attempt made; a success, if any, is the last entry.
    pub async fn run(
        &self,
        target: &FetchTarget,
        identities: &[&'static IdentityProfile],
    ) -> Vec<AttemptResult> {
        let mut history = Vec::with_capacity(identities.len());
        for identity in identities {
            let result = self.attempt(target, identity).await;
            let done = result.outcome == AttemptOutcome::Success;
            history.push(result);
            if done {
                break;
            }
        }
        history
    }
}
