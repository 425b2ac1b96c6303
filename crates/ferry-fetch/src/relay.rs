//! Request orchestration.
//!
//! One call to [`Relay::relay`] runs the whole pipeline for one inbound
//! request, strictly in order:
//!
//! 1. Route the target (placeholder, mirror host, identity list).
//! 2. Try each identity until one succeeds.
//! 3. Consult the fallback chain when no direct response is acceptable.
//! 4. Pass binary bodies through; rewrite text bodies for framing.
//!
//! Nothing is shared between calls except immutable configuration.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tracing::{debug, info, warn};

use ferry_core::{BlockDetector, DomainClassifier, PhraseBlockDetector};

use crate::attempt::AttemptExecutor;
use crate::config::RelayConfig;
use crate::content::{Body, ContentKind};
use crate::error::{FetchError, Result};
use crate::fallback::{FallbackChain, MirrorContext};
use crate::generate::{NoopGenerator, TextGenerator};
use crate::result::ProxyResult;
use crate::rewrite::RewritePipeline;
use crate::target::FetchTarget;

/// The content relay.
pub struct Relay {
    config: RelayConfig,
    domains: DomainClassifier,
    detector: Arc<dyn BlockDetector>,
    generator: Arc<dyn TextGenerator>,
    fallback: FallbackChain,
}

impl Relay {
    /// Creates a relay with bundled routing rules, the default block phrases,
    /// both mirrors and no generative rewrite service.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            domains: DomainClassifier::with_defaults(),
            detector: Arc::new(PhraseBlockDetector::with_defaults()),
            generator: Arc::new(NoopGenerator),
            fallback: FallbackChain::with_defaults(),
        }
    }

    /// Replaces the domain routing rules.
    pub fn with_domains(mut self, domains: DomainClassifier) -> Self {
        self.domains = domains;
        self
    }

    /// Replaces the block-page detector.
    pub fn with_detector(mut self, detector: Arc<dyn BlockDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Sets the generative rewrite service.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Replaces the fallback chain.
    pub fn with_fallback(mut self, fallback: FallbackChain) -> Self {
        self.fallback = fallback;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn client(&self) -> Result<Client> {
        Client::builder()
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))
    }

    /// Fetches `target` and prepares it for display.
    ///
    /// Upstream failures never surface as errors; they end in
    /// [`ProxyResult::Unreachable`]. An error means the relay itself could
    /// not run.
    pub async fn relay(&self, mut target: FetchTarget) -> Result<ProxyResult> {
        let start = Instant::now();
        let route = self.domains.resolve(&target.url);
        if route.placeholder {
            debug!("Serving placeholder page");
            return Ok(ProxyResult::placeholder());
        }
        if route.url != target.url {
            target.retarget(&route.url);
        }

        let client = self.client()?;
        let executor = AttemptExecutor::new(
            &client,
            self.detector.as_ref(),
            self.config.attempt_timeout,
            self.config.max_body_bytes,
        );
        let history = executor.run(&target, &route.identities).await;
        let set_cookies: Vec<String> = history
            .iter()
            .flat_map(|a| a.set_cookies.iter().cloned())
            .collect();

        let ctx = MirrorContext {
            client: &client,
            config: &self.config,
        };
        let Some(fetched) = self.fallback.resolve(&ctx, &target, &history).await else {
            warn!(
                method = %target.method,
                attempts = history.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "All sources exhausted"
            );
            return Ok(ProxyResult::unreachable());
        };

        let result = match fetched.body {
            Body::Bytes(bytes) => ProxyResult::media(&bytes, &fetched.content_type),
            Body::Text(text) => {
                let kind = ContentKind::from_content_type(&fetched.content_type);
                let content = RewritePipeline::new(self.generator.as_ref(), &self.config)
                    .rewrite(&text, kind, &target.origin)
                    .await;
                ProxyResult::Text {
                    content,
                    content_type: fetched.content_type,
                    status: fetched.status,
                    set_cookies,
                    source: fetched.source,
                }
            }
        };

        info!(
            method = %target.method,
            source = ?fetched.source,
            status = fetched.status,
            media = result.is_media(),
            attempts = history.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Relay request completed"
        );
        Ok(result)
    }
}
