//! Generative text collaborator.
//!
//! The rewrite pipeline asks an external text model to strip frame-busting
//! logic from documents. The service is optional: [`NoopGenerator`] stands in
//! when no API key is configured, and any failure is absorbed by the caller.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::GenerateError;

/// Reply meaning "the document needs no changes".
pub const NO_CHANGE_SENTINEL: &str = "NO_CHANGE";

/// Default Generative Language API base URL.
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model name.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// A plain-text completion service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the model's reply to `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Generator that never changes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGenerator;

#[async_trait]
impl TextGenerator for NoopGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
        Ok(NO_CHANGE_SENTINEL.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiGenerator {
    /// Creates a generator for `model` using `api_key`.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
        }
    }

    /// Overrides the API base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn url(&self) -> Result<Url, GenerateError> {
        let base = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        Url::parse_with_params(&base, &[("key", self.api_key.as_str())])
            .map_err(|e| GenerateError::Config(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let response = self
            .client
            .post(self.url()?)
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerateError::Status(response.status().as_u16()));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            Err(GenerateError::Empty)
        } else {
            Ok(text)
        }
    }
}
