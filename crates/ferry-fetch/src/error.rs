//! Error types for fetching and rewriting.

use thiserror::Error;

/// Errors raised while fetching from an upstream.
///
/// The relay absorbs these into attempt outcomes; only request validation
/// errors and [`FetchError::Client`] ever reach the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection or protocol failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body exceeded the configured cap.
    #[error("response body too large: {0} bytes")]
    BodyTooLarge(usize),

    /// The inbound request named an invalid HTTP method.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// The HTTP client could not be constructed.
    #[error("client error: {0}")]
    Client(String),
}

/// Errors raised by a [`TextGenerator`](crate::generate::TextGenerator).
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The service could not be reached.
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered without usable text.
    #[error("empty generation response")]
    Empty,

    /// The service rejected the request.
    #[error("generation service returned status {0}")]
    Status(u16),

    /// The generator is misconfigured.
    #[error("invalid generator configuration: {0}")]
    Config(String),
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
