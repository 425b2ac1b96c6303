//! Ferry Fetch - resilient retrieval for the content relay.
//!
//! This crate performs the network side of a relay request: identity
//! attempts, mirror fallback, and rewriting text for display inside a frame.
//!
//! ## Pipeline
//!
//! ```text
//! FetchTarget → Route → Identity attempts ──success──▶ Content kind?
//!                             │                           │
//!                        all failed                ┌──────┴──────┐
//!                             ▼                    │ Binary      │ Text
//!                 Cache mirror → Archive mirror    ▼             ▼
//!                             │               Data URI     Rewrite pipeline
//!                             ▼
//!                 Last resort → Unreachable
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use ferry_fetch::{FetchTarget, Relay, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let relay = Relay::new(RelayConfig::default());
//!     let result = relay.relay(FetchTarget::get("example.com")).await.unwrap();
//!     println!("media: {}", result.is_media());
//! }
//! ```

pub mod attempt;
pub mod config;
pub mod content;
mod error;
pub mod fallback;
pub mod generate;
mod relay;
pub mod result;
pub mod rewrite;
pub mod target;

pub use attempt::{classify, AttemptExecutor, AttemptOutcome, AttemptResult, HARD_BLOCK_STATUSES};
pub use config::RelayConfig;
pub use content::{Body, ContentKind};
pub use error::{FetchError, GenerateError, Result};
pub use fallback::{ArchiveMirror, CacheMirror, FallbackChain, Mirror, MirrorContext, Source};
pub use generate::{GeminiGenerator, NoopGenerator, TextGenerator, DEFAULT_GEMINI_MODEL};
pub use relay::Relay;
pub use result::{ProxyResult, UNREACHABLE_MESSAGE};
pub use rewrite::RewritePipeline;
pub use target::{FetchTarget, PROXY_COOKIE_HEADER};
