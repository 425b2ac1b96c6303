//! Ferry Core - routing and classification logic for the content relay.
//!
//! This crate holds the pure, I/O-free parts of the relay:
//!
//! - [`identity`] - static request identities (user agent + client hints)
//! - [`domains`] - per-domain routing: placeholders, mirror hosts, identity selection
//! - [`block`] - block-page detection for text bodies

pub mod block;
pub mod domains;
pub mod identity;

pub use block::{BlockDetector, PhraseBlockDetector, DEFAULT_BLOCK_PHRASES};
pub use domains::{bundled_rules, DomainClassifier, DomainRule, Route, RuleKind, PLACEHOLDER_URL};
pub use identity::{
    crawler_identities, default_identities, ClientHints, IdentityProfile, DEFAULT_IDENTITIES,
    SEARCH_CRAWLER,
};
