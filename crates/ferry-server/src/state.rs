//! Application state for the relay server.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use ferry_fetch::{Relay, RelayConfig};

/// Shared application state.
///
/// Holds only immutable handles; requests share no mutable state.
#[derive(Clone)]
pub struct AppState {
    /// The relay pipeline.
    pub relay: Arc<Relay>,
    /// When the server started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates application state around `relay`.
    pub fn new(relay: Relay) -> Self {
        Self {
            relay: Arc::new(relay),
            started_at: Utc::now(),
        }
    }

    /// Creates application state with a default relay.
    pub fn with_config(config: RelayConfig) -> Self {
        Self::new(Relay::new(config))
    }
}
