//! Relay configuration.

use std::time::Duration;

/// Default per-identity attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for the archive snapshot lookup.
pub const DEFAULT_ARCHIVE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for the generative rewrite race.
pub const DEFAULT_REWRITE_TIMEOUT: Duration = Duration::from_millis(3500);

/// Default search-engine cache endpoint.
pub const DEFAULT_CACHE_ENDPOINT: &str = "https://webcache.googleusercontent.com/search";

/// Default web-archive nearest-snapshot lookup endpoint.
pub const DEFAULT_ARCHIVE_LOOKUP_ENDPOINT: &str = "https://archive.org/wayback/available";

/// Tunables for a [`Relay`](crate::Relay).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Hard timeout for one identity attempt, including the body read.
    pub attempt_timeout: Duration,
    /// Timeout for the archive snapshot lookup.
    pub archive_lookup_timeout: Duration,
    /// Deadline for the generative rewrite.
    pub rewrite_timeout: Duration,
    /// Whether the generative rewrite step runs at all.
    pub ai_rewrite: bool,
    /// Smallest document (in chars) sent for generative rewrite.
    pub rewrite_min_chars: usize,
    /// Largest document (in chars) sent for generative rewrite.
    pub rewrite_max_chars: usize,
    /// Number of leading chars included in the rewrite prompt.
    pub rewrite_window_chars: usize,
    /// Replies shorter than this are discarded.
    pub min_reply_chars: usize,
    /// Responses larger than this are treated as transport failures.
    pub max_body_bytes: usize,
    /// Search-engine cache endpoint (`?q=cache:<url>` is appended).
    pub cache_endpoint: String,
    /// Web-archive lookup endpoint (`?url=<url>` is appended).
    pub archive_lookup_endpoint: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            archive_lookup_timeout: DEFAULT_ARCHIVE_LOOKUP_TIMEOUT,
            rewrite_timeout: DEFAULT_REWRITE_TIMEOUT,
            ai_rewrite: true,
            rewrite_min_chars: 50,
            rewrite_max_chars: 100_000,
            rewrite_window_chars: 15_000,
            min_reply_chars: 50,
            max_body_bytes: 25 * 1024 * 1024,
            cache_endpoint: DEFAULT_CACHE_ENDPOINT.to_string(),
            archive_lookup_endpoint: DEFAULT_ARCHIVE_LOOKUP_ENDPOINT.to_string(),
        }
    }
}

impl RelayConfig {
    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the archive lookup timeout.
    pub fn with_archive_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.archive_lookup_timeout = timeout;
        self
    }

    /// Sets the rewrite race deadline.
    pub fn with_rewrite_timeout(mut self, timeout: Duration) -> Self {
        self.rewrite_timeout = timeout;
        self
    }

    /// Enables or disables the generative rewrite step.
    pub fn with_ai_rewrite(mut self, enabled: bool) -> Self {
        self.ai_rewrite = enabled;
        self
    }

    /// Sets the cache mirror endpoint.
    pub fn with_cache_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.cache_endpoint = endpoint.into();
        self
    }

    /// Sets the archive lookup endpoint.
    pub fn with_archive_lookup_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.archive_lookup_endpoint = endpoint.into();
        self
    }

    /// Sets the body size cap.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}
