//! Engine configuration.

use std::time::Duration;

/// Tunables for the protocol engine.
///
/// The defaults are safe for a public-facing deployment; loosen them for
/// trusted transports like stdio.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Require a valid session for everything except `initialize`/`ping`.
    pub strict_sessions: bool,
    /// Cap on concurrently live sessions.
    pub max_sessions: usize,
    /// Idle time after which a session may be swept.
    pub session_max_idle: Duration,
    /// Token bucket capacity per session.
    pub rate_burst: u32,
    /// Token bucket refill rate, tokens per second.
    pub rate_per_second: f64,
    /// Idle time after which an orphaned rate bucket is dropped.
    pub rate_bucket_max_idle: Duration,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Most keys allowed in a tool-call `arguments` object.
    pub max_argument_keys: usize,
    /// Page size for all listings.
    pub page_size: usize,
    /// How long a server-initiated request waits for the client's answer.
    pub bridge_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_sessions: true,
            max_sessions: 4096,
            session_max_idle: Duration::from_secs(3600),
            rate_burst: 32,
            rate_per_second: 8.0,
            rate_bucket_max_idle: Duration::from_secs(600),
            max_body_bytes: 2 * 1024 * 1024,
            max_argument_keys: 128,
            page_size: 50,
            bridge_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Defaults suitable for a trusted single-client transport: no session
    /// enforcement, no rate limiting to speak of.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            strict_sessions: false,
            rate_burst: u32::MAX,
            ..Self::default()
        }
    }

    /// Set strict session enforcement.
    #[must_use]
    pub const fn strict_sessions(mut self, strict: bool) -> Self {
        self.strict_sessions = strict;
        self
    }

    /// Set the rate limit parameters.
    #[must_use]
    pub fn rate_limit(mut self, burst: u32, per_second: f64) -> Self {
        self.rate_burst = burst;
        self.rate_per_second = per_second;
        self
    }

    /// Set the listing page size.
    #[must_use]
    pub const fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the bridge timeout.
    #[must_use]
    pub const fn bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }

    /// Set the body and argument ceilings.
    #[must_use]
    pub const fn size_limits(mut self, max_body_bytes: usize, max_argument_keys: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self.max_argument_keys = max_argument_keys;
        self
    }
}
