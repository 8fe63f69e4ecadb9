//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Circuit breaker constants
pub mod circuit_breaker {
    /// Consecutive failures before the circuit opens
    pub const FAILURE_THRESHOLD: u32 = 3;

    /// Cool-down after ordinary authentication erosion (seconds, 15 minutes)
    pub const NORMAL_COOLDOWN_SECS: u64 = 900;

    /// Cool-down after a hard rate limit (seconds, 1 hour)
    pub const CRITICAL_COOLDOWN_SECS: u64 = 3600;

    /// Upper bound of the random jitter added to every cool-down (seconds)
    pub const JITTER_SECS: u64 = 300;

    /// Longest a single probe holds the gate (seconds, the default upstream timeout)
    pub const PROBE_LEASE_SECS: u64 = 300;
}

/// Credential supplier constants
pub mod credentials {
    /// Default durable cache location
    pub const CACHE_FILE: &str = "cookie_cache.json";

    /// Cache/harvester JSON key for the primary credential
    pub const PRIMARY_KEY: &str = "SECURE_1PSID";

    /// Cache/harvester JSON key for the secondary credential
    pub const SECONDARY_KEY: &str = "SECURE_1PSIDTS";

    /// Cookie names as browsers store them (accepted from harvesters)
    pub const PRIMARY_COOKIE: &str = "__Secure-1PSID";
    pub const SECONDARY_COOKIE: &str = "__Secure-1PSIDTS";

    /// Environment override for the primary credential
    pub const PRIMARY_ENV: &str = "SECURE_1PSID";

    /// Environment override for the secondary credential
    pub const SECONDARY_ENV: &str = "SECURE_1PSIDTS";

    /// Characters of a secret shown in logs
    pub const PREVIEW_CHARS: usize = 10;

    /// Maximum time an external harvester may run (seconds)
    pub const HARVEST_TIMEOUT_SECS: u64 = 60;
}

/// Context reconciliation constants
pub mod context {
    /// Prior turns replayed into a synthetic preamble
    pub const MAX_HISTORY_TURNS: usize = 10;

    pub const PREAMBLE_HEADER: &str = "Here is the conversation history so far for context:\n\n";

    pub const CONTINUE_INSTRUCTION: &str =
        "\n[System]: Please continue the conversation based on the history above.\n";
}

/// Storage constants
pub mod storage {
    pub const CONVERSATIONS_DIR: &str = "conversations";

    pub const IMAGES_DIR: &str = "stored_images";

    /// Public route prefix for stored media
    pub const IMAGES_ROUTE: &str = "images";
}

/// Service registry constants
pub mod registry {
    pub const SERVICE_NAME: &str = "gemini-service";

    pub const NAMESPACE: &str = "public";

    pub const GROUP: &str = "DEFAULT_GROUP";

    /// Heartbeat period recommended by the registry (seconds)
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;

    /// Bounded wait for the heartbeat task at shutdown (seconds)
    pub const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

    /// Registration retries after the first attempt before running unregistered
    pub const REGISTER_MAX_RETRIES: usize = 3;
}

/// Network constants
pub mod network {
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    pub const DEFAULT_PORT: u16 = 8000;

    /// Default upstream bridge endpoint
    pub const BRIDGE_URL: &str = "http://127.0.0.1:8900";

    /// Default upstream request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Timeout for registry calls (seconds)
    pub const REGISTRY_TIMEOUT_SECS: u64 = 5;
}
