//! Unified Error Type System
//!
//! Centralized error types for the relay.
//! Upstream failures carry a typed kind that drives the refresh/cool-down policy.
//!
//! ## Upstream Error Kinds
//!
//! - **HardLimit**: upstream rate limiting (escalate breaker, never resend)
//! - **Auth**: expired credentials or a reset transport (refresh and resend once)
//! - **Other**: anything else (pass through, breaker untouched)
//!
//! ## Relay Error Taxonomy
//!
//! | Variant | Status | Breaker |
//! |---------|--------|---------|
//! | `AdmissionRejected` | 503 | unchanged |
//! | `InitializationFailed` | 500 | NORMAL failure |
//! | `HardLimited` | 429 | CRITICAL failure |
//! | `AuthExhausted` | 401 | NORMAL failure |
//! | `Upstream` | 500 | unchanged |

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Upstream Error Kinds
// =============================================================================

/// Classification of an upstream failure for routing decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Hard rate limit - cool down for the long period, no resend
    HardLimit,
    /// Authentication erosion or transport reset - refresh credentials and resend
    Auth,
    /// Unrelated failure - surface verbatim
    Other,
}

impl std::fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HardLimit => write!(f, "HARD_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

// =============================================================================
// Upstream Error
// =============================================================================

/// Error reported by an upstream collaborator
#[derive(Debug, Clone)]
pub struct UpstreamError {
    /// Routing category
    pub kind: UpstreamErrorKind,
    /// Upstream message, kept verbatim
    pub message: String,
    /// HTTP status, when the collaborator speaks HTTP
    pub status: Option<u16>,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UpstreamError {}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn hard_limit(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::HardLimit, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Auth, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Other, message)
    }

    /// Attach the HTTP status that produced this error
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Fallback classifier for collaborators that only surface free text.
///
/// Typed kinds from the collaborator are preferred; these phrase lists are
/// heuristics and may miss new upstream wordings.
pub struct ErrorClassifier;

const HARD_LIMIT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "too many requests",
    "quota exceeded",
];

const AUTH_MARKERS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "unauthenticated",
    "cookie",
    "invalid response",
    "failed to generate",
    "server disconnected",
    "remoteprotocolerror",
    "connection closed",
    "connection reset",
];

impl ErrorClassifier {
    /// Classify an error message
    pub fn classify(message: &str) -> UpstreamError {
        let lower = message.to_lowercase();

        if HARD_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
            return UpstreamError::hard_limit(message);
        }

        if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
            return UpstreamError::auth(message);
        }

        UpstreamError::other(message)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str) -> UpstreamError {
        let classified = match status {
            429 => UpstreamError::hard_limit(message),
            401 | 403 => UpstreamError::auth(message),
            _ => Self::classify(message),
        };
        classified.with_status(status)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // Resilience Errors
    // -------------------------------------------------------------------------
    /// Breaker is open and the cool-down has not elapsed
    #[error(
        "{reason} in effect. Requests are suspended; retry in about {retry_after_secs} seconds ({} minutes)",
        .retry_after_secs / 60
    )]
    AdmissionRejected { retry_after_secs: u64, reason: String },

    /// No credentials could be obtained, or the client refused them, at cold start
    #[error("Upstream client init failed: {0}")]
    InitializationFailed(String),

    /// Upstream signalled a hard rate limit
    #[error(
        "Upstream service rate limited (429). Entering cool-down for {retry_after_secs} seconds"
    )]
    HardLimited { retry_after_secs: u64 },

    /// Credential refresh or the resend after it failed
    #[error("Session expired and recovery failed. Failure count: {failure_count}")]
    AuthExhausted { failure_count: u32, message: String },

    /// Unclassified upstream failure, passed through verbatim
    #[error("{0}")]
    Upstream(UpstreamError),

    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        RelayError::Upstream(err)
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl RelayError {
    /// Create an admission rejection from a remaining cool-down
    pub fn admission_rejected(remaining: Duration, reason: impl Into<String>) -> Self {
        // Round up so a caller never retries a fraction of a second early
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Self::AdmissionRejected {
            retry_after_secs: secs.max(1),
            reason: reason.into(),
        }
    }

    /// HTTP-style status for the outward contract
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AdmissionRejected { .. } => 503,
            Self::HardLimited { .. } => 429,
            Self::AuthExhausted { .. } => 401,
            Self::NotFound(_) => 404,
            Self::BadRequest(_) => 400,
            Self::InitializationFailed(_)
            | Self::Upstream(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Storage(_)
            | Self::Registry(_) => 500,
        }
    }

    /// Stable machine-readable code for the outward contract
    pub fn code(&self) -> &'static str {
        match self {
            Self::AdmissionRejected { .. } => "admission_rejected",
            Self::InitializationFailed(_) => "initialization_failed",
            Self::HardLimited { .. } => "hard_limited",
            Self::AuthExhausted { .. } => "auth_exhausted",
            Self::Upstream(_) => "upstream_error",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Io(_) | Self::Json(_) | Self::Storage(_) => "storage_error",
            Self::Config(_) => "config_error",
            Self::Registry(_) => "registry_error",
        }
    }

    /// Wait hint in seconds, for errors that carry one
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::AdmissionRejected {
                retry_after_secs, ..
            }
            | Self::HardLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| RelayError::Storage(format!("{}: {}", context.into(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_hard_limit() {
        let err = ErrorClassifier::classify("Request failed with status 429");
        assert_eq!(err.kind, UpstreamErrorKind::HardLimit);

        let err = ErrorClassifier::classify("Too Many Requests");
        assert_eq!(err.kind, UpstreamErrorKind::HardLimit);
    }

    #[test]
    fn test_classify_auth_markers() {
        for msg in [
            "HTTP 401",
            "403 Forbidden",
            "Cookies invalid",
            "UNAUTHENTICATED",
            "Invalid response from server",
            "Failed to generate contents",
            "Server disconnected without sending a response",
            "RemoteProtocolError: peer closed",
            "connection closed by peer",
        ] {
            assert_eq!(ErrorClassifier::classify(msg).kind, UpstreamErrorKind::Auth, "{msg}");
        }
    }

    #[test]
    fn test_hard_limit_wins_over_auth() {
        // A 429 body that also mentions cookies must not trigger a refresh
        let err = ErrorClassifier::classify("429: cookie session throttled");
        assert_eq!(err.kind, UpstreamErrorKind::HardLimit);
    }

    #[test]
    fn test_classify_other_keeps_message() {
        let err = ErrorClassifier::classify("Model produced an empty candidate");
        assert_eq!(err.kind, UpstreamErrorKind::Other);
        assert_eq!(err.to_string(), "Model produced an empty candidate");
    }

    #[test]
    fn test_classify_http_status() {
        assert_eq!(ErrorClassifier::classify_http_status(429, "slow down").kind, UpstreamErrorKind::HardLimit);
        assert_eq!(ErrorClassifier::classify_http_status(401, "nope").kind, UpstreamErrorKind::Auth);
        assert_eq!(ErrorClassifier::classify_http_status(403, "nope").kind, UpstreamErrorKind::Auth);

        let err = ErrorClassifier::classify_http_status(502, "bad gateway");
        assert_eq!(err.kind, UpstreamErrorKind::Other);
        assert_eq!(err.status, Some(502));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RelayError::admission_rejected(Duration::from_secs(10), "x").status_code(),
            503
        );
        assert_eq!(
            RelayError::HardLimited {
                retry_after_secs: 3600
            }
            .status_code(),
            429
        );
        assert_eq!(
            RelayError::AuthExhausted {
                failure_count: 2,
                message: String::new()
            }
            .status_code(),
            401
        );
        assert_eq!(
            RelayError::Upstream(UpstreamError::other("boom")).status_code(),
            500
        );
        assert_eq!(
            RelayError::InitializationFailed("none".into()).status_code(),
            500
        );
    }

    #[test]
    fn test_admission_rejected_rounds_up() {
        let err = RelayError::admission_rejected(Duration::from_millis(1500), "Auth protection");
        assert_eq!(err.retry_after_secs(), Some(2));

        let err = RelayError::admission_rejected(Duration::from_millis(10), "Auth protection");
        assert_eq!(err.retry_after_secs(), Some(1));
    }

    #[test]
    fn test_auth_exhausted_message_has_count() {
        let err = RelayError::AuthExhausted {
            failure_count: 4,
            message: "no cookies".into(),
        };
        assert!(err.to_string().contains("Failure count: 4"));
    }

    #[test]
    fn test_unclassified_is_verbatim() {
        let err: RelayError = UpstreamError::other("weird upstream thing").into();
        assert_eq!(err.to_string(), "weird upstream thing");
        assert_eq!(err.code(), "upstream_error");
    }
}
