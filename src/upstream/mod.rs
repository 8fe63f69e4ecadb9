//! Upstream Backend Abstraction
//!
//! The backend has no stable API, so the relay only sees three seams:
//! a connector that binds a credential pair to a client, the client that opens
//! conversation sessions, and the session that exchanges messages.
//!
//! ## Modules
//!
//! - `bridge`: JSON-over-HTTP connector for the sidecar hosting the backend library

mod bridge;

pub use bridge::BridgeConnector;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::credentials::CredentialPair;
use crate::types::UpstreamError;

// =============================================================================
// Model Catalogue
// =============================================================================

/// Upstream model selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamModel {
    /// Let the backend choose
    #[default]
    Unspecified,
    Gemini25Pro,
    Gemini25Flash,
    Gemini30Pro,
}

/// Public model names and the upstream model each selects
pub const MODEL_CATALOGUE: &[(&str, UpstreamModel)] = &[
    ("gemini-pro", UpstreamModel::Gemini25Pro),
    ("gemini-2.5-pro", UpstreamModel::Gemini25Pro),
    ("gemini-2.5-flash", UpstreamModel::Gemini25Flash),
    ("gemini-3.0-pro", UpstreamModel::Gemini30Pro),
    ("default", UpstreamModel::Unspecified),
];

impl UpstreamModel {
    /// Resolve a public model name; unknown names fall back to `Unspecified`
    pub fn resolve(name: &str) -> Self {
        MODEL_CATALOGUE
            .iter()
            .find(|(public, _)| *public == name)
            .map(|(_, model)| *model)
            .unwrap_or_default()
    }

    /// Identifier understood by the backend library
    pub fn upstream_id(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Gemini25Pro => "gemini-2.5-pro",
            Self::Gemini25Flash => "gemini-2.5-flash",
            Self::Gemini30Pro => "gemini-3.0-pro",
        }
    }
}

impl Serialize for UpstreamModel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.upstream_id())
    }
}

// =============================================================================
// Reply Types
// =============================================================================

/// Media item generated by the upstream (currently PNG images)
#[derive(Debug, Clone)]
pub struct GeneratedMedia {
    pub bytes: Vec<u8>,
}

/// Result of a single message exchange
#[derive(Debug, Clone, Default)]
pub struct UpstreamReply {
    pub text: String,
    pub media: Vec<GeneratedMedia>,
    /// Conversation metadata after the exchange (opaque to the relay)
    pub metadata: Option<Value>,
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Binds a credential pair to an authenticated client
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(
        &self,
        pair: &CredentialPair,
    ) -> std::result::Result<Arc<dyn UpstreamClient>, UpstreamError>;
}

/// Authenticated client for one credential generation
pub trait UpstreamClient: Send + Sync {
    /// Open a session, resuming from prior metadata when given
    fn start_session(&self, metadata: Option<Value>, model: UpstreamModel)
    -> Arc<dyn UpstreamSession>;

    /// Log-safe preview of the bound credentials
    fn credential_preview(&self) -> String;
}

/// One conversation bound to one client
#[async_trait]
pub trait UpstreamSession: Send + Sync {
    async fn send(
        &self,
        text: &str,
        attachments: &[String],
    ) -> std::result::Result<UpstreamReply, UpstreamError>;

    /// Current conversation metadata, updated by each successful send
    fn metadata(&self) -> Option<Value>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        assert_eq!(UpstreamModel::resolve("gemini-pro"), UpstreamModel::Gemini25Pro);
        assert_eq!(UpstreamModel::resolve("gemini-3.0-pro"), UpstreamModel::Gemini30Pro);
        assert_eq!(UpstreamModel::resolve("default"), UpstreamModel::Unspecified);
    }

    #[test]
    fn test_unknown_model_is_unspecified() {
        assert_eq!(UpstreamModel::resolve("gpt-4"), UpstreamModel::Unspecified);
        assert_eq!(UpstreamModel::resolve("gpt-4").upstream_id(), "unspecified");
    }
}
