pub mod error;

pub use error::{
    ErrorClassifier, RelayError, Result, ResultExt, UpstreamError, UpstreamErrorKind,
};

// =============================================================================
// Domain Newtypes
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type-safe wrapper for conversation identifiers
///
/// Ids double as persistence keys (file stems), so only ASCII alphanumerics,
/// `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    /// Maximum accepted id length
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a caller-supplied id
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > Self::MAX_LEN {
            return Err(RelayError::BadRequest(format!(
                "conversation id must be 1-{} characters",
                Self::MAX_LEN
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RelayError::BadRequest(format!(
                "conversation id contains invalid characters: {}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ConversationId {
    type Error = RelayError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

impl AsRef<str> for ConversationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod newtype_tests {
    use super::*;

    #[test]
    fn test_conversation_id_accepts_uuid() {
        let id = ConversationId::generate();
        assert!(ConversationId::parse(id.as_str()).is_ok());
        assert_eq!(id.as_str().len(), 36);
    }

    #[test]
    fn test_conversation_id_rejects_traversal() {
        assert!(ConversationId::parse("../etc/passwd").is_err());
        assert!(ConversationId::parse("a/b").is_err());
        assert!(ConversationId::parse("").is_err());
        assert!(ConversationId::parse("x".repeat(200)).is_err());
    }

    #[test]
    fn test_conversation_id_serde() {
        let id: ConversationId = serde_json::from_str("\"conv_42\"").unwrap();
        assert_eq!(id.as_str(), "conv_42");
        assert!(serde_json::from_str::<ConversationId>("\"bad id\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conv_42\"");
    }
}
