//! Credential Sources
//!
//! The upstream authenticates with a two-part secret obtained out-of-band.
//! This module defines the pair and the layered source chain that produces it.
//!
//! ## Modules
//!
//! - `supplier`: override → durable cache → live harvest, with forced refresh
//! - `cache`: JSON file cache
//! - `harvester`: external command harvester

mod cache;
mod harvester;
mod supplier;

pub use cache::FileCredentialCache;
pub use harvester::CommandHarvester;
pub use supplier::CredentialSupplier;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::constants::credentials::PREVIEW_CHARS;
use crate::types::Result;

// =============================================================================
// Credential Pair
// =============================================================================

/// Primary id + secondary token, valid only together.
///
/// Both halves are held as `SecretString`; debug output is redacted.
pub struct CredentialPair {
    primary: SecretString,
    secondary: SecretString,
}

impl CredentialPair {
    /// Build a pair; returns `None` unless both halves are non-empty
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Option<Self> {
        let primary = primary.into();
        let secondary = secondary.into();
        if primary.trim().is_empty() || secondary.trim().is_empty() {
            return None;
        }
        Some(Self {
            primary: SecretString::from(primary.trim().to_string()),
            secondary: SecretString::from(secondary.trim().to_string()),
        })
    }

    /// Build a pair from optional halves (config, env, parsed JSON)
    pub fn from_parts(primary: Option<&str>, secondary: Option<&str>) -> Option<Self> {
        match (primary, secondary) {
            (Some(p), Some(s)) => Self::new(p, s),
            _ => None,
        }
    }

    pub fn primary(&self) -> &str {
        self.primary.expose_secret()
    }

    pub fn secondary(&self) -> &str {
        self.secondary.expose_secret()
    }

    /// Short prefix of the secondary token, safe for logs
    pub fn preview(&self) -> String {
        let preview: String = self.secondary().chars().take(PREVIEW_CHARS).collect();
        format!("{}...", preview)
    }
}

impl Clone for CredentialPair {
    fn clone(&self) -> Self {
        Self {
            primary: SecretString::from(self.primary().to_string()),
            secondary: SecretString::from(self.secondary().to_string()),
        }
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("primary", &"[REDACTED]")
            .field("secondary", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for CredentialPair {
    fn eq(&self, other: &Self) -> bool {
        self.primary() == other.primary() && self.secondary() == other.secondary()
    }
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Durable credential cache
#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// Read a complete pair; missing, unreadable or partial entries are `None`
    async fn read(&self) -> Option<CredentialPair>;

    /// Persist a pair, replacing any previous entry
    async fn write(&self, pair: &CredentialPair) -> Result<()>;
}

/// Live credential source (browser export, vault, operator script)
#[async_trait]
pub trait CredentialHarvester: Send + Sync {
    /// Harvest a fresh pair; every failure collapses to `None`
    async fn harvest(&self) -> Option<CredentialPair>;

    /// Harvester name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators shared by supplier and orchestrator tests

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct MemoryCache {
        pub entry: Mutex<Option<CredentialPair>>,
        pub fail_writes: bool,
    }

    impl MemoryCache {
        pub fn seeded(primary: &str, secondary: &str) -> Self {
            Self {
                entry: Mutex::new(CredentialPair::new(primary, secondary)),
                fail_writes: false,
            }
        }

        pub fn current(&self) -> Option<CredentialPair> {
            self.entry.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CredentialCache for MemoryCache {
        async fn read(&self) -> Option<CredentialPair> {
            self.current()
        }

        async fn write(&self, pair: &CredentialPair) -> Result<()> {
            if self.fail_writes {
                return Err(crate::types::RelayError::Storage("disk full".into()));
            }
            *self.entry.lock().unwrap() = Some(pair.clone());
            Ok(())
        }
    }

    /// Harvester returning queued pairs in order, then `None`
    #[derive(Default)]
    pub struct QueueHarvester {
        pub queue: Mutex<Vec<CredentialPair>>,
        pub calls: AtomicUsize,
    }

    impl QueueHarvester {
        pub fn with(pairs: &[(&str, &str)]) -> Self {
            let mut queue: Vec<CredentialPair> = pairs
                .iter()
                .filter_map(|(p, s)| CredentialPair::new(*p, *s))
                .collect();
            queue.reverse();
            Self {
                queue: Mutex::new(queue),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialHarvester for QueueHarvester {
        async fn harvest(&self) -> Option<CredentialPair> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queue.lock().unwrap().pop()
        }

        fn name(&self) -> &str {
            "queue"
        }
    }
}
