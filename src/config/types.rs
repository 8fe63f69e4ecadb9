//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/chatrelay/) and project (.chatrelay/) level configuration.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    circuit_breaker as cb, context, credentials, network, registry, storage,
};
use crate::types::{RelayError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// HTTP listener settings
    pub server: ServerConfig,

    /// Credential source chain
    pub credentials: CredentialsConfig,

    /// Circuit breaker tuning
    pub breaker: BreakerConfig,

    /// Context reconciliation
    pub context: ContextConfig,

    /// Conversation and media storage
    pub storage: StorageConfig,

    /// Upstream bridge endpoint
    pub upstream: UpstreamConfig,

    /// Service registry (disabled when `server_addr` is unset)
    pub registry: RegistryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            server: ServerConfig::default(),
            credentials: CredentialsConfig::default(),
            breaker: BreakerConfig::default(),
            context: ContextConfig::default(),
            storage: StorageConfig::default(),
            upstream: UpstreamConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `RelayError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RelayError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(RelayError::Config(
                "breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.breaker.critical_cooldown_secs <= self.breaker.normal_cooldown_secs {
            return Err(RelayError::Config(format!(
                "breaker.critical_cooldown_secs ({}) must exceed normal_cooldown_secs ({})",
                self.breaker.critical_cooldown_secs, self.breaker.normal_cooldown_secs
            )));
        }

        if self.context.max_history_turns == 0 {
            return Err(RelayError::Config(
                "context.max_history_turns must be greater than 0".to_string(),
            ));
        }

        if self.upstream.timeout_secs == 0
            || self.credentials.harvest_timeout_secs == 0
            || self.breaker.probe_lease_secs == 0
        {
            return Err(RelayError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        if self.registry.heartbeat_interval_secs == 0 {
            return Err(RelayError::Config(
                "registry.heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Server
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL used in media links; derived from the Host header when unset
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: network::DEFAULT_HOST.to_string(),
            port: network::DEFAULT_PORT,
            public_base_url: None,
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credential source settings
///
/// The explicit override pair is held as secrets: never serialized to output
/// and redacted in debug output.
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Explicit primary credential (highest priority)
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub primary: Option<SecretString>,
    /// Explicit secondary credential
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub secondary: Option<SecretString>,
    /// Durable cache file
    pub cache_file: PathBuf,
    /// External command printing a credential pair as JSON on stdout
    pub harvest_command: Option<String>,
    pub harvest_args: Vec<String>,
    pub harvest_timeout_secs: u64,
}

/// Blank values count as unset
fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from))
}

impl Clone for CredentialsConfig {
    fn clone(&self) -> Self {
        let copy = |secret: &Option<SecretString>| {
            secret
                .as_ref()
                .map(|s| SecretString::from(s.expose_secret().to_string()))
        };
        Self {
            primary: copy(&self.primary),
            secondary: copy(&self.secondary),
            cache_file: self.cache_file.clone(),
            harvest_command: self.harvest_command.clone(),
            harvest_args: self.harvest_args.clone(),
            harvest_timeout_secs: self.harvest_timeout_secs,
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("primary", &self.primary.as_ref().map(|_| "[REDACTED]"))
            .field("secondary", &self.secondary.as_ref().map(|_| "[REDACTED]"))
            .field("cache_file", &self.cache_file)
            .field("harvest_command", &self.harvest_command)
            .field("harvest_args", &self.harvest_args)
            .field("harvest_timeout_secs", &self.harvest_timeout_secs)
            .finish()
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            primary: None,
            secondary: None,
            cache_file: PathBuf::from(credentials::CACHE_FILE),
            harvest_command: None,
            harvest_args: Vec::new(),
            harvest_timeout_secs: credentials::HARVEST_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Circuit Breaker
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub normal_cooldown_secs: u64,
    pub critical_cooldown_secs: u64,
    pub jitter_secs: u64,
    pub probe_lease_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: cb::FAILURE_THRESHOLD,
            normal_cooldown_secs: cb::NORMAL_COOLDOWN_SECS,
            critical_cooldown_secs: cb::CRITICAL_COOLDOWN_SECS,
            jitter_secs: cb::JITTER_SECS,
            probe_lease_secs: cb::PROBE_LEASE_SECS,
        }
    }
}

// =============================================================================
// Context
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_history_turns: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history_turns: context::MAX_HISTORY_TURNS,
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub conversations_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            conversations_dir: PathBuf::from(storage::CONVERSATIONS_DIR),
            images_dir: PathBuf::from(storage::IMAGES_DIR),
        }
    }
}

// =============================================================================
// Upstream
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub bridge_url: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            bridge_url: network::BRIDGE_URL.to_string(),
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry address (`host:port` or URL); registration is skipped when unset
    pub server_addr: Option<String>,
    pub service_name: String,
    pub namespace: String,
    pub group: String,
    /// Address advertised instead of the detected container IP
    pub external_ip: Option<String>,
    /// Port advertised instead of `server.port`
    pub external_port: Option<u16>,
    pub heartbeat_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            server_addr: None,
            service_name: registry::SERVICE_NAME.to_string(),
            namespace: registry::NAMESPACE.to_string(),
            group: registry::GROUP.to_string(),
            external_ip: None,
            external_port: None,
            heartbeat_interval_secs: registry::HEARTBEAT_INTERVAL_SECS,
            shutdown_timeout_secs: registry::SHUTDOWN_TIMEOUT_SECS,
        }
    }
}
