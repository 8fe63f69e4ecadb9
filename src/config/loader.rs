//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/chatrelay/config.toml)
//! 3. Project config (.chatrelay/config.toml)
//! 4. Legacy deployment variables (SECURE_1PSID, PORT, NACOS_SERVER_ADDR, ...)
//! 5. Environment variables (CHATRELAY_* prefix, `__` between sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::Config;
use crate::constants::credentials;
use crate::types::{RelayError, Result};

/// Unprefixed variables kept from existing container deployments
const LEGACY_ENV: &[(&str, &str)] = &[
    (credentials::PRIMARY_ENV, "credentials.primary"),
    (credentials::SECONDARY_ENV, "credentials.secondary"),
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("IMAGES_DIR", "storage.images_dir"),
    ("NACOS_SERVER_ADDR", "registry.server_addr"),
    ("EXTERNAL_IP", "registry.external_ip"),
    ("EXTERNAL_PORT", "registry.external_port"),
];

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → legacy env → env vars
    pub fn load() -> Result<Config> {
        let project_path = Self::project_config_path();
        let figment = Self::figment(Self::global_config_path().as_deref(), &project_path);
        Self::extract(figment)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path));
        Self::extract(figment)
    }

    fn figment(global_path: Option<&Path>, project_path: &Path) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Merge global config
        if let Some(global_path) = global_path
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        // Merge project config
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(project_path));
        }

        let legacy_keys: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();
        figment = figment.merge(Env::raw().only(&legacy_keys).map(|key| {
            LEGACY_ENV
                .iter()
                .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                .map(|(_, path)| (*path).into())
                .unwrap_or_else(|| key.as_str().to_string().into())
        }));

        // Merge environment variables (e.g., CHATRELAY_BREAKER__JITTER_SECS -> breaker.jitter_secs)
        figment.merge(Env::prefixed("CHATRELAY_").split("__").lowercase(true))
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| RelayError::Config(format!("Configuration error: {}", e)))?;

        // Validate configuration after loading
        config.validate()?;

        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/chatrelay/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("chatrelay"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".chatrelay/config.toml")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Render an effective configuration (secrets are never serialized)
    pub fn render_config(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| RelayError::Config(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_load_from_file_merges_sections() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[breaker]
failure_threshold = 5
normal_cooldown_secs = 60
critical_cooldown_secs = 240

[registry]
server_addr = "nacos:8848"
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.critical_cooldown_secs, 240);
        // Untouched fields keep their defaults
        assert_eq!(config.breaker.jitter_secs, 300);
        assert_eq!(config.registry.server_addr.as_deref(), Some("nacos:8848"));
        assert_eq!(config.registry.group, "DEFAULT_GROUP");
    }

    #[test]
    fn test_load_from_file_validates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[breaker]\ncritical_cooldown_secs = 10\n").unwrap();

        let result = ConfigLoader::load_from_file(&path);
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("config.toml");
        std::fs::write(&project, "[context]\nmax_history_turns = 4\n").unwrap();

        let missing_global = temp_dir.path().join("absent.toml");
        let config =
            ConfigLoader::extract(ConfigLoader::figment(Some(&missing_global), &project)).unwrap();
        assert_eq!(config.context.max_history_turns, 4);
    }

    #[test]
    fn test_env_override() {
        // SAFETY: This test runs in isolation
        unsafe {
            std::env::set_var("CHATRELAY_UPSTREAM__BRIDGE_URL", "http://bridge.test:9000");
        }
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.upstream.bridge_url, "http://bridge.test:9000");
        unsafe {
            std::env::remove_var("CHATRELAY_UPSTREAM__BRIDGE_URL");
        }
    }
}
