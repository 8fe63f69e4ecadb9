//! Config Command
//!
//! Inspect the effective chatrelay configuration.
//!
//! Usage:
//!   chatrelay config show [-f toml|json]
//!   chatrelay config path

use crate::config::{Config, ConfigLoader};
use crate::types::{RelayError, Result};

/// Show the effective configuration (secrets omitted)
pub fn show(config: &Config, format: &str) -> Result<()> {
    println!("{}", render(config, format)?);
    Ok(())
}

fn render(config: &Config, format: &str) -> Result<String> {
    match format {
        "toml" => ConfigLoader::render_config(config, false),
        "json" => ConfigLoader::render_config(config, true),
        other => Err(RelayError::Config(format!(
            "Unknown format '{}'. Valid values: toml, json",
            other
        ))),
    }
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_uses_given_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[server]\nport = 9123\n").unwrap();
        let config = ConfigLoader::load_from_file(&path).unwrap();

        let toml_out = render(&config, "toml").unwrap();
        assert!(toml_out.contains("port = 9123"));

        let json_out: serde_json::Value =
            serde_json::from_str(&render(&config, "json").unwrap()).unwrap();
        assert_eq!(json_out["server"]["port"], 9123);
    }

    #[test]
    fn test_render_rejects_unknown_format() {
        let err = render(&Config::default(), "yaml").unwrap_err();
        assert!(matches!(err, RelayError::Config(ref m) if m.contains("yaml")));
    }
}
