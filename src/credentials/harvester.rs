//! External Command Harvester
//!
//! Runs an operator-supplied command (browser cookie export, vault lookup)
//! and reads a credential pair from its stdout. The command must print a JSON
//! object holding the two cookie values, under either the cache key names or
//! the browser cookie names.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{CredentialHarvester, CredentialPair};
use crate::config::CredentialsConfig;
use crate::constants::credentials::{
    PRIMARY_COOKIE, PRIMARY_KEY, SECONDARY_COOKIE, SECONDARY_KEY,
};
use crate::resilience::with_timeout_map;

pub struct CommandHarvester {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandHarvester {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from config; `None` when no command is configured
    pub fn from_config(config: &CredentialsConfig) -> Option<Self> {
        let program = config.harvest_command.as_deref()?.trim();
        if program.is_empty() {
            return None;
        }
        Some(Self::new(
            program,
            config.harvest_args.clone(),
            Duration::from_secs(config.harvest_timeout_secs),
        ))
    }

    fn parse_output(stdout: &str) -> Option<CredentialPair> {
        let value: serde_json::Value = match serde_json::from_str(stdout.trim()) {
            Ok(v) => v,
            Err(e) => {
                warn!("Harvester output is not JSON: {}", e);
                return None;
            }
        };

        let lookup = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        };

        let pair = CredentialPair::from_parts(
            lookup([PRIMARY_KEY, PRIMARY_COOKIE]),
            lookup([SECONDARY_KEY, SECONDARY_COOKIE]),
        );
        if pair.is_none() {
            warn!("Harvester output is missing one of the credential halves");
        }
        pair
    }
}

#[async_trait]
impl CredentialHarvester for CommandHarvester {
    async fn harvest(&self) -> Option<CredentialPair> {
        debug!("Running credential harvester: {}", self.program);

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn harvester '{}': {}", self.program, e);
                return None;
            }
        };

        let output =
            match with_timeout_map(self.timeout, child.wait_with_output(), "credential harvest")
                .await
            {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    warn!("Harvester '{}' failed: {}", self.program, e);
                    return None;
                }
                Err(e) => {
                    warn!("{}", e);
                    return None;
                }
            };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "Harvester '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
            return None;
        }

        let pair = Self::parse_output(&String::from_utf8_lossy(&output.stdout))?;
        info!("Harvested fresh credentials: {}", pair.preview());
        Some(pair)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cache_key_names() {
        let pair =
            CommandHarvester::parse_output(r#"{"SECURE_1PSID": "a", "SECURE_1PSIDTS": "b"}"#)
                .unwrap();
        assert_eq!(pair.primary(), "a");
        assert_eq!(pair.secondary(), "b");
    }

    #[test]
    fn test_parse_cookie_names() {
        let pair =
            CommandHarvester::parse_output(r#"{"__Secure-1PSID": "x", "__Secure-1PSIDTS": "y"}"#)
                .unwrap();
        assert_eq!(pair.primary(), "x");
        assert_eq!(pair.secondary(), "y");
    }

    #[test]
    fn test_parse_rejects_incomplete_output() {
        assert!(CommandHarvester::parse_output(r#"{"SECURE_1PSID": "a"}"#).is_none());
        assert!(CommandHarvester::parse_output("cookie=abc").is_none());
    }

    #[test]
    fn test_from_config_requires_command() {
        let config = CredentialsConfig::default();
        assert!(CommandHarvester::from_config(&config).is_none());

        let config = CredentialsConfig {
            harvest_command: Some("export-cookies".into()),
            ..Default::default()
        };
        let harvester = CommandHarvester::from_config(&config).unwrap();
        assert_eq!(harvester.name(), "export-cookies");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_harvest_runs_command() {
        let harvester = CommandHarvester::new(
            "sh",
            vec![
                "-c".into(),
                r#"echo '{"SECURE_1PSID": "cmd-a", "SECURE_1PSIDTS": "cmd-b"}'"#.into(),
            ],
            Duration::from_secs(10),
        );
        let pair = harvester.harvest().await.unwrap();
        assert_eq!(pair.primary(), "cmd-a");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_harvest_failure_is_none() {
        let failing = CommandHarvester::new(
            "sh",
            vec!["-c".into(), "exit 3".into()],
            Duration::from_secs(10),
        );
        assert!(failing.harvest().await.is_none());

        let slow = CommandHarvester::new(
            "sh",
            vec!["-c".into(), "sleep 5".into()],
            Duration::from_millis(100),
        );
        assert!(slow.harvest().await.is_none());

        let missing =
            CommandHarvester::new("/nonexistent/harvester", vec![], Duration::from_secs(1));
        assert!(missing.harvest().await.is_none());
    }
}
