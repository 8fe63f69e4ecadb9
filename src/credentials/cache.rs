//! File Credential Cache
//!
//! Keeps the last good credential pair in a small JSON document so a restart
//! does not need a fresh harvest:
//!
//! ```json
//! {"SECURE_1PSID": "...", "SECURE_1PSIDTS": "...", "updated_at": "2026-01-01T00:00:00+00:00"}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CredentialCache, CredentialPair};
use crate::types::{Result, ResultExt};

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(rename = "SECURE_1PSID", default)]
    primary: Option<String>,
    #[serde(rename = "SECURE_1PSIDTS", default)]
    secondary: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

/// JSON file cache at a fixed path
pub struct FileCredentialCache {
    path: PathBuf,
}

impl FileCredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialCache for FileCredentialCache {
    async fn read(&self) -> Option<CredentialPair> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Credential cache not found: {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!(
                    "Failed to read credential cache {}: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        let document: CacheDocument = match serde_json::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    "Credential cache {} is not valid JSON: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        let pair =
            CredentialPair::from_parts(document.primary.as_deref(), document.secondary.as_deref());
        match &pair {
            Some(pair) => debug!(
                "Loaded cached credentials (updated {}): {}",
                document.updated_at.as_deref().unwrap_or("unknown"),
                pair.preview()
            ),
            None => debug!("Credential cache is incomplete, ignoring"),
        }
        pair
    }

    async fn write(&self, pair: &CredentialPair) -> Result<()> {
        let document = CacheDocument {
            primary: Some(pair.primary().to_string()),
            secondary: Some(pair.secondary().to_string()),
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let content = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context("create credential cache directory")?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context("write credential cache")?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context("replace credential cache")?;

        info!(
            "Credentials cached to {}: {}",
            self.path.display(),
            pair.preview()
        );
        Ok(())
    }
}
