//! Conversation Store
//!
//! Key-value persistence of session metadata keyed by conversation id.
//! Records are recovered after a restart, or on an instance that never
//! held the session in memory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::types::{ConversationId, Result, ResultExt};

/// Listing entry for a persisted conversation
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub modified: DateTime<Utc>,
    pub size_kb: f64,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Metadata for `id`, or `None` when no record exists
    async fn get(&self, id: &ConversationId) -> Result<Option<Value>>;

    /// Replace the record for `id` atomically
    async fn put(&self, id: &ConversationId, metadata: &Value) -> Result<()>;

    /// Delete the record for `id`; returns whether one existed
    async fn delete(&self, id: &ConversationId) -> Result<bool>;

    /// All records, newest first
    async fn list(&self) -> Result<Vec<ConversationSummary>>;
}

/// One pretty-printed JSON file per conversation: `<dir>/<id>.json`
pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &ConversationId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn get(&self, id: &ConversationId) -> Result<Option<Value>> {
        let path = self.path_for(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata = serde_json::from_str(&content)
            .with_context(format!("parse conversation record {}", id))?;
        Ok(Some(metadata))
    }

    async fn put(&self, id: &ConversationId, metadata: &Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context("create conversations directory")?;

        let path = self.path_for(id);
        let tmp = self.dir.join(format!(".{}.json.tmp", id.as_str()));
        let content = serde_json::to_string_pretty(metadata)?;

        tokio::fs::write(&tmp, content)
            .await
            .with_context(format!("write conversation record {}", id))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(format!("replace conversation record {}", id))?;

        debug!(conversation_id = %id, "Conversation saved");
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Skips in-flight temp files and foreign names
            if ConversationId::parse(stem).is_err() {
                continue;
            }

            let meta = entry.metadata().await?;
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            summaries.push(ConversationSummary {
                conversation_id: stem.to_string(),
                modified,
                size_kb: (meta.len() as f64 / 1024.0 * 100.0).round() / 100.0,
            });
        }

        summaries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> ConversationId {
        ConversationId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(dir.path().join("conversations"));
        let conv = id("conv-1");

        assert!(store.get(&conv).await.unwrap().is_none());

        let metadata = serde_json::json!({"cid": "c", "rid": "r", "rcid": "rc"});
        store.put(&conv, &metadata).await.unwrap();
        assert_eq!(store.get(&conv).await.unwrap(), Some(metadata));

        assert!(store.delete(&conv).await.unwrap());
        assert!(!store.delete(&conv).await.unwrap());
        assert!(store.get(&conv).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(dir.path());
        let conv = id("conv-2");

        store.put(&conv, &serde_json::json!({"turn": 1})).await.unwrap();
        store.put(&conv, &serde_json::json!({"turn": 2})).await.unwrap();

        assert_eq!(
            store.get(&conv).await.unwrap(),
            Some(serde_json::json!({"turn": 2}))
        );
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["conv-2.json".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{").unwrap();
        let store = FileConversationStore::new(dir.path());
        assert!(store.get(&id("bad")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(dir.path());

        store.put(&id("older"), &serde_json::json!({})).await.unwrap();
        let old = std::fs::File::options()
            .write(true)
            .open(dir.path().join("older.json"))
            .unwrap();
        old.set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(3600))
            .unwrap();
        store.put(&id("newer"), &serde_json::json!({})).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.conversation_id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(dir.path().join("absent"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
