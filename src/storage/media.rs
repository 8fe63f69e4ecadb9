//! Generated Media Store
//!
//! Images land in day buckets: `<root>/YYYYMM/YYYYMMDD/<YYYYmmddHHMMSS>_<8 hex>.png`.
//! The relative part of that path is what ends up in the `/images/...` link.

use std::path::{Path, PathBuf};

use chrono::Local;
use ignore::WalkBuilder;
use rand::Rng;
use tracing::debug;

use crate::types::{RelayError, Result, ResultExt};

pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save PNG bytes; returns the `/`-joined path relative to the root
    pub async fn save(&self, bytes: &[u8]) -> Result<String> {
        let now = Local::now();
        let year_month = now.format("%Y%m").to_string();
        let date = now.format("%Y%m%d").to_string();
        let suffix: u32 = rand::rng().random();
        let file = format!("{}_{:08x}.png", now.format("%Y%m%d%H%M%S"), suffix);

        let dir = self.root.join(&year_month).join(&date);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context("create image directory")?;
        tokio::fs::write(dir.join(&file), bytes)
            .await
            .with_context("write image")?;

        let relative = format!("{}/{}/{}", year_month, date, file);
        debug!("Stored image {}", relative);
        Ok(relative)
    }

    /// Map a request path back to a stored file; rejects traversal
    pub async fn resolve(&self, year_month: &str, date: &str, file: &str) -> Result<PathBuf> {
        for segment in [year_month, date, file] {
            if !is_safe_segment(segment) {
                return Err(RelayError::BadRequest(format!(
                    "invalid image path segment: {}",
                    segment
                )));
            }
        }

        let path = self.root.join(year_month).join(date).join(file);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(RelayError::NotFound("Image".to_string())),
        }
    }

    /// Number of stored `.png` files
    pub async fn count(&self) -> Result<usize> {
        let root = self.root.clone();
        if !root.exists() {
            return Ok(0);
        }

        tokio::task::spawn_blocking(move || {
            WalkBuilder::new(&root)
                .standard_filters(false)
                .follow_links(false)
                .build()
                .filter_map(|e| e.ok())
                .filter(|entry| {
                    entry.file_type().is_some_and(|t| t.is_file())
                        && entry.path().extension().and_then(|e| e.to_str()) == Some("png")
                })
                .count()
        })
        .await
        .with_context("count stored images")
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
