//! The persisted article cache document.
//!
//! Loading never fails: a missing or malformed file yields an empty document.
//! Saving stamps `generated_at`, then replaces the file atomically (temp file
//! in the same directory, then rename) while holding an exclusive lock.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::ArticleCacheDocument;

pub struct ArticleCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ArticleCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted document, degrading to an empty one.
    pub async fn load(&self) -> ArticleCacheDocument {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cache document yet");
                return ArticleCacheDocument::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache document unreadable, starting empty");
                return ArticleCacheDocument::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache document malformed, starting empty");
                ArticleCacheDocument::default()
            }
        }
    }

    /// Stamp `generated_at` and atomically replace the persisted document.
    pub async fn save(&self, doc: &mut ArticleCacheDocument) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        doc.generated_at = Some(now_iso());
        let json = serde_json::to_string_pretty(doc)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .context("cache writer task panicked")??;

        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write cache document: {}", path.display()))?;
    Ok(())
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}
