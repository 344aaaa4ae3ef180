//! Incremental synchronization of the article cache.
//!
//! One pass loads the cache document, asks the content source for published
//! rows newer than the document's `last_modified` watermark, turns each row
//! into an [`ArticleRecord`] (resolving its intro image through the image
//! cache), upserts the records, advances the watermark, and persists.
//!
//! A source failure aborts the pass before anything is written. Image
//! failures only null out the affected record's `image`.
//!
//! Passes are serialized: a second caller waits for the running pass and then
//! runs its own against the freshly persisted watermark.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::ArticleCache;
use crate::config::{ArticlesConfig, Config};
use crate::images::{HttpFetcher, ImageCacheStore};
use crate::intro::make_intro;
use crate::models::{ArticleCacheDocument, ArticleRecord, SourceRow};
use crate::source::{ContentSource, SqliteContentSource};

/// Result of a single pass.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub document: ArticleCacheDocument,
    /// Rows returned by the content source.
    pub fetched: usize,
    /// Records written with a non-null image.
    pub with_image: usize,
    /// Watermark before the pass.
    pub previous_cursor: Option<String>,
}

pub struct SyncEngine {
    source: Arc<dyn ContentSource>,
    cache: ArticleCache,
    images: ImageCacheStore,
    default_author: String,
    intro_max_chars: usize,
    pass_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ContentSource>,
        cache: ArticleCache,
        images: ImageCacheStore,
        articles: &ArticlesConfig,
    ) -> Self {
        Self {
            source,
            cache,
            images,
            default_author: articles.default_author.clone(),
            intro_max_chars: articles.intro_max_chars,
            pass_lock: Mutex::new(()),
        }
    }

    /// Engine over the configured SQLite content store and HTTP image origin.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = Arc::new(SqliteContentSource::new(config.source.clone()));
        let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
            config.images.timeout_secs,
        ))?);
        let images = ImageCacheStore::from_config(config, fetcher)?;
        let cache = ArticleCache::new(config.cache.document.clone());
        Ok(Self::new(source, cache, images, &config.articles))
    }

    pub fn cache(&self) -> &ArticleCache {
        &self.cache
    }

    /// Run one incremental pass and return the persisted document.
    pub async fn run(&self, category: i64) -> Result<ArticleCacheDocument> {
        Ok(self.run_pass(category, false).await?.document)
    }

    /// Run one pass. With `full`, the source is queried without a cursor;
    /// the watermark still never moves backwards.
    pub async fn run_pass(&self, category: i64, full: bool) -> Result<SyncOutcome> {
        let _pass = self.pass_lock.lock().await;

        let mut doc = self.cache.load().await;
        let cursor = doc.last_modified.clone();
        let query_cursor = if full { None } else { cursor.as_deref() };

        let rows = self
            .source
            .fetch_published(category, query_cursor)
            .await
            .context("content source unavailable")?;
        debug!(category, cursor = ?cursor, rows = rows.len(), "fetched content rows");

        let mut with_image = 0usize;
        for row in &rows {
            let record = self.build_record(row).await;
            if record.image.is_some() {
                with_image += 1;
            }
            doc.upsert(record);
        }
        doc.last_modified = advance_watermark(cursor.clone(), &rows);

        self.cache
            .save(&mut doc)
            .await
            .context("failed to persist article cache")?;

        info!(
            category,
            fetched = rows.len(),
            total = doc.len(),
            last_modified = ?doc.last_modified,
            "sync pass complete"
        );

        Ok(SyncOutcome {
            document: doc,
            fetched: rows.len(),
            with_image,
            previous_cursor: cursor,
        })
    }

    async fn build_record(&self, row: &SourceRow) -> ArticleRecord {
        let image = match row.images.as_deref().and_then(intro_image_ref) {
            Some(reference) => self.images.resolve(&reference, row.id).await,
            None => None,
        };

        let author = row
            .author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(self.default_author.as_str())
            .to_string();

        ArticleRecord {
            id: row.id,
            title: row.title.clone(),
            slug: row.slug.clone(),
            intro: make_intro(&row.body, self.intro_max_chars),
            image,
            created: row.created.clone(),
            modified: row.modified_at().unwrap_or(row.created.as_str()).to_string(),
            author,
        }
    }
}

/// Highest watermark across `rows`, seeded from `cursor`.
///
/// Returns `None` only when there was no cursor and no rows.
pub fn advance_watermark(cursor: Option<String>, rows: &[SourceRow]) -> Option<String> {
    rows.iter().fold(cursor, |max, row| {
        let candidate = row.watermark();
        match max {
            Some(m) if m.as_str() >= candidate => Some(m),
            _ => Some(candidate.to_string()),
        }
    })
}

/// Extract the intro image path from a structured image reference.
///
/// The reference is a JSON object; editors may append `#metadata` to the
/// path, which is dropped.
pub fn intro_image_ref(images_json: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(images_json) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "unparsable image reference");
            return None;
        }
    };
    let raw = value.get("image_intro")?.as_str()?;
    let path = raw.split('#').next().unwrap_or_default().trim();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}
