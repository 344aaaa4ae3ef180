//! The authoritative content store.
//!
//! [`ContentSource`] is the seam between the sync engine and wherever
//! articles actually live. [`SqliteContentSource`] reads the CMS `content`
//! table; [`MemorySource`] keeps rows in memory with identical filtering and
//! ordering, for tests and local demos.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::RwLock;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::db;
use crate::models::SourceRow;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Published rows in `category`, newest `created` first.
    ///
    /// With `since` set, only rows whose `created` or `modified` is strictly
    /// greater than it are returned.
    async fn fetch_published(&self, category: i64, since: Option<&str>) -> Result<Vec<SourceRow>>;
}

pub struct SqliteContentSource {
    config: SourceConfig,
}

impl SqliteContentSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    async fn query(&self, category: i64, since: Option<&str>) -> Result<Vec<SourceRow>> {
        let pool = db::connect(&self.config).await?;

        let rows = match since {
            None => {
                sqlx::query(
                    r#"
                    SELECT id, title, slug, body, images, created, modified, author_alias
                    FROM content
                    WHERE state = ? AND category = ?
                    ORDER BY created DESC
                    "#,
                )
                .bind(self.config.published_state)
                .bind(category)
                .fetch_all(&pool)
                .await
            }
            Some(cursor) => {
                sqlx::query(
                    r#"
                    SELECT id, title, slug, body, images, created, modified, author_alias
                    FROM content
                    WHERE state = ? AND category = ? AND (created > ? OR modified > ?)
                    ORDER BY created DESC
                    "#,
                )
                .bind(self.config.published_state)
                .bind(category)
                .bind(cursor)
                .bind(cursor)
                .fetch_all(&pool)
                .await
            }
        };
        pool.close().await;

        let rows = rows?;
        Ok(rows
            .iter()
            .map(|row| SourceRow {
                id: row.get("id"),
                title: row.get("title"),
                slug: row.get("slug"),
                body: row.get("body"),
                images: row.get("images"),
                created: row.get("created"),
                modified: row.get("modified"),
                author: row.get("author_alias"),
            })
            .collect())
    }
}

#[async_trait]
impl ContentSource for SqliteContentSource {
    async fn fetch_published(&self, category: i64, since: Option<&str>) -> Result<Vec<SourceRow>> {
        let limit = Duration::from_secs(self.config.query_timeout_secs);
        tokio::time::timeout(limit, self.query(category, since))
            .await
            .map_err(|_| anyhow!("content query timed out after {}s", limit.as_secs()))?
    }
}

struct StoredRow {
    category: i64,
    published: bool,
    row: SourceRow,
}

/// In-memory content store.
pub struct MemorySource {
    rows: RwLock<Vec<StoredRow>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Insert a row, replacing any existing row with the same id.
    pub fn insert(&self, category: i64, published: bool, row: SourceRow) {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        rows.retain(|r| r.row.id != row.id);
        rows.push(StoredRow {
            category,
            published,
            row,
        });
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn fetch_published(&self, category: i64, since: Option<&str>) -> Result<Vec<SourceRow>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| anyhow!("memory source lock poisoned"))?;

        let mut out: Vec<SourceRow> = rows
            .iter()
            .filter(|r| r.published && r.category == category)
            .filter(|r| match since {
                None => true,
                Some(cursor) => {
                    r.row.created.as_str() > cursor
                        || r.row.modified.as_deref().is_some_and(|m| m > cursor)
                }
            })
            .map(|r| r.row.clone())
            .collect();
        out.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;
    use tempfile::TempDir;

    fn row(id: i64, created: &str, modified: Option<&str>) -> SourceRow {
        SourceRow {
            id,
            title: format!("Post {}", id),
            slug: format!("post-{}", id),
            body: "<p>body</p>".to_string(),
            images: None,
            created: created.to_string(),
            modified: modified.map(str::to_string),
            author: None,
        }
    }

    fn source_config(tmp: &TempDir) -> SourceConfig {
        SourceConfig {
            path: tmp.path().join("site.sqlite"),
            category: 8,
            published_state: 1,
            query_timeout_secs: 5,
        }
    }

    async fn insert(cfg: &SourceConfig, category: i64, state: i64, r: &SourceRow) {
        let pool = db::connect(cfg).await.unwrap();
        sqlx::query(
            "INSERT INTO content (id, title, slug, body, images, category, state, created, modified, author_alias) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(r.id)
        .bind(&r.title)
        .bind(&r.slug)
        .bind(&r.body)
        .bind(&r.images)
        .bind(category)
        .bind(state)
        .bind(&r.created)
        .bind(&r.modified)
        .bind(&r.author)
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn test_memory_source_filters_and_orders() {
        let src = MemorySource::new();
        src.insert(8, true, row(1, "2024-01-01 00:00:00", None));
        src.insert(8, true, row(2, "2024-03-01 00:00:00", None));
        src.insert(8, false, row(3, "2024-04-01 00:00:00", None));
        src.insert(9, true, row(4, "2024-05-01 00:00:00", None));

        let ids: Vec<i64> = src
            .fetch_published(8, None)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_memory_source_cursor_matches_created_or_modified() {
        let src = MemorySource::new();
        src.insert(8, true, row(1, "2024-01-01 00:00:00", Some("2024-06-01 00:00:00")));
        src.insert(8, true, row(2, "2024-03-01 00:00:00", None));
        src.insert(8, true, row(3, "2024-01-15 00:00:00", None));

        let ids: Vec<i64> = src
            .fetch_published(8, Some("2024-02-01 00:00:00"))
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_sqlite_source_applies_state_category_and_cursor() {
        let tmp = TempDir::new().unwrap();
        let cfg = source_config(&tmp);
        run_migrations(&cfg).await.unwrap();

        insert(&cfg, 8, 1, &row(1, "2024-01-01 00:00:00", None)).await;
        insert(&cfg, 8, 1, &row(2, "2024-02-01 00:00:00", Some("2024-07-01 00:00:00"))).await;
        insert(&cfg, 8, 0, &row(3, "2024-03-01 00:00:00", None)).await;
        insert(&cfg, 5, 1, &row(4, "2024-04-01 00:00:00", None)).await;
        insert(&cfg, 8, 1, &row(5, "2024-05-01 00:00:00", None)).await;

        let src = SqliteContentSource::new(cfg);

        let all: Vec<i64> = src
            .fetch_published(8, None)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec![5, 2, 1]);

        let newer = src
            .fetch_published(8, Some("2024-04-15 00:00:00"))
            .await
            .unwrap();
        let ids: Vec<i64> = newer.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 2]);
        assert_eq!(newer[1].modified.as_deref(), Some("2024-07-01 00:00:00"));
    }

    #[tokio::test]
    async fn test_sqlite_source_missing_database_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let src = SqliteContentSource::new(source_config(&tmp));
        assert!(src.fetch_published(8, None).await.is_err());
        assert!(!tmp.path().join("site.sqlite").exists());
    }
}
