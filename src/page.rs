//! Paginated, newest-first reads of the article cache.
//!
//! Every read first runs a sync pass, so the cache is refreshed on demand
//! rather than on a schedule.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::models::{ArticleCacheDocument, ArticleRecord};
use crate::sync::SyncEngine;

/// JSON envelope returned by the read endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PageResponse {
    pub generated_at: Option<String>,
    pub last_modified: Option<String>,
    pub page: usize,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
    pub total: usize,
    #[serde(rename = "totalPages")]
    pub total_pages: usize,
    pub items: Vec<ArticleRecord>,
}

pub struct PageServer {
    engine: Arc<SyncEngine>,
    category: i64,
    default_page_size: usize,
    max_page_size: usize,
}

impl PageServer {
    pub fn new(engine: Arc<SyncEngine>, config: &Config) -> Self {
        Self {
            engine,
            category: config.source.category,
            default_page_size: config.articles.default_page_size,
            max_page_size: config.articles.max_page_size,
        }
    }

    /// Sync, then return page `page` of size `limit` (both clamped).
    pub async fn handle(&self, page: Option<i64>, limit: Option<i64>) -> Result<PageResponse> {
        let (page, page_size) = clamp_request(page, limit, self.default_page_size, self.max_page_size);
        let doc = self.engine.run(self.category).await?;
        Ok(paginate(&doc, page, page_size))
    }
}

/// Clamp a client request to `page >= 1` and `1 <= limit <= max`.
pub fn clamp_request(
    page: Option<i64>,
    limit: Option<i64>,
    default_limit: usize,
    max_limit: usize,
) -> (usize, usize) {
    let max_limit = max_limit.max(1);
    let page = page.unwrap_or(1).max(1) as usize;
    let limit = match limit {
        Some(l) => l.clamp(1, max_limit as i64) as usize,
        None => default_limit.clamp(1, max_limit),
    };
    (page, limit)
}

pub fn paginate(doc: &ArticleCacheDocument, page: usize, page_size: usize) -> PageResponse {
    let total = doc.len();
    let total_pages = if page_size == 0 {
        1
    } else {
        total.div_ceil(page_size)
    };
    let offset = page.saturating_sub(1).saturating_mul(page_size);

    let items = doc
        .newest_first()
        .into_iter()
        .skip(offset)
        .take(page_size)
        .cloned()
        .collect();

    PageResponse {
        generated_at: doc.generated_at.clone(),
        last_modified: doc.last_modified.clone(),
        page,
        page_size,
        total,
        total_pages,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(n: i64) -> ArticleCacheDocument {
        let mut doc = ArticleCacheDocument::default();
        for id in 0..n {
            doc.upsert(ArticleRecord {
                id,
                title: format!("Post {}", id),
                slug: format!("post-{}", id),
                intro: String::new(),
                image: None,
                created: format!("2024-01-{:02} 00:00:00", id + 1),
                modified: format!("2024-01-{:02} 00:00:00", id + 1),
                author: "Editorial".into(),
            });
        }
        doc
    }

    #[test]
    fn test_second_page_of_five_over_twelve() {
        let doc = doc_with(12);
        let resp = paginate(&doc, 2, 5);

        assert_eq!(resp.total, 12);
        assert_eq!(resp.total_pages, 3);
        assert_eq!(resp.page, 2);
        assert_eq!(resp.page_size, 5);

        let expected: Vec<i64> = doc.newest_first()[5..10].iter().map(|a| a.id).collect();
        let got: Vec<i64> = resp.items.iter().map(|a| a.id).collect();
        assert_eq!(got, expected);
        // Newest-first: ids 11..0, so the second page is 6..2.
        assert_eq!(got, vec![6, 5, 4, 3, 2]);
    }

    #[test]
    fn test_last_partial_page_and_past_the_end() {
        let doc = doc_with(12);
        assert_eq!(paginate(&doc, 3, 5).items.len(), 2);
        assert!(paginate(&doc, 4, 5).items.is_empty());
    }

    #[test]
    fn test_empty_cache() {
        let resp = paginate(&ArticleCacheDocument::default(), 1, 5);
        assert_eq!(resp.total, 0);
        assert_eq!(resp.total_pages, 0);
        assert!(resp.items.is_empty());
    }

    #[test]
    fn test_clamp_request() {
        assert_eq!(clamp_request(None, None, 6, 20), (1, 6));
        assert_eq!(clamp_request(Some(0), Some(0), 6, 20), (1, 1));
        assert_eq!(clamp_request(Some(-3), Some(500), 6, 20), (1, 20));
        assert_eq!(clamp_request(Some(4), Some(7), 6, 20), (4, 7));
    }

    #[test]
    fn test_envelope_field_names() {
        let json = serde_json::to_value(paginate(&doc_with(1), 1, 5)).unwrap();
        for key in [
            "generated_at",
            "last_modified",
            "page",
            "pageSize",
            "total",
            "totalPages",
            "items",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
