//! Core data models used throughout Folio.
//!
//! [`SourceRow`] is what the content store hands back, [`ArticleRecord`] is
//! the derived entry kept in the cache, and [`ArticleCacheDocument`] is the
//! persisted document holding the merged set and its cursors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw row produced by a [`ContentSource`](crate::source::ContentSource).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub id: i64,
    pub title: String,
    pub slug: String,
    /// Long-form body, may contain markup.
    pub body: String,
    /// Structured image reference, a JSON object with an `image_intro` key.
    pub images: Option<String>,
    pub created: String,
    pub modified: Option<String>,
    pub author: Option<String>,
}

impl SourceRow {
    /// The row's modification time, or `None` for empty and zero dates.
    pub fn modified_at(&self) -> Option<&str> {
        self.modified.as_deref().filter(|m| !is_zero_date(m))
    }

    /// Watermark contribution of this row: `modified` when present, else `created`.
    pub fn watermark(&self) -> &str {
        self.modified_at().unwrap_or(self.created.as_str())
    }
}

fn is_zero_date(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.starts_with("0000-00-00")
}

/// Cached, display-ready article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub intro: String,
    pub image: Option<String>,
    pub created: String,
    pub modified: String,
    pub author: String,
}

/// The persisted cache document.
///
/// `articles` is keyed by id in memory so upserts cannot duplicate; on disk
/// it is written as a list in canonical newest-first order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleCacheDocument {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default, with = "article_list")]
    pub articles: BTreeMap<i64, ArticleRecord>,
}

impl ArticleCacheDocument {
    /// Insert or replace the record for `record.id`.
    pub fn upsert(&mut self, record: ArticleRecord) {
        self.articles.insert(record.id, record);
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Articles sorted by `created` descending, ties broken by id descending.
    pub fn newest_first(&self) -> Vec<&ArticleRecord> {
        let mut list: Vec<&ArticleRecord> = self.articles.values().collect();
        list.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        list
    }
}

mod article_list {
    use super::ArticleRecord;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<i64, ArticleRecord>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut list: Vec<&ArticleRecord> = map.values().collect();
        list.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<i64, ArticleRecord>, D::Error> {
        let list = Vec::<ArticleRecord>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|a| (a.id, a)).collect())
    }
}
