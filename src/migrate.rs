use anyhow::Result;

use crate::config::SourceConfig;
use crate::db;

/// Create the content-store schema. Idempotent.
///
/// In production the content store is owned by the CMS; this schema exists so
/// a local store can be stood up for development and tests.
pub async fn run_migrations(source: &SourceConfig) -> Result<()> {
    let pool = db::connect_or_create(source).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            images TEXT,
            category INTEGER NOT NULL,
            state INTEGER NOT NULL DEFAULT 0,
            created TEXT NOT NULL,
            modified TEXT,
            author_alias TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_category_state ON content(category, state, created DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_modified ON content(modified)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
