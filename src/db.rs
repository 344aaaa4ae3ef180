use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::SourceConfig;

/// Connect to an existing content store. A missing database is an error.
pub async fn connect(source: &SourceConfig) -> Result<SqlitePool> {
    open(source, false)
        .await
        .with_context(|| format!("Failed to open content store: {}", source.path.display()))
}

/// Connect to the content store, creating the database file if needed.
pub async fn connect_or_create(source: &SourceConfig) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = source.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    open(source, true).await
}

async fn open(source: &SourceConfig, create: bool) -> Result<SqlitePool> {
    let timeout = Duration::from_secs(source.query_timeout_secs);

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", source.path.display()))?
        .create_if_missing(create)
        .busy_timeout(timeout)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(timeout)
        .connect_with(options)
        .await?;

    Ok(pool)
}
