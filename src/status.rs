//! Cache statistics.
//!
//! Summarizes the persisted document and the image directory without running
//! a sync, so it is safe to call while the content store is unreachable.

use anyhow::Result;

use crate::cache::ArticleCache;
use crate::config::Config;

/// Snapshot of the cache on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatus {
    pub articles: usize,
    pub with_image: usize,
    pub generated_at: Option<String>,
    pub last_modified: Option<String>,
    pub image_files: usize,
    pub image_bytes: u64,
}

pub async fn collect_status(config: &Config) -> Result<CacheStatus> {
    let doc = ArticleCache::new(config.cache.document.clone()).load().await;

    let mut image_files = 0usize;
    let mut image_bytes = 0u64;
    if let Ok(entries) = std::fs::read_dir(&config.cache.image_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            // Derivatives only; skip in-flight temp files.
            if !name.to_string_lossy().starts_with('a') {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if meta.is_file() {
                    image_files += 1;
                    image_bytes += meta.len();
                }
            }
        }
    }

    Ok(CacheStatus {
        articles: doc.len(),
        with_image: doc.articles.values().filter(|a| a.image.is_some()).count(),
        generated_at: doc.generated_at,
        last_modified: doc.last_modified,
        image_files,
        image_bytes,
    })
}

/// Run the status command: print a summary of the cache.
pub async fn run_status(config: &Config) -> Result<()> {
    let status = collect_status(config).await?;

    println!("Folio — Blog Cache Status");
    println!("=========================");
    println!();
    println!("  Document:      {}", config.cache.document.display());
    println!(
        "  Generated at:  {}",
        status.generated_at.as_deref().unwrap_or("(never)")
    );
    println!(
        "  Last modified: {}",
        status.last_modified.as_deref().unwrap_or("(never synced)")
    );
    println!();
    println!("  Articles:      {}", status.articles);
    println!("  With image:    {}", status.with_image);
    println!();
    println!("  Image dir:     {}", config.cache.image_dir.display());
    println!(
        "  Derivatives:   {} ({})",
        status.image_files,
        format_bytes(status.image_bytes)
    );

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
