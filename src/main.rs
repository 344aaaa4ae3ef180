//! # Folio CLI (`folio`)
//!
//! The `folio` binary drives the blog cache: it creates the content schema,
//! runs sync passes, prints pages of the cache, and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio init` | Create the content store schema |
//! | `folio sync` | Run one incremental sync pass |
//! | `folio sync --full` | Re-read every published row |
//! | `folio page` | Sync, then print a page of articles as JSON |
//! | `folio status` | Show cache statistics |
//! | `folio serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use folio::{config, migrate, page, server, status, sync};

/// Folio CLI: incremental blog cache and image derivatives.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/folio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio — incremental blog cache and image derivative pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the content store and its schema.
    ///
    /// Idempotent. Intended for local development and tests; production
    /// content stores are owned by the CMS.
    Init,

    /// Run one sync pass against the content store.
    Sync {
        /// Query without the watermark. The watermark still never moves back.
        #[arg(long)]
        full: bool,
    },

    /// Sync, then print one page of the cache as JSON.
    Page {
        /// 1-based page number.
        #[arg(long)]
        page: Option<i64>,

        /// Page size, clamped to `[articles].max_page_size`.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show statistics about the cache document and image directory.
    Status,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg.source).await?;
            if let Some(parent) = cfg.cache.document.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::create_dir_all(&cfg.cache.image_dir)?;
            println!("Content store initialized successfully.");
        }
        Commands::Sync { full } => {
            let engine = sync::SyncEngine::from_config(&cfg)?;
            let outcome = engine.run_pass(cfg.source.category, full).await?;

            println!("sync category {}", cfg.source.category);
            println!(
                "  cursor: {}",
                outcome.previous_cursor.as_deref().unwrap_or("(none)")
            );
            println!("  fetched: {}", outcome.fetched);
            println!("  with image: {}", outcome.with_image);
            println!("  cached total: {}", outcome.document.len());
            println!(
                "  last_modified: {}",
                outcome.document.last_modified.as_deref().unwrap_or("(none)")
            );
            println!("ok");
        }
        Commands::Page { page, limit } => {
            let engine = Arc::new(sync::SyncEngine::from_config(&cfg)?);
            let pages = page::PageServer::new(engine, &cfg);
            let response = pages.handle(page, limit).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
