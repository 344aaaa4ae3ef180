//! # Folio
//!
//! Incremental blog cache and image derivative pipeline for a portfolio site.
//!
//! Folio reads published articles of one category from a CMS content store,
//! keeps a compact JSON cache of display-ready records, and downloads each
//! article's intro image once, cover-cropping it to a fixed size. A small
//! HTTP server syncs on every read and pages through the cache newest-first.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Content    │──▶│ SyncEngine  │──▶│ ArticleCache │
//! │  (SQLite)   │   │ cursor+merge│   │   (JSON)     │
//! └─────────────┘   └──────┬──────┘   └──────┬───────┘
//!                          │                 │
//!                          ▼                 ▼
//!                  ┌──────────────┐    ┌──────────┐
//!                  │ ImageCache   │    │PageServer│
//!                  │ fetch+derive │    │ /api/blog│
//!                  └──────────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! folio init                    # create the content schema
//! folio sync                    # incremental pass
//! folio page --page 2 --limit 5
//! folio serve                   # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Source rows, article records, cache document |
//! | [`cache`] | Atomic load/save of the cache document |
//! | [`source`] | Content store queries (SQLite and in-memory) |
//! | [`intro`] | Plain-text intro excerpts |
//! | [`derive`] | Cover-crop resizing of images |
//! | [`images`] | Content-addressed image cache |
//! | [`sync`] | Incremental sync engine |
//! | [`page`] | Paginated reads |
//! | [`server`] | HTTP server |
//! | [`status`] | Cache statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod config;
pub mod db;
pub mod derive;
pub mod images;
pub mod intro;
pub mod migrate;
pub mod models;
pub mod page;
pub mod server;
pub mod source;
pub mod status;
pub mod sync;
