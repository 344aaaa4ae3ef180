//! HTTP server for the blog feed.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/blog?page=&limit=` | Sync, then return a page of articles |
//! | `GET`  | `<public_prefix>/<file>` | Cached image derivatives |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "internal", "message": "internal server error" } }
//! ```
//!
//! The real cause is logged, never returned, unless `server.expose_errors`
//! is enabled.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::page::{PageResponse, PageServer};
use crate::sync::SyncEngine;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pages: Arc<PageServer>,
    pub expose_errors: bool,
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(SyncEngine::from_config(config)?);
    let state = AppState {
        pages: Arc::new(PageServer::new(engine, config)),
        expose_errors: config.server.expose_errors,
    };

    std::fs::create_dir_all(&config.cache.image_dir)?;
    let app = build_router(state, &config.cache.image_dir, &config.cache.public_prefix);

    info!(bind = %config.server.bind, "blog server listening");
    println!("Folio server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState, image_dir: &Path, public_prefix: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/blog", get(handle_blog))
        .route("/health", get(handle_health))
        .nest_service(public_prefix.trim_end_matches('/'), ServeDir::new(image_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn internal_error(err: &anyhow::Error, expose: bool) -> AppError {
    error!(error = ?err, "blog request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: if expose {
            format!("{:#}", err)
        } else {
            "internal server error".to_string()
        },
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/blog ============

/// Raw query parameters. Non-numeric values fall back to defaults.
#[derive(Debug, Deserialize)]
struct BlogQuery {
    page: Option<String>,
    limit: Option<String>,
}

fn parse_int(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse::<i64>().ok())
}

async fn handle_blog(
    State(state): State<AppState>,
    Query(query): Query<BlogQuery>,
) -> Result<Json<PageResponse>, AppError> {
    let page = parse_int(query.page.as_deref());
    let limit = parse_int(query.limit.as_deref());

    // Detached so a client hanging up cannot abandon a pass halfway.
    let pages = Arc::clone(&state.pages);
    let pass = tokio::spawn(async move { pages.handle(page, limit).await });

    let result = match pass.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("blog sync task failed: {}", e)),
    };
    result
        .map(Json)
        .map_err(|e| internal_error(&e, state.expose_errors))
}
