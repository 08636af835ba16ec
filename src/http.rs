//! REST API over the application context.
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/health` | liveness |
//! | POST | `/ingest` | `{ "paths": [...] }` |
//! | GET | `/search?q&k&order` | ranked search |
//! | POST | `/chat` | `{ "query", "top_k", "order" }` |
//! | GET | `/preview?path&nchars` | leading document text |
//! | GET | `/stats` | collection statistics |
//! | GET | `/files?pattern&limit` | indexed files, newest first |
//! | POST | `/delete` | `{ "path" }` |
//! | POST | `/reset` | drop every record |
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::app::{AppContext, FileFilter};
use crate::error::RagError;
use crate::rag::RankOrder;

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps operation failures onto status codes: bad input → 400, model or
/// embedding failure → 502, anything else → 500.
struct ApiError(RagError);

impl From<RagError> for ApiError {
    fn from(e: RagError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else if self.0.is_model_error() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status != StatusCode::BAD_REQUEST {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============ Request bodies ============

#[derive(Deserialize)]
struct IngestRequest {
    paths: Vec<String>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    k: Option<usize>,
    order: Option<String>,
}

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
    top_k: Option<usize>,
    order: Option<String>,
}

#[derive(Deserialize)]
struct PreviewQuery {
    path: String,
    nchars: Option<usize>,
}

#[derive(Deserialize)]
struct DeleteRequest {
    path: String,
}

// ============ Handlers ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_ingest(
    State(ctx): State<AppContext>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<crate::indexer::IngestStats> {
    Ok(Json(ctx.ingest(&req.paths).await?))
}

async fn handle_search(
    State(ctx): State<AppContext>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<crate::rag::SearchResponse> {
    let order = RankOrder::parse_or_default(q.order.as_deref())?;
    Ok(Json(ctx.search(&q.q, q.k, order).await?))
}

async fn handle_chat(
    State(ctx): State<AppContext>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<crate::rag::ChatResponse> {
    let order = RankOrder::parse_or_default(req.order.as_deref())?;
    Ok(Json(ctx.chat(&req.query, req.top_k, order).await?))
}

async fn handle_preview(
    State(ctx): State<AppContext>,
    Query(q): Query<PreviewQuery>,
) -> ApiResult<crate::app::Preview> {
    Ok(Json(ctx.preview(&q.path, q.nchars).await?))
}

async fn handle_stats(State(ctx): State<AppContext>) -> ApiResult<crate::app::IndexStats> {
    Ok(Json(ctx.stats().await?))
}

async fn handle_files(
    State(ctx): State<AppContext>,
    Query(filter): Query<FileFilter>,
) -> ApiResult<serde_json::Value> {
    let files = ctx.list_files(&filter).await?;
    Ok(Json(json!({ "files": files })))
}

async fn handle_delete(
    State(ctx): State<AppContext>,
    Json(req): Json<DeleteRequest>,
) -> ApiResult<serde_json::Value> {
    let removed = ctx.delete(&req.path).await?;
    Ok(Json(json!({ "path": req.path, "removed": removed })))
}

async fn handle_reset(State(ctx): State<AppContext>) -> ApiResult<serde_json::Value> {
    let deleted = ctx.reset().await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// All routes with permissive CORS, bound to `ctx`.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/search", get(handle_search))
        .route("/chat", post(handle_chat))
        .route("/preview", get(handle_preview))
        .route("/stats", get(handle_stats))
        .route("/files", get(handle_files))
        .route("/delete", post(handle_delete))
        .route("/reset", post(handle_reset))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down REST API");
}

/// Serve the REST API on `bind` until Ctrl-C.
pub async fn serve(ctx: AppContext, bind: &str) -> anyhow::Result<()> {
    let app = router(ctx);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
