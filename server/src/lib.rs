use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use fitsearch_core::{Document, Engine, RawContent, SearchHit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod queue;

use queue::{IngestJob, IngestOutcome, IngestQueue, QueueError};

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
    /// Comma-separated tag filter
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub num_docs: usize,
    pub num_terms: usize,
    pub generation: u64,
}

#[derive(Serialize)]
pub struct BatchItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub indexed: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub queue: IngestQueue,
    pub admin_token: Option<String>,
}

/// Error body returned by every route: `{ "error": "..." }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<fitsearch_core::Error> for ApiError {
    fn from(err: fitsearch_core::Error) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_bad_request() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, err.to_string())
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Core(e) => e.into(),
            QueueError::Closed => Self::new(StatusCode::SERVICE_UNAVAILABLE, QueueError::Closed.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/stats", get(stats_handler))
        .route("/index/batch", post(index_batch))
        .route("/index/commit", post(index_commit))
        .route("/index/:doc_id", delete(index_remove))
        .route("/cache/clear", post(cache_clear))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// CORS from CORS_ALLOW_ORIGIN (comma-separated), allowing any origin by default.
fn cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = std::env::var("CORS_ALLOW_ORIGIN")
        .map(|val| val.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    let allow = if origins.is_empty() { AllowOrigin::any() } else { AllowOrigin::list(origins) };
    CorsLayer::new().allow_origin(allow).allow_methods(Any).allow_headers(Any)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let tags: Vec<String> = params
        .tags
        .as_deref()
        .map(|t| t.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let query = fitsearch_core::Query { text: params.q.clone(), tags };
    let k = params.k.unwrap_or_else(|| state.engine.search_engine().default_k());

    let results = state.engine.search_query(&query, k, params.refresh)?;

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse {
        query: params.q,
        took_ms: elapsed.as_millis(),
        took_s: elapsed.as_secs_f64(),
        total_hits: results.total_hits,
        results: results.hits,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(state.engine.get(&doc_id)?))
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let store = state.engine.store();
    Json(StatsResponse { num_docs: store.len(), num_terms: store.num_terms(), generation: store.generation() })
}

// --- Admin endpoints ---
async fn index_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(docs): Json<Vec<RawContent>>,
) -> Result<Json<BatchResponse>, ApiError> {
    authorize(&state, &headers)?;
    let mut items = Vec::with_capacity(docs.len());
    for raw in docs {
        let item = match state.queue.submit(IngestJob::Upsert(raw)).await {
            Ok(IngestOutcome::Indexed(id)) | Ok(IngestOutcome::Removed(id)) => BatchItem { id: Some(id), error: None },
            Err(QueueError::Closed) => return Err(QueueError::Closed.into()),
            Err(e) => BatchItem { id: None, error: Some(e.to_string()) },
        };
        items.push(item);
    }
    let indexed = items.iter().filter(|i| i.id.is_some()).count();
    let failed = items.len() - indexed;
    tracing::info!(indexed, failed, "batch ingested");
    Ok(Json(BatchResponse { indexed, failed, items }))
}

async fn index_remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    state.queue.submit(IngestJob::Remove(doc_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn index_commit(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<StatsResponse>, ApiError> {
    authorize(&state, &headers)?;
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || engine.flush())
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;
    Ok(stats_handler(State(state)).await)
}

async fn cache_clear(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    state.engine.clear_cache();
    Ok(Json(serde_json::json!({ "message": "cache cleared" })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::new(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}
