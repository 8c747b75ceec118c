use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hybrid_core::corpus::load_corpus;
use hybrid_core::{CachePaths, DocId, Document, HybridSearch, SearchContext, SearchError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct WeightedParams {
    pub q: String,
    pub alpha: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct RrfParams {
    pub q: String,
    pub k: Option<u32>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse<T> {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<T>,
}

impl<T> SearchResponse<T> {
    fn new(query: String, start: Instant, results: Vec<T>) -> Json<Self> {
        Json(Self { query, took_s: start.elapsed().as_secs_f64(), total_hits: results.len(), results })
    }
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub documents: usize,
    pub terms: usize,
    pub chunks: usize,
    pub rejected: usize,
}

/// Search failures rendered as `{"error": ...}` with a status that matches the cause.
pub struct ApiError(SearchError);

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SearchError::InvalidQuery(_) | SearchError::InvalidConfig(_) | SearchError::EmptyInput => {
                StatusCode::BAD_REQUEST
            }
            SearchError::UnknownDocument(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<RwLock<Arc<HybridSearch>>>,
    pub ctx: SearchContext,
    pub cache: CachePaths,
    pub corpus: PathBuf,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Snapshot of the live index; the lock is released before the caller searches.
    fn current(&self) -> Arc<HybridSearch> {
        Arc::clone(&*self.search.read())
    }
}

fn load_documents(corpus: &std::path::Path) -> hybrid_core::Result<(Vec<Document>, usize)> {
    let corpus = load_corpus(corpus)?;
    Ok((corpus.documents, corpus.issues.len()))
}

/// Open the persisted indexes, building and saving them first when the cache is unusable.
pub fn open_search(ctx: &SearchContext, cache: &CachePaths, corpus: &std::path::Path) -> hybrid_core::Result<HybridSearch> {
    let (documents, _) = load_documents(corpus)?;
    match HybridSearch::load(ctx, cache, &documents) {
        Ok(search) => Ok(search),
        Err(e) if e.is_stale_cache() => {
            tracing::warn!(reason = %e, "index cache unusable, rebuilding");
            let search = HybridSearch::build(ctx, &documents)?;
            search.save(cache)?;
            Ok(search)
        }
        Err(e) => Err(e),
    }
}

pub fn build_app(ctx: SearchContext, cache: CachePaths, corpus: PathBuf) -> Result<Router> {
    let search = open_search(&ctx, &cache, &corpus)?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let app_state = AppState {
        search: Arc::new(RwLock::new(Arc::new(search))),
        ctx,
        cache,
        corpus,
        admin_token,
    };
    Ok(router(app_state))
}

pub fn router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/semantic", get(semantic_handler))
        .route("/hybrid/weighted", get(weighted_handler))
        .route("/hybrid/rrf", get(rrf_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/reload", post(reload_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse<hybrid_core::LexicalHit>>, ApiError> {
    let start = Instant::now();
    let limit = params.limit.unwrap_or(state.ctx.config().limit);
    let results = state.current().search(&params.q, limit)?;
    Ok(SearchResponse::new(params.q, start, results))
}

pub async fn semantic_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse<hybrid_core::SemanticHit>>, ApiError> {
    let start = Instant::now();
    let limit = params.limit.unwrap_or(state.ctx.config().limit);
    let results = state.current().semantic_search(&params.q, limit)?;
    Ok(SearchResponse::new(params.q, start, results))
}

pub async fn weighted_handler(
    State(state): State<AppState>,
    Query(params): Query<WeightedParams>,
) -> Result<Json<SearchResponse<hybrid_core::HybridHit<hybrid_core::WeightedScore>>>, ApiError> {
    let start = Instant::now();
    let config = state.ctx.config();
    let alpha = params.alpha.unwrap_or(config.alpha);
    let limit = params.limit.unwrap_or(config.limit);
    let results = state.current().weighted_search(&params.q, alpha, limit)?;
    Ok(SearchResponse::new(params.q, start, results))
}

pub async fn rrf_handler(
    State(state): State<AppState>,
    Query(params): Query<RrfParams>,
) -> Result<Json<SearchResponse<hybrid_core::HybridHit<hybrid_core::RrfScore>>>, ApiError> {
    let start = Instant::now();
    let config = state.ctx.config();
    let k = params.k.unwrap_or(config.rrf_k);
    let limit = params.limit.unwrap_or(config.limit);
    let results = state.current().rrf_search(&params.q, limit, k)?;
    Ok(SearchResponse::new(params.q, start, results))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    match state.current().document(doc_id) {
        Some(doc) => Ok(Json(doc.clone())),
        None => Err(SearchError::UnknownDocument(doc_id).into()),
    }
}

/// Load freshly persisted caches into new structures and swap them in. Searches keep using
/// the previous snapshot until the swap; a failed load leaves it in place.
async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<ReloadResponse>, Response> {
    authorize(&state, &headers).map_err(IntoResponse::into_response)?;
    let worker = state.clone();
    let loaded = tokio::task::spawn_blocking(move || -> hybrid_core::Result<(HybridSearch, usize)> {
        let (documents, rejected) = load_documents(&worker.corpus)?;
        let search = HybridSearch::load(&worker.ctx, &worker.cache, &documents)?;
        Ok((search, rejected))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("reload task failed: {e}")).into_response())?;
    let (search, rejected) = loaded.map_err(|e| {
        tracing::warn!(error = %e, "reload failed, keeping current index");
        ApiError(e).into_response()
    })?;

    let response = ReloadResponse {
        documents: search.lexical().num_docs(),
        terms: search.lexical().num_terms(),
        chunks: search.semantic().num_chunks(),
        rejected,
    };
    *state.search.write() = Arc::new(search);
    tracing::info!(documents = response.documents, chunks = response.chunks, "index reloaded");
    Ok(Json(response))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
