//! Tool-call HTTP server.
//!
//! Exposes the engine to external front-ends as a JSON API. Every
//! operation takes a structured argument and returns a structured result;
//! failures come back as a typed error code in the body, never a raw 500
//! with a stack trace.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/tools/upload_file` | Store a file under the documents root and index it |
//! | `POST` | `/tools/list_files` | List indexed documents with paging |
//! | `POST` | `/tools/search_documents` | Query the index (semantic, keyword, hybrid) |
//! | `GET`  | `/tools/get_server_status` | Uptime, counts, loaded models |
//! | `POST` | `/tools/force_reindex` | Truncate and rebuild from the documents root |
//! | `GET`  | `/health` | Liveness probe |
//!
//! CORS is wide open: browser-based clients and cross-origin tool calls
//! are expected consumers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Component;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::RagError;
use crate::models::{DocumentMetadata, SearchHit, SearchMode};
use crate::rag::RagEngine;

/// Shared state for all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<RagEngine>,
}

/// Run the tool-call server until the process is terminated.
pub async fn run_server(engine: Arc<RagEngine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().bind.clone();
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tools/upload_file", post(handle_upload_file))
        .route("/tools/list_files", post(handle_list_files))
        .route("/tools/search_documents", post(handle_search_documents))
        .route("/tools/get_server_status", get(handle_server_status))
        .route("/tools/force_reindex", post(handle_force_reindex))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("tool-call server listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error contract ============

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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            RagError::Initialization(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_initialized"),
            RagError::FileProcessing { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "file_error"),
            RagError::VectorStore(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            RagError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_error"),
            RagError::Search(_) => (StatusCode::INTERNAL_SERVER_ERROR, "search_error"),
            RagError::Cancelled => (StatusCode::CONFLICT, "cancelled"),
            RagError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "validation_error",
        message: message.into(),
    }
}

// ============ POST /tools/upload_file ============

#[derive(Deserialize)]
struct UploadFileRequest {
    /// File bytes, base64-encoded.
    content: String,
    file_name: String,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
    message: String,
}

async fn handle_upload_file(
    State(state): State<AppState>,
    Json(req): Json<UploadFileRequest>,
) -> Result<Json<OkResponse>, AppError> {
    if req.file_name.trim().is_empty() {
        return Err(bad_request("file_name must not be empty"));
    }
    // Keep uploads inside the documents root.
    let name_path = std::path::Path::new(&req.file_name);
    if name_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(bad_request("file_name must be a plain file name"));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content.as_bytes())
        .map_err(|e| bad_request(format!("content is not valid base64: {e}")))?;

    let target = state.engine.config().documents_dir.join(&req.file_name);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::from(RagError::VectorStore(e.to_string())))?;
    }
    tokio::fs::write(&target, &bytes)
        .await
        .map_err(|e| AppError::from(RagError::VectorStore(e.to_string())))?;

    state.engine.process_path(&target, false).await?;

    Ok(Json(OkResponse {
        ok: true,
        message: format!("indexed {}", req.file_name),
    }))
}

// ============ POST /tools/list_files ============

#[derive(Deserialize, Default)]
struct ListFilesRequest {
    /// Filter by extension, without the dot (e.g. `"pdf"`).
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

#[derive(Serialize)]
struct FileEntry {
    doc_id: String,
    name: String,
    path: String,
    #[serde(rename = "type")]
    file_type: String,
    size: u64,
    uploaded_at: String,
}

#[derive(Serialize)]
struct ListFilesResponse {
    files: Vec<FileEntry>,
    total: usize,
}

async fn handle_list_files(
    State(state): State<AppState>,
    Json(req): Json<ListFilesRequest>,
) -> Result<Json<ListFilesResponse>, AppError> {
    let docs = state.engine.list_documents().await?;

    let mut entries: Vec<FileEntry> = docs
        .into_iter()
        .filter_map(|(doc_id, json)| {
            let meta = DocumentMetadata::from_json(&json)?;
            let ext = std::path::Path::new(&meta.file_name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            Some(FileEntry {
                doc_id,
                name: meta.file_name,
                path: meta.file_path,
                file_type: ext,
                size: meta.file_size,
                uploaded_at: meta.indexed_at.to_rfc3339(),
            })
        })
        .collect();

    if let Some(ref wanted) = req.file_type {
        let wanted = wanted.trim_start_matches('.').to_lowercase();
        entries.retain(|e| e.file_type == wanted);
    }

    // Newest first, path as the tiebreak, so paging is stable.
    entries.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(a.path.cmp(&b.path)));

    let total = entries.len();
    let offset = req.offset.unwrap_or(0).min(total);
    let limit = req.limit.unwrap_or(total);
    let files = entries.into_iter().skip(offset).take(limit).collect();

    Ok(Json(ListFilesResponse { files, total }))
}

// ============ POST /tools/search_documents ============

#[derive(Deserialize)]
struct SearchDocumentsRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    /// Semantic-only when true and `hybrid` is not set.
    #[serde(default)]
    semantic: Option<bool>,
    #[serde(default)]
    hybrid: Option<bool>,
    /// Hybrid fusion weight for the semantic sublist, in [0, 1].
    #[serde(default)]
    semantic_weight: Option<f32>,
    /// Restrict results to these extensions (without the dot).
    #[serde(default)]
    file_types: Option<Vec<String>>,
}

#[derive(Serialize)]
struct SearchDocumentsResponse {
    results: Vec<SearchHit>,
    total: usize,
}

async fn handle_search_documents(
    State(state): State<AppState>,
    Json(req): Json<SearchDocumentsRequest>,
) -> Result<Json<SearchDocumentsResponse>, AppError> {
    let hits = if req.hybrid.unwrap_or(false) || req.semantic_weight.is_some() {
        state
            .engine
            .search_weighted(&req.query, req.top_k, req.semantic_weight.unwrap_or(0.5))
            .await?
    } else {
        let mode = match req.semantic {
            Some(false) => SearchMode::Keyword,
            _ => SearchMode::Semantic,
        };
        state.engine.search(&req.query, req.top_k, mode).await?
    };

    let hits: Vec<SearchHit> = match req.file_types {
        Some(ref types) if !types.is_empty() => {
            let wanted: Vec<String> = types
                .iter()
                .map(|t| t.trim_start_matches('.').to_lowercase())
                .collect();
            hits.into_iter()
                .filter(|hit| {
                    hit.metadata
                        .as_ref()
                        .and_then(|m| {
                            std::path::Path::new(&m.file_name)
                                .extension()
                                .map(|e| e.to_string_lossy().to_lowercase())
                        })
                        .map(|ext| wanted.contains(&ext))
                        .unwrap_or(false)
                })
                .collect()
        }
        _ => hits,
    };

    let total = hits.len();
    Ok(Json(SearchDocumentsResponse {
        results: hits,
        total,
    }))
}

// ============ GET /tools/get_server_status ============

#[derive(Serialize)]
struct ServerStatusResponse {
    status: String,
    uptime_s: u64,
    documents_count: usize,
    chunks_count: usize,
    models_loaded: Vec<String>,
}

async fn handle_server_status(
    State(state): State<AppState>,
) -> Result<Json<ServerStatusResponse>, AppError> {
    let info = state.engine.info().await;
    Ok(Json(ServerStatusResponse {
        status: if info.healthy { "ok" } else { "degraded" }.to_string(),
        uptime_s: info.uptime_s,
        documents_count: info.documents_count,
        chunks_count: info.chunks_count,
        models_loaded: vec![info.model_name],
    }))
}

// ============ POST /tools/force_reindex ============

#[derive(Deserialize, Default)]
struct ForceReindexRequest {
    #[serde(default)]
    clear_cache: Option<bool>,
}

async fn handle_force_reindex(
    State(state): State<AppState>,
    Json(req): Json<ForceReindexRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let report = state
        .engine
        .reindex(req.clear_cache.unwrap_or(false))
        .await?;
    Ok(Json(OkResponse {
        ok: true,
        message: format!(
            "reindexed: {} indexed, {} failed, {} removed",
            report.indexed, report.failed, report.removed
        ),
    }))
}

// ============ GET /health ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
