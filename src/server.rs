//! JSON HTTP API.
//!
//! Exposes the retrieval engine to a web front end or an answer-generation
//! service. The generator itself is not called; `/api/ask` returns the
//! retrieved context, its sources and the rendered prompt.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/search` | `{query, top_k?}` → ranked chunks |
//! | `POST` | `/api/ask` | `{query}` → context, sources, prompt |
//! | `POST` | `/api/index/build` | `{dir?}` → chunk `docs_dir` (or a subdirectory) and rebuild |
//! | `POST` | `/api/docs/upload` | multipart files → saved to `docs_dir`, chunked, index rebuilt |
//! | `POST` | `/api/docs/summarize` | `{filenames}` → extractive summaries |
//!
//! Every client-supplied path is resolved inside `[server].docs_dir`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "top_k must be at least 1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `provider_error` (502),
//! `index_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! Origins come from `[server].allowed_origins` (local development ports by
//! default; `"*"` allows any). Methods and headers are not restricted.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::atomic::write_atomic;
use crate::config::Config;
use crate::documents::{resolve_in_dir, Document, DocumentFilter};
use crate::error::RagError;
use crate::models::{SearchResult, Source};
use crate::retrieval::render_prompt;
use crate::service::RagService;
use crate::summarize::{summarize_file, Summary, DEFAULT_MAX_SENTENCES};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    service: Arc<RagService>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let service = Arc::new(RagService::new(config.clone())?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        addr = %bind_addr,
        data_dir = %config.data.dir.display(),
        provider = %service.provider().provider_key(),
        "server listening"
    );
    axum::serve(listener, router(service)).await?;

    Ok(())
}

/// Build the application router over an existing service.
pub fn router(service: Arc<RagService>) -> Router {
    let server = &service.config().server;
    let cors = cors_layer(&server.allowed_origins);
    let body_limit = DefaultBodyLimit::max(server.max_upload_bytes);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/search", post(handle_search))
        .route("/api/ask", post(handle_ask))
        .route("/api/index/build", post(handle_build))
        .route("/api/docs/upload", post(handle_upload))
        .route("/api/docs/summarize", post(handle_summarize))
        .layer(body_limit)
        .layer(cors)
        .with_state(AppState { service })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::RetrievalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Provider(_) => StatusCode::BAD_GATEWAY,
            RagError::Io { .. }
            | RagError::Serialization { .. }
            | RagError::Corrupt { .. }
            | RagError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
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

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let top_k = req
        .top_k
        .unwrap_or(state.service.config().retrieval.search_k);
    let results = state.service.search(&req.query, top_k).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /api/ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
}

#[derive(Serialize)]
struct AskResponse {
    query: String,
    context: String,
    sources: Vec<Source>,
    prompt: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let answer = state.service.answer_context(&req.query).await?;
    let prompt = render_prompt(&req.query, &answer.context);
    Ok(Json(AskResponse {
        query: req.query,
        context: answer.context,
        sources: answer.sources,
        prompt,
    }))
}

// ============ POST /api/index/build ============

#[derive(Deserialize, Default)]
struct BuildRequest {
    /// Subdirectory of `docs_dir`; the whole of `docs_dir` when absent.
    #[serde(default)]
    dir: Option<String>,
}

#[derive(Serialize)]
struct BuildResponse {
    vectors: usize,
    provider: String,
}

async fn handle_build(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BuildResponse>, AppError> {
    let req: BuildRequest = if body.iter().all(u8::is_ascii_whitespace) {
        BuildRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {}", e)))?
    };
    let docs_dir = &state.service.config().server.docs_dir;
    let dir = match req.dir.as_deref() {
        Some(sub) => resolve_in_dir(docs_dir, sub)?,
        None => docs_dir.clone(),
    };
    let vectors = state.service.build_index(&dir).await?;
    Ok(Json(BuildResponse {
        vectors,
        provider: state.service.provider().provider_key(),
    }))
}

// ============ POST /api/docs/upload ============

#[derive(Serialize)]
struct UploadedFile {
    filename: String,
    size: usize,
}

#[derive(Serialize)]
struct UploadResponse {
    uploaded: Vec<UploadedFile>,
    chunks: usize,
}

/// Save each multipart file field under `docs_dir`, then chunk the ones the
/// document filter accepts into the corpus and rebuild the index.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let config = state.service.config();
    let docs_dir = &config.server.docs_dir;
    let filter = DocumentFilter::new(&config.chunking)?;

    let mut uploaded = Vec::new();
    let mut docs = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let path = resolve_in_dir(docs_dir, &filename)?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read {}: {}", filename, e)))?;

        write_atomic(&path, &bytes)?;
        tracing::info!(file = %filename, size = bytes.len(), "saved upload");
        uploaded.push(UploadedFile {
            filename: filename.clone(),
            size: bytes.len(),
        });

        if filter.accepts(&filename) {
            docs.extend(Document::from_bytes(filename, &path, bytes.to_vec()));
        }
    }

    if uploaded.is_empty() {
        return Err(bad_request("no files in upload"));
    }

    let chunks = if docs.is_empty() {
        0
    } else {
        state.service.add_documents(&docs).await?
    };
    Ok(Json(UploadResponse { uploaded, chunks }))
}

// ============ POST /api/docs/summarize ============

#[derive(Deserialize)]
struct SummarizeRequest {
    filenames: Vec<String>,
}

#[derive(Serialize)]
struct SummarizeResponse {
    summaries: Vec<Summary>,
}

async fn handle_summarize(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, AppError> {
    let docs_dir = &state.service.config().server.docs_dir;
    let mut summaries = Vec::with_capacity(req.filenames.len());

    for filename in req.filenames {
        let path = resolve_in_dir(docs_dir, &filename)?;
        if !path.is_file() {
            return Err(not_found(format!("{} not found", filename)));
        }
        let summary = summarize_file(&path, DEFAULT_MAX_SENTENCES)?;
        summaries.push(Summary { filename, summary });
    }

    Ok(Json(SummarizeResponse { summaries }))
}
