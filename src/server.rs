//! HTTP API server.
//!
//! Exposes upload, document management, retrieval, and chat as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/upload/` | Multipart upload, field `file` |
//! | `GET`    | `/documents/` | List documents, newest first |
//! | `GET`    | `/documents/{id}/` | Document with its chunks |
//! | `DELETE` | `/documents/{id}/delete/` | Delete a document |
//! | `POST`   | `/chat/` | Answer a question from the documents |
//! | `POST`   | `/search/` | Retrieval only, no generation |
//!
//! # Error Contract
//!
//! Errors are a flat JSON object:
//!
//! ```json
//! { "error": "Empty message" }
//! ```
//!
//! A chat request that fails unexpectedly also carries an `answer` field so
//! chat clients can display something.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! served from another origin can call the API.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::{self, ChatError, ChatRequest};
use crate::config::Config;
use crate::db;
use crate::documents::{self, DocumentDetail, DocumentSummary};
use crate::ingest::{self, IngestOutcome};
use crate::migrate;
use crate::models::RetrievedChunk;
use crate::retrieve;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Starts the HTTP server.
///
/// Opens the database (applying migrations), binds to `[server].bind`, and
/// serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let bind_addr = config.server.bind.clone();
    let app = router(Arc::new(config.clone()), pool);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server started");
    println!("docqa server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router.
pub fn router(config: Arc<Config>, pool: SqlitePool) -> Router {
    let body_limit = config.server.max_upload_mb.saturating_mul(1024 * 1024);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState { config, pool };

    Router::new()
        .route("/health", get(handle_health))
        .route("/upload/", post(handle_upload))
        .route("/documents/", get(handle_list_documents))
        .route("/documents/{id}/", get(handle_get_document))
        .route("/documents/{id}/delete/", delete(handle_delete_document))
        .route("/chat/", post(handle_chat))
        .route("/search/", post(handle_search))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
    answer: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            answer: self.answer,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
        answer: None,
    }
}

fn not_found() -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: "Not found".to_string(),
        answer: None,
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
        answer: None,
    }
}

/// Parse a JSON request body, reporting syntax and type errors as 400.
fn parse_json<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("Invalid JSON: {}", e)))
}

/// Document ids in paths are integers; anything else names no document.
fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>().map_err(|_| not_found())
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

// ============ POST /upload/ ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestOutcome>, AppError> {
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Invalid upload: {}", e)))?;
        upload = Some((name, bytes));
        break;
    }

    let (name, bytes) = upload.ok_or_else(|| bad_request("No file provided"))?;

    match ingest::ingest_file(&state.config, &state.pool, &name, &bytes).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) if e.is_client_error() => Err(bad_request(e.to_string())),
        Err(e) => Err(internal(e.to_string())),
    }
}

// ============ /documents/ ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = documents::list_documents(&state.pool)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(DocumentListResponse { documents }))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentDetail>, AppError> {
    let id = parse_id(&id)?;
    documents::get_document(&state.pool, id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .map(Json)
        .ok_or_else(not_found)
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_id(&id)?;
    let deleted = documents::delete_document(&state.config, &state.pool, id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    if !deleted {
        return Err(not_found());
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

// ============ POST /chat/ ============

async fn handle_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<chat::ChatResponse>, AppError> {
    let request: ChatRequest = parse_json(&body)?;

    match chat::answer(&state.config, &state.pool, request).await {
        Ok(response) => Ok(Json(response)),
        Err(ChatError::Failed(e)) => {
            tracing::error!(error = %e, "chat failed");
            Err(AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("Error processing chat: {}", e),
                answer: Some(format!("Sorry, I encountered an error: {}", e)),
            })
        }
        Err(e) => Err(bad_request(e.to_string())),
    }
}

// ============ POST /search/ ============

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    document_ids: Vec<i64>,
    #[serde(default, deserialize_with = "chat::lenient_k")]
    k: Option<i64>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievedChunk>,
    chunks_searched: usize,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SearchResponse>, AppError> {
    let request: SearchRequest = parse_json(&body)?;

    let query = request.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let k = match request.k {
        None => state.config.retrieval.top_k,
        Some(k) if k < 1 => return Err(bad_request(format!("k must be >= 1 (got {})", k))),
        Some(k) => (k as usize).min(state.config.retrieval.max_k),
    };

    let retrieval = retrieve::retrieve(&state.config, &state.pool, query, &request.document_ids, k)
        .await
        .map_err(|e| internal(format!("Error processing search: {}", e)))?;

    Ok(Json(SearchResponse {
        results: retrieval.hits,
        chunks_searched: retrieval.chunks_searched,
    }))
}
