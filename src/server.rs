//! HTTP API for the PDF chat service.
//!
//! Exposes the upload, document-listing, and chat endpoints consumed by the
//! web UI. The query endpoint never surfaces engine failures as HTTP errors:
//! retrieval and model problems degrade to a fixed fallback answer inside a
//! normal response, matching the engine's contract.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Ask a question, creating or continuing a session |
//! | `GET`  | `/api/chat/{id}` | Full turn list of a session |
//! | `DELETE` | `/api/chat/{id}` | Delete a session |
//! | `GET`  | `/api/chats` | List sessions by ascending numeric id |
//! | `POST` | `/api/upload` | Upload a PDF into the corpus |
//! | `GET`  | `/api/documents` | List the corpus |
//! | `DELETE` | `/api/documents/{name}` | Remove a PDF from the corpus |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "chat not found: 007" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `payload_too_large`
//! (413), `capacity_exhausted` (507), `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Component;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chats::{canonical_id, ChatStore, ChatStoreError};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::engine::ChatEngine;
use crate::llm::create_chat_model;
use crate::loader;
use crate::models::{ChatTurn, SourceRef};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    engine: Arc<ChatEngine>,
    store: Arc<ChatStore>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let model = create_chat_model(&config.llm)?;

    let engine = Arc::new(ChatEngine::new(
        config.corpus.dir.clone(),
        &config.chunking,
        &config.retrieval,
        embedder,
        model,
    ));
    let store = Arc::new(ChatStore::new(config.chats.dir.clone())?);

    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        engine,
        store,
    };

    let app = build_router(state, config.server.max_upload_bytes);

    tracing::info!(addr = %bind_addr, "pdfchat server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/{id}", get(handle_get_chat).delete(handle_delete_chat))
        .route("/api/chats", get(handle_list_chats))
        .route("/api/upload", post(handle_upload))
        .route("/api/documents", get(handle_list_documents))
        .route("/api/documents/{name}", delete(handle_delete_document))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
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

fn payload_too_large(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        code: "payload_too_large".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map session-store failures onto HTTP statuses: not-found → 404, bad id →
/// 400, exhausted id range → 507, anything else → 500.
fn store_error(e: ChatStoreError) -> AppError {
    match e {
        ChatStoreError::NotFound(_) => not_found(e.to_string()),
        ChatStoreError::InvalidId(_) => bad_request(e.to_string()),
        ChatStoreError::CapacityExhausted => AppError {
            status: StatusCode::INSUFFICIENT_STORAGE,
            code: "capacity_exhausted".to_string(),
            message: e.to_string(),
        },
        ChatStoreError::Corrupt(..) | ChatStoreError::Io(_) => internal(e.to_string()),
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

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: Option<String>,
    chat_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    chat_id: String,
    answer: String,
    sources: Vec<SourceRef>,
}

/// Ask a question. Without a `chat_id` a new session is allocated under the
/// lowest free numeric ID; with one, the turn is appended to that session
/// (starting it if it does not exist yet).
async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let question = match req.question.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return Err(bad_request("question must not be empty")),
    };

    let chat_id = match req.chat_id.as_deref() {
        Some(raw) => canonical_id(raw).map_err(store_error)?,
        None => state.store.allocate_id().await.map_err(store_error)?,
    };

    let result = state.engine.answer(&chat_id, &question).await;

    let turn = ChatTurn {
        question,
        answer: result.answer.clone(),
        sources: result.sources.clone(),
        timestamp: Utc::now(),
    };
    state
        .store
        .create_or_append(Some(&chat_id), turn)
        .await
        .map_err(store_error)?;

    Ok(Json(ChatResponse {
        chat_id,
        answer: result.answer,
        sources: result.sources,
    }))
}

// ============ GET /api/chat/{id} ============

async fn handle_get_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChatTurn>>, AppError> {
    let turns = state.store.get(&id).await.map_err(store_error)?;
    Ok(Json(turns))
}

// ============ DELETE /api/chat/{id} ============

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_delete_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.store.delete(&id).await.map_err(store_error)?;
    state.engine.forget(&id);
    Ok(Json(MessageResponse {
        message: "Chat deleted successfully".to_string(),
    }))
}

// ============ GET /api/chats ============

async fn handle_list_chats(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::models::ChatSummary>>, AppError> {
    let summaries = state.store.list().await.map_err(store_error)?;
    Ok(Json(summaries))
}

// ============ POST /api/upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    filename: String,
}

/// Reduce a client-supplied file name to its final path component, rejecting
/// anything that could escape the corpus directory.
fn sanitize_filename(name: &str) -> Option<String> {
    let path = std::path::Path::new(name);
    let file_name = path.file_name()?.to_str()?.to_string();
    // Reject names that are pure traversal or alter the directory.
    if std::path::Path::new(&file_name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(file_name)
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart payload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let raw_name = field
            .file_name()
            .ok_or_else(|| bad_request("no selected file"))?
            .to_string();
        let filename = sanitize_filename(&raw_name)
            .filter(|n| n.to_ascii_lowercase().ends_with(".pdf"))
            .ok_or_else(|| bad_request("invalid file type, only .pdf is accepted"))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        if bytes.len() > state.config.server.max_upload_bytes {
            return Err(payload_too_large(format!(
                "upload exceeds limit of {} bytes",
                state.config.server.max_upload_bytes
            )));
        }

        let dir = &state.config.corpus.dir;
        std::fs::create_dir_all(dir).map_err(|e| internal(e.to_string()))?;
        std::fs::write(dir.join(&filename), &bytes).map_err(|e| internal(e.to_string()))?;

        // The index no longer reflects the corpus.
        state.engine.invalidate();
        tracing::info!(file = %filename, size = bytes.len(), "document uploaded");

        return Ok(Json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            filename,
        }));
    }

    Err(bad_request("no file part"))
}

// ============ GET /api/documents ============

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::models::DocumentInfo>>, AppError> {
    let docs =
        loader::list_documents(&state.config.corpus.dir).map_err(|e| internal(e.to_string()))?;
    Ok(Json(docs))
}

// ============ DELETE /api/documents/{name} ============

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let filename = sanitize_filename(&name)
        .filter(|n| n.to_ascii_lowercase().ends_with(".pdf"))
        .ok_or_else(|| bad_request("invalid file name"))?;

    let path = state.config.corpus.dir.join(&filename);
    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_found(format!("file not found: {}", filename)));
        }
        Err(e) => return Err(internal(e.to_string())),
    }

    state.engine.invalidate();
    tracing::info!(file = %filename, "document deleted");

    Ok(Json(MessageResponse {
        message: "File deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(
            sanitize_filename("../../etc/passwd.pdf"),
            Some("passwd.pdf".to_string())
        );
        assert_eq!(
            sanitize_filename("report.pdf"),
            Some("report.pdf".to_string())
        );
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename(""), None);
    }
}
