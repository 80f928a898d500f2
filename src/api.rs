//! HTTP surface for the tutor.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Liveness check reporting the configured port.
//! - `POST /echo` – Return the posted JSON under `echo` (`null` when the body is not JSON).
//! - `POST /queue/push` – Enqueue a JSON object on the task queue.
//! - `POST /queue/pop` – Dequeue the oldest item, or report `empty`.
//! - `GET /queue/length` – Number of queued items.
//! - `POST /learn` – Multipart upload (`uploadedPDF`, `topicToLearn`): extract the PDF, rebuild
//!   the similarity index, and answer the topic from the nearest chunks.
//! - `POST /ask` – Answer a question from the current index.
//! - `POST /chat` – Replay a role-tagged conversation to the generation model.
//! - `GET /index` – Describe the current similarity index.
//!
//! Every failure is reported as `{ "error": message }` with a status derived from the error kind.

use crate::extract::{DocumentExtractor, DocumentMetadata, ExtractionError};
use crate::processing::{ChatTurn, IndexInfo, LearnOutcome, QueryResult, TutorApi, TutorError};
use crate::queue::{Popped, QueueError, QueueGateway};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State, multipart::MultipartError, rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Multipart field carrying the uploaded document.
const UPLOAD_FIELD: &str = "uploadedPDF";
/// Multipart field carrying the topic to learn about.
const TOPIC_FIELD: &str = "topicToLearn";

/// Collaborators shared by every handler.
pub struct AppState<T> {
    /// Retrieval-augmented tutor.
    pub tutor: Arc<T>,
    /// Turns uploads into text.
    pub extractor: Arc<dyn DocumentExtractor>,
    /// Task queue gateway.
    pub queue: QueueGateway,
    /// Port reported by `GET /`.
    pub port: u16,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            tutor: self.tutor.clone(),
            extractor: self.extractor.clone(),
            queue: self.queue.clone(),
            port: self.port,
        }
    }
}

/// Build the HTTP router. `upload_limit` bounds request bodies in bytes.
pub fn create_router<T>(state: AppState<T>, upload_limit: usize) -> Router
where
    T: TutorApi + 'static,
{
    Router::new()
        .route("/", get(root::<T>))
        .route("/echo", post(echo))
        .route("/queue/push", post(queue_push::<T>))
        .route("/queue/pop", post(queue_pop::<T>))
        .route("/queue/length", get(queue_length::<T>))
        .route("/learn", post(learn::<T>))
        .route("/ask", post(ask::<T>))
        .route("/chat", post(chat::<T>))
        .route("/index", get(index_info::<T>))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

async fn root<T>(State(state): State<AppState<T>>) -> Json<Value> {
    Json(json!({ "status": "ok", "port": state.port }))
}

async fn echo(body: Bytes) -> Json<Value> {
    let echoed = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    Json(json!({ "echo": echoed }))
}

async fn queue_push<T>(
    State(state): State<AppState<T>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let item = serde_json::from_slice::<Value>(&body).ok();
    state.queue.push(item.as_ref()).await?;
    Ok(Json(json!({ "status": "queued" })))
}

async fn queue_pop<T>(State(state): State<AppState<T>>) -> Result<Json<Value>, ApiError> {
    let body = match state.queue.pop().await? {
        Popped::Item(item) => json!({ "status": "success", "item": item }),
        Popped::Empty => json!({ "status": "empty" }),
    };
    Ok(Json(body))
}

async fn queue_length<T>(State(state): State<AppState<T>>) -> Result<Json<Value>, ApiError> {
    let length = state.queue.length().await?;
    Ok(Json(json!({ "length": length })))
}

/// Success response for `POST /learn`.
#[derive(Serialize)]
struct LearnResponse {
    status: &'static str,
    topic: String,
    metadata: DocumentMetadata,
    /// Characters of text extracted from the upload.
    extracted_text_length: usize,
    #[serde(flatten)]
    outcome: LearnOutcome,
}

struct Upload {
    filename: String,
    bytes: Bytes,
}

/// Learn a topic from an uploaded PDF.
///
/// Input is validated in order (file present, `.pdf` name, non-empty topic, non-empty upload)
/// before any collaborator runs. The upload is staged in a temporary file that is removed when
/// the handler returns, on every path.
async fn learn<T>(
    State(state): State<AppState<T>>,
    mut multipart: Multipart,
) -> Result<Json<LearnResponse>, ApiError>
where
    T: TutorApi,
{
    let mut upload = None;
    let mut topic = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from)?
    {
        match field.name().map(str::to_owned).as_deref() {
            Some(UPLOAD_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(ApiError::from)?;
                upload = Some(Upload { filename, bytes });
            }
            Some(TOPIC_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(ApiError::from)?;
                topic = Some(text);
            }
            _ => {}
        }
    }

    let Some(upload) = upload else {
        return Err(ApiError::bad_request("No file part"));
    };
    if upload.filename.is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }
    if !upload.filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::bad_request("File must be a PDF"));
    }
    let topic = topic.map(|topic| topic.trim().to_string()).unwrap_or_default();
    if topic.is_empty() {
        return Err(ApiError::bad_request("Topic to learn is required"));
    }
    if upload.bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    tracing::info!(
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        topic = %topic,
        "Learn request received"
    );
    let staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".pdf")
        .tempfile()
        .map_err(ApiError::internal)?;
    tokio::fs::write(staged.path(), &upload.bytes)
        .await
        .map_err(ApiError::internal)?;

    let document = state.extractor.extract(staged.path()).await?;
    if document.text.trim().is_empty() {
        return Err(TutorError::EmptyDocument.into());
    }
    let extracted_text_length = document.text.chars().count();

    let outcome = state.tutor.learn(&document.text, &topic).await?;
    tracing::info!(
        topic = %topic,
        chunks = outcome.vector_store_info.chunk_count,
        similar = outcome.similar_chunks.len(),
        "Learn request completed"
    );

    Ok(Json(LearnResponse {
        status: "success",
        topic,
        metadata: document.metadata,
        extracted_text_length,
        outcome,
    }))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

async fn ask<T>(
    State(state): State<AppState<T>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<QueryResult>, ApiError>
where
    T: TutorApi,
{
    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let result = state.tutor.ask(&request.question).await?;
    Ok(Json(result))
}

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<ChatTurn>,
}

async fn chat<T>(
    State(state): State<AppState<T>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
    T: TutorApi,
{
    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let reply = state.tutor.chat(request.messages).await?;
    Ok(Json(json!({ "reply": reply })))
}

async fn index_info<T>(State(state): State<AppState<T>>) -> Json<IndexInfo>
where
    T: TutorApi,
{
    Json(state.tutor.index_info().await)
}

/// Error rendered as `{ "error": message }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.message, "Request rejected");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<TutorError> for ApiError {
    fn from(error: TutorError) -> Self {
        let status = match &error {
            TutorError::Validation(_)
            | TutorError::Extraction(_)
            | TutorError::EmptyDocument
            | TutorError::Chunking(_) => StatusCode::BAD_REQUEST,
            TutorError::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
            TutorError::EmbeddingProvider(_)
            | TutorError::GenerationProvider(_)
            | TutorError::UnknownEmbeddingModel(_)
            | TutorError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(error: ExtractionError) -> Self {
        TutorError::from(error).into()
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self {
            status: error.status(),
            message: error.body_text(),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(error: QueueError) -> Self {
        let status = match &error {
            QueueError::Validation(_) => StatusCode::BAD_REQUEST,
            QueueError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}
