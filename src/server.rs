use crate::chat::{ChatMessage, Role};
use crate::config::HttpConfig;
use crate::document::is_pdf;
use crate::error::ApiError;
use crate::ingest::Ingestor;
use crate::rag::{Answer, RagEngine};
use anyhow::{Context, Result};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::HeaderValue;
use axum::routing::post;
use axum::{Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Shared service handles, created once at startup
#[derive(Clone)]
pub struct AppState {
    ingestor: Arc<Ingestor>,
    engine: Arc<RagEngine>,
}

impl AppState {
    pub fn new(ingestor: Ingestor, engine: RagEngine) -> Self {
        AppState {
            ingestor: Arc::new(ingestor),
            engine: Arc::new(engine),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub doc_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub doc_id: String,
    pub question: String,
    #[serde(default)]
    pub history: Option<Vec<HistoryTurn>>,
}

/// Build the HTTP router with CORS and upload limits applied
pub fn router(state: AppState, config: &HttpConfig) -> Result<Router> {
    Ok(Router::new()
        .route("/upload-pdf", post(upload_pdf))
        .route("/chat", post(chat))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins)?)
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<Result<Vec<HeaderValue>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn upload_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        if !is_pdf(field.content_type(), file_name.as_deref()) {
            return Err(ApiError::BadRequest("File must be a PDF.".to_string()));
        }

        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing file field.".to_string()))?;
    info!(
        "Received {} ({} bytes)",
        file_name.as_deref().unwrap_or("unnamed upload"),
        bytes.len()
    );

    let doc_id = state
        .ingestor
        .ingest(bytes.to_vec(), None)
        .await
        .map_err(|e| {
            error!("Ingestion failed: {:#}", e);
            ApiError::internal(e)
        })?;

    Ok(Json(UploadResponse {
        doc_id,
        message: "PDF processed successfully".to_string(),
    }))
}

async fn chat(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = request?;
    let retriever = state
        .engine
        .retriever_for(&request.doc_id)
        .await
        .map_err(|e| {
            error!("Retriever for {} failed: {:#}", request.doc_id, e);
            ApiError::Internal(format!("Error building QA chain: {:#}", e))
        })?;

    let history: Vec<ChatMessage> = request
        .history
        .unwrap_or_default()
        .into_iter()
        .map(|turn| ChatMessage {
            role: Role::from_label(&turn.role),
            content: turn.content,
        })
        .collect();

    let answer = state
        .engine
        .answer_with(&retriever, &request.question, &history)
        .await
        .map_err(|e| {
            error!("Answer for {} failed: {:#}", request.doc_id, e);
            ApiError::internal(e)
        })?;

    Ok(Json(answer))
}
