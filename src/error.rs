use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Errors returned to HTTP callers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request itself is unacceptable
    #[error("{0}")]
    BadRequest(String),
    /// An upstream service or the pipeline failed
    #[error("{0}")]
    Internal(String),
    /// The request body could not be extracted (bad JSON, oversized upload)
    #[error("{detail}")]
    Rejected { status: StatusCode, detail: String },
}

impl ApiError {
    /// Wrap a pipeline error, keeping its whole context chain
    pub fn internal(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Rejected { status, .. } => *status,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

// Keeps 413 for bodies over the upload limit
impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Rejected {
            status: err.status(),
            detail: err.body_text(),
        }
    }
}

#[derive(Serialize)]
struct JsonError {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = JsonError {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
