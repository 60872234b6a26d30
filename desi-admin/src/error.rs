//! Error types for the collector and import tooling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

pub type AdminResult<T> = Result<T, AdminError>;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    #[error("batch signature does not match machine {0}")]
    BadSignature(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("report error: {0}")]
    Report(#[from] desi_report::ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collector store lock poisoned")]
    Poisoned,

    #[error("background task failed: {0}")]
    Task(String),
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MalformedBatch(_) => StatusCode::BAD_REQUEST,
            Self::BadSignature(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
