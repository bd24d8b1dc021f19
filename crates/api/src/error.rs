//! HTTP error mapping for the scan API.
//!
//! Every handler returns [`AppResult`]; failures render as
//! `{ "error": <message>, "code": <CODE> }` with a status derived from the
//! error kind.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ctlens_core::error::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Pipeline, remote service, or lookup failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The upload body is not readable multipart form data.
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Core(core) => classify_core(&core),
            AppError::Multipart(err) => (err.status(), "BAD_REQUEST", err.body_text()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

/// Map a domain error to a status, a machine-readable code, and a message.
///
/// Upstream failures surface as 502 (or 503 while the bundle is still
/// being produced) so clients can tell them apart from their own mistakes.
fn classify_core(err: &CoreError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::ArtifactNotFound(_) => (StatusCode::NOT_FOUND, "ARTIFACT_NOT_FOUND", message),
        CoreError::BundleNotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY", message),
        CoreError::Transport(_) => {
            tracing::warn!(error = %err, "Compression service request failed");
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
        }
        CoreError::StreamParse(_) | CoreError::StreamFatal(_) => {
            tracing::warn!(error = %err, "Analysis stream failed");
            (StatusCode::BAD_GATEWAY, "ANALYSIS_FAILED", message)
        }
    }
}
