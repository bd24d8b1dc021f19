//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server is
//! started.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use ctlens_api::error::AppError;
use ctlens_core::error::CoreError;
use ctlens_core::types::JobHandle;
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "result",
        id: "4f1c".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "result with id 4f1c not found");
}

#[tokio::test]
async fn conflict_error_returns_409() {
    let err = AppError::Core(CoreError::Conflict("Job 4f1c is already tracked".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert_eq!(json["error"], "Job 4f1c is already tracked");
}

#[tokio::test]
async fn transport_error_returns_502() {
    let err = AppError::Core(CoreError::Transport("connection refused".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn bundle_not_ready_returns_503() {
    let err = AppError::Core(CoreError::BundleNotReady("listing 404".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "NOT_READY");
}

#[tokio::test]
async fn artifact_not_found_returns_404() {
    let err = AppError::Core(CoreError::ArtifactNotFound(JobHandle::from("4f1c")));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "ARTIFACT_NOT_FOUND");
    assert_eq!(json["error"], "No image artifact found for job 4f1c");
}

// ---------------------------------------------------------------------------
// Request and stream errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("Missing multipart field 'file'".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

/// Stream failures are reported as an upstream analysis error.
#[tokio::test]
async fn stream_fatal_returns_502() {
    let err = AppError::Core(CoreError::StreamFatal("Analysis timed out after 60s".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "ANALYSIS_FAILED");
    assert!(json["error"].as_str().unwrap().contains("timed out"));
}
