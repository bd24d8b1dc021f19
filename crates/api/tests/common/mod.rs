#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use ctlens_api::config::ServerConfig;
use ctlens_api::router::build_app_router;
use ctlens_api::state::AppState;
use ctlens_compressor::api::{CompressionService, CompressorApi, CompressorApiError};
use ctlens_compressor::messages::{BundleListing, JobResult, UploadResponse};
use ctlens_core::types::{AnalyzablePayload, JobHandle, RemoteJobState};
use ctlens_inference::api::{ByteStream, InferenceError, InferenceService};
use ctlens_pipeline::config::PipelineConfig;
use ctlens_pipeline::orchestrator::Orchestrator;
use futures::StreamExt;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const BOUNDARY: &str = "ctlens-test-boundary";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Compression service whose jobs are complete with a montage bundle.
pub struct CompleteCompressor;

#[async_trait]
impl CompressionService for CompleteCompressor {
    async fn upload(
        &self,
        _file_name: &str,
        _contents: Vec<u8>,
    ) -> Result<UploadResponse, CompressorApiError> {
        Ok(UploadResponse {
            job_id: JobHandle::from("job-42"),
            status: RemoteJobState::Pending,
            message: None,
        })
    }

    async fn get_result(&self, _job: &JobHandle) -> Result<JobResult, CompressorApiError> {
        Ok(JobResult {
            status: RemoteJobState::Complete,
            metrics: None,
            error: None,
            patient_id: None,
            created_at: None,
            completed_at: None,
        })
    }

    async fn get_bundle(&self, _job: &JobHandle) -> Result<BundleListing, CompressorApiError> {
        Ok(BundleListing {
            files: vec!["montage_overview.png".into()],
            metadata: serde_json::json!({"bundle": {"num_slices": 8}}),
        })
    }

    async fn get_bundle_file(
        &self,
        _job: &JobHandle,
        _file_name: &str,
    ) -> Result<Vec<u8>, CompressorApiError> {
        Ok(b"\x89PNG".to_vec())
    }
}

/// Inference service answering with a short bulleted report.
pub struct ReportInference;

#[async_trait]
impl InferenceService for ReportInference {
    async fn analyze(&self, _payload: &AnalyzablePayload) -> Result<ByteStream, InferenceError> {
        let chunks: Vec<Result<Vec<u8>, InferenceError>> = vec![
            Ok(b"0:{\"type\":\"text-delta\",\"textDelta\":\"- Clear lungs\\n\"}\n".to_vec()),
            Ok(b"0:{\"type\":\"text-delta\",\"textDelta\":\"- No fracture\\n\"}\n".to_vec()),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".parse().unwrap()],
        request_timeout_secs: 30,
        pipeline: PipelineConfig {
            // Nothing listens on the discard port; health probes fail fast.
            compressor_url: "http://127.0.0.1:9".into(),
            poll_interval: Duration::from_millis(10),
            analysis_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        },
    }
}

/// Build the full router over fake remote services.
pub fn build_test_app() -> (Router, Arc<Orchestrator>) {
    let config = test_config();
    let orchestrator = Arc::new(Orchestrator::new(
        config.pipeline.clone(),
        Arc::new(CompleteCompressor),
        Arc::new(ReportInference),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        compressor: Arc::new(CompressorApi::new(config.pipeline.compressor_url.clone())),
    };

    (build_app_router(state, &config), orchestrator)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(app: Router, method: Method, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

/// POST a multipart body with a single field.
pub async fn post_multipart(
    app: Router,
    uri: &str,
    field: &str,
    file_name: &str,
    contents: &[u8],
) -> Response<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/zip\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll the status endpoint until the job reaches a terminal stage.
pub async fn wait_terminal(app: &Router, job_id: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let json = body_json(get(app.clone(), &format!("/api/v1/scans/{job_id}/status")).await).await;
            let stage = json["data"]["stage"].as_str().unwrap_or_default().to_string();
            if stage == "completed" || stage == "error" {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job should reach a terminal stage")
}
