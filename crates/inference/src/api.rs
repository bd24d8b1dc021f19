//! HTTP client for the inference stream service.
//!
//! [`InferenceApi::analyze`] posts the analyzable payload and hands back the
//! response body as a raw byte stream; decoding and aggregation happen in
//! [`crate::aggregator`].

use std::time::Duration;

use async_trait::async_trait;
use ctlens_core::error::CoreError;
use ctlens_core::types::{AnalyzablePayload, JobHandle};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;

/// Chunked response body of an analysis request.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, InferenceError>>;

/// Starts analysis sessions on the inference service.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Open the analysis stream for a payload.
    ///
    /// Resolves once response headers arrive; the body is read lazily.
    async fn analyze(&self, payload: &AnalyzablePayload) -> Result<ByteStream, InferenceError>;
}

/// Errors from the inference service or its response stream.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The HTTP request itself failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-2xx status code.
    #[error("Inference API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The body stream broke after it started.
    #[error("Stream interrupted: {0}")]
    Stream(String),

    /// The session exceeded its wall-clock ceiling.
    #[error("Analysis timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<InferenceError> for CoreError {
    fn from(err: InferenceError) -> Self {
        CoreError::StreamFatal(err.to_string())
    }
}

/// JSON body of an analysis request.
#[derive(Debug, Serialize)]
pub struct AnalyzeRequest<'a> {
    pub job_id: &'a JobHandle,
    /// Base64-encoded image.
    pub image: &'a str,
    pub modality: &'a str,
    pub slice_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'a str>,
}

impl<'a> From<&'a AnalyzablePayload> for AnalyzeRequest<'a> {
    fn from(payload: &'a AnalyzablePayload) -> Self {
        Self {
            job_id: &payload.job_handle,
            image: &payload.image_base64,
            modality: &payload.modality,
            slice_count: payload.slice_count,
            prompt: payload.prompt_override.as_deref(),
        }
    }
}

/// HTTP client for the inference endpoint.
#[derive(Debug, Clone)]
pub struct InferenceApi {
    client: reqwest::Client,
    analyze_url: String,
}

impl InferenceApi {
    /// * `analyze_url` - Full URL of the analysis endpoint.
    pub fn new(analyze_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), analyze_url)
    }

    pub fn with_client(client: reqwest::Client, analyze_url: impl Into<String>) -> Self {
        Self {
            client,
            analyze_url: analyze_url.into(),
        }
    }

    pub fn analyze_url(&self) -> &str {
        &self.analyze_url
    }
}

#[async_trait]
impl InferenceService for InferenceApi {
    async fn analyze(&self, payload: &AnalyzablePayload) -> Result<ByteStream, InferenceError> {
        let response = self
            .client
            .post(&self.analyze_url)
            .json(&AnalyzeRequest::from(payload))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(InferenceError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(job_id = %payload.job_handle, "Analysis stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| InferenceError::Stream(e.to_string()))
            })
            .boxed())
    }
}
