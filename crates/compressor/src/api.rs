//! REST API client for the compression service HTTP endpoints.
//!
//! Wraps upload, job status, bundle listing, and artifact download using
//! [`reqwest`]. The [`CompressionService`] trait is the seam the poller and
//! materializer depend on, so tests can substitute an in-process fake.

use async_trait::async_trait;
use ctlens_core::error::CoreError;
use ctlens_core::types::JobHandle;

use crate::messages::{BundleListing, HealthResponse, JobResult, UploadResponse};

/// Operations the pipeline needs from the compression service.
#[async_trait]
pub trait CompressionService: Send + Sync {
    /// Upload a zipped DICOM series and start a compression job.
    async fn upload(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, CompressorApiError>;

    /// Fetch the current state of a job.
    async fn get_result(&self, job: &JobHandle) -> Result<JobResult, CompressorApiError>;

    /// List the artifact bundle of a completed job.
    async fn get_bundle(&self, job: &JobHandle) -> Result<BundleListing, CompressorApiError>;

    /// Download one artifact of a job's bundle.
    async fn get_bundle_file(
        &self,
        job: &JobHandle,
        file_name: &str,
    ) -> Result<Vec<u8>, CompressorApiError>;
}

/// HTTP client for a single compression service instance.
#[derive(Debug, Clone)]
pub struct CompressorApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the compression REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum CompressorApiError {
    /// The HTTP request itself failed (network, DNS, TLS, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The configured base URL cannot carry path segments.
    #[error("Invalid compression service URL: {0}")]
    InvalidUrl(String),

    /// The service returned a non-2xx status code.
    #[error("Compression API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl From<CompressorApiError> for CoreError {
    fn from(err: CompressorApiError) -> Self {
        CoreError::Transport(err.to_string())
    }
}

impl CompressorApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`. A trailing
    ///   slash is ignored.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (shares the connection pool with the inference client).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Probe `GET /health`.
    pub async fn health(&self) -> Result<HealthResponse, CompressorApiError> {
        let response = self
            .client
            .get(self.endpoint(&["health"])?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// `{api_url}/{segments...}` with every segment percent-encoded, so a
    /// job handle or file name can never change the request path.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, CompressorApiError> {
        let mut url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| CompressorApiError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| CompressorApiError::InvalidUrl(self.api_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`CompressorApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CompressorApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CompressorApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CompressorApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CompressionService for CompressorApi {
    /// Sends `POST /compress/upload` with the archive as multipart field
    /// `file`.
    async fn upload(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, CompressorApiError> {
        let part = reqwest::multipart::Part::bytes(contents).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint(&["compress", "upload"])?)
            .multipart(form)
            .send()
            .await?;

        let upload: UploadResponse = Self::parse_response(response).await?;
        tracing::info!(job_id = %upload.job_id, file_name, "Scan uploaded for compression");
        Ok(upload)
    }

    async fn get_result(&self, job: &JobHandle) -> Result<JobResult, CompressorApiError> {
        let response = self
            .client
            .get(self.endpoint(&["result", job.as_str()])?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn get_bundle(&self, job: &JobHandle) -> Result<BundleListing, CompressorApiError> {
        let response = self
            .client
            .get(self.endpoint(&["bundle", job.as_str()])?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn get_bundle_file(
        &self,
        job: &JobHandle,
        file_name: &str,
    ) -> Result<Vec<u8>, CompressorApiError> {
        let response = self
            .client
            .get(self.endpoint(&["bundle", job.as_str(), file_name])?)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
