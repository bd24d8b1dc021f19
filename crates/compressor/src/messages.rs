//! Wire types exchanged with the compression service.
//!
//! The service answers with plain JSON objects; optional fields are
//! tolerated as missing so older and newer service builds both parse.

use ctlens_core::types::{JobHandle, RemoteJobState};
use serde::Deserialize;

/// Response of `POST /compress/upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub job_id: JobHandle,
    pub status: RemoteJobState,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /result/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobResult {
    pub status: RemoteJobState,
    /// Compression metrics (ratios, timings, token estimates).
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
    /// Failure reason, set when `status` is `failed`.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Response of `GET /bundle/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleListing {
    /// File names available via `GET /bundle/{job_id}/{filename}`.
    #[serde(default)]
    pub files: Vec<String>,
    /// Contents of the bundle's `metadata.json`; `null` when absent.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}
