//! Bundle materialization: completed job → [`AnalyzablePayload`].
//!
//! [`BundleMaterializer::materialize`] is safe to call on every poll. The
//! first successful call fetches the bundle listing, picks the
//! representative image, downloads and base64-encodes it, and caches the
//! result; later calls return the cached payload without any request.

use std::sync::Arc;

use base64::Engine as _;
use ctlens_core::error::CoreError;
use ctlens_core::store::PayloadStore;
use ctlens_core::types::{AnalyzablePayload, JobHandle, DEFAULT_MODALITY};
use serde_json::Value;

use crate::api::CompressionService;
use crate::messages::BundleListing;

/// Overview artifact the compression service writes into every bundle.
pub const MONTAGE_FILE: &str = "montage_overview.png";

/// Extension of image artifacts in a bundle.
pub const IMAGE_EXTENSION: &str = ".png";

/// Errors from a single materialization attempt.
///
/// Both variants are retried by the poller; only repeated failures
/// escalate to a job-level error.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// Listing or download failed; the bundle may not be served yet.
    #[error("Bundle not ready for job {job}: {reason}")]
    BundleNotReady { job: JobHandle, reason: String },

    /// The listing holds no image artifact.
    #[error("No image artifact in bundle for job {0}")]
    ArtifactNotFound(JobHandle),
}

impl From<MaterializeError> for CoreError {
    fn from(err: MaterializeError) -> Self {
        match err {
            MaterializeError::BundleNotReady { reason, .. } => CoreError::BundleNotReady(reason),
            MaterializeError::ArtifactNotFound(job) => CoreError::ArtifactNotFound(job),
        }
    }
}

/// Builds and caches analyzable payloads for completed jobs.
pub struct BundleMaterializer {
    service: Arc<dyn CompressionService>,
    payloads: Arc<PayloadStore>,
}

impl BundleMaterializer {
    pub fn new(service: Arc<dyn CompressionService>, payloads: Arc<PayloadStore>) -> Self {
        Self { service, payloads }
    }

    /// The payload already built for `job`, if any. Never touches the network.
    pub fn cached(&self, job: &JobHandle) -> Option<AnalyzablePayload> {
        self.payloads.get(job)
    }

    /// Return the payload for a completed job, building it on first use.
    ///
    /// `metrics` is the `metrics` object of the job's latest status
    /// response; it is consulted for slice count and prompt override when
    /// the bundle metadata does not declare them.
    pub async fn materialize(
        &self,
        job: &JobHandle,
        metrics: Option<&Value>,
    ) -> Result<AnalyzablePayload, MaterializeError> {
        if let Some(payload) = self.payloads.get(job) {
            return Ok(payload);
        }

        let listing = self
            .service
            .get_bundle(job)
            .await
            .map_err(|e| not_ready(job, e))?;

        let image_name = select_image(&listing)
            .ok_or_else(|| MaterializeError::ArtifactNotFound(job.clone()))?
            .to_string();

        let bytes = self
            .service
            .get_bundle_file(job, &image_name)
            .await
            .map_err(|e| not_ready(job, e))?;

        if bytes.is_empty() {
            return Err(not_ready(job, format!("artifact {image_name} is empty")));
        }

        let payload = AnalyzablePayload {
            job_handle: job.clone(),
            image_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            slice_count: slice_count(&listing.metadata, metrics),
            modality: modality(&listing.metadata),
            prompt_override: prompt_override(&listing.metadata, metrics),
            image_name,
        };

        tracing::info!(
            job_id = %job,
            image = %payload.image_name,
            image_bytes = bytes.len(),
            slice_count = payload.slice_count,
            "Bundle materialized",
        );

        // A concurrent caller may have won the race; keep whichever landed first.
        Ok(self.payloads.insert_if_absent(job.clone(), payload))
    }
}

fn not_ready(job: &JobHandle, reason: impl ToString) -> MaterializeError {
    MaterializeError::BundleNotReady {
        job: job.clone(),
        reason: reason.to_string(),
    }
}

/// Pick the representative image of a bundle.
///
/// Prefers the declared montage artifact (`metadata.bundle.montage_file`,
/// defaulting to [`MONTAGE_FILE`]) when it is listed, otherwise the first
/// listed `.png` file.
pub fn select_image(listing: &BundleListing) -> Option<&str> {
    let montage = listing
        .metadata
        .pointer("/bundle/montage_file")
        .and_then(Value::as_str)
        .unwrap_or(MONTAGE_FILE);

    listing
        .files
        .iter()
        .find(|name| name.as_str() == montage)
        .or_else(|| {
            listing
                .files
                .iter()
                .find(|name| name.to_ascii_lowercase().ends_with(IMAGE_EXTENSION))
        })
        .map(String::as_str)
}

fn slice_count(metadata: &Value, metrics: Option<&Value>) -> u32 {
    [
        metadata.pointer("/bundle/num_slices"),
        metadata.get("num_slices"),
        metrics.and_then(|m| m.get("num_slices")),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_u64)
    .and_then(|n| u32::try_from(n).ok())
    .unwrap_or(0)
}

fn prompt_override(metadata: &Value, metrics: Option<&Value>) -> Option<String> {
    [
        metadata.get("prompt"),
        metrics.and_then(|m| m.get("prompt_override")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|s| !s.is_empty())
    .map(str::to_string)
}

fn modality(metadata: &Value) -> String {
    metadata
        .get("modality")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_MODALITY)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::api::CompressorApiError;
    use crate::messages::{JobResult, UploadResponse};

    struct FakeService {
        files: Vec<String>,
        metadata: Value,
        bundle_calls: AtomicUsize,
        file_calls: AtomicUsize,
        fail_listing: bool,
    }

    impl FakeService {
        fn new(files: &[&str], metadata: Value) -> Self {
            Self {
                files: files.iter().map(|f| f.to_string()).collect(),
                metadata,
                bundle_calls: AtomicUsize::new(0),
                file_calls: AtomicUsize::new(0),
                fail_listing: false,
            }
        }
    }

    #[async_trait]
    impl CompressionService for FakeService {
        async fn upload(&self, _: &str, _: Vec<u8>) -> Result<UploadResponse, CompressorApiError> {
            unimplemented!()
        }

        async fn get_result(&self, _: &JobHandle) -> Result<JobResult, CompressorApiError> {
            unimplemented!()
        }

        async fn get_bundle(&self, _: &JobHandle) -> Result<BundleListing, CompressorApiError> {
            self.bundle_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_listing {
                return Err(CompressorApiError::ApiError {
                    status: 400,
                    body: "Job not complete: processing".into(),
                });
            }
            Ok(BundleListing {
                files: self.files.clone(),
                metadata: self.metadata.clone(),
            })
        }

        async fn get_bundle_file(
            &self,
            _: &JobHandle,
            file_name: &str,
        ) -> Result<Vec<u8>, CompressorApiError> {
            self.file_calls.fetch_add(1, Ordering::SeqCst);
            Ok(file_name.as_bytes().to_vec())
        }
    }

    fn materializer(service: Arc<FakeService>) -> BundleMaterializer {
        BundleMaterializer::new(service, Arc::new(PayloadStore::new(8)))
    }

    fn listing(files: &[&str], metadata: Value) -> BundleListing {
        BundleListing {
            files: files.iter().map(|f| f.to_string()).collect(),
            metadata,
        }
    }

    #[test]
    fn select_prefers_montage() {
        let l = listing(&["slice_00_top.png", MONTAGE_FILE, "metadata.json"], Value::Null);
        assert_eq!(select_image(&l), Some(MONTAGE_FILE));
    }

    #[test]
    fn select_honours_declared_montage_name() {
        let l = listing(
            &["slice_00_top.png", "overview.png"],
            json!({"bundle": {"montage_file": "overview.png"}}),
        );
        assert_eq!(select_image(&l), Some("overview.png"));
    }

    #[test]
    fn select_falls_back_to_first_png() {
        let l = listing(&["metadata.json", "slice_03_mid.PNG", "slice_04_mid-lower.png"], Value::Null);
        assert_eq!(select_image(&l), Some("slice_03_mid.PNG"));
    }

    #[test]
    fn select_none_without_images() {
        let l = listing(&["metadata.json", "compressed.npz"], Value::Null);
        assert_eq!(select_image(&l), None);
    }

    #[test]
    fn slice_count_lookup_order() {
        let metadata = json!({"bundle": {"num_slices": 8}, "num_slices": 3});
        assert_eq!(slice_count(&metadata, None), 8);

        let metrics = json!({"num_slices": 12});
        assert_eq!(slice_count(&Value::Null, Some(&metrics)), 12);
        assert_eq!(slice_count(&Value::Null, None), 0);
    }

    #[test]
    fn prompt_override_skips_blank_values() {
        let metadata = json!({"prompt": "  "});
        let metrics = json!({"prompt_override": "Focus on nodules"});
        assert_eq!(
            prompt_override(&metadata, Some(&metrics)).as_deref(),
            Some("Focus on nodules")
        );
        assert_eq!(prompt_override(&Value::Null, None), None);
    }

    #[tokio::test]
    async fn materialize_builds_payload() {
        let service = Arc::new(FakeService::new(
            &["slice_00_top.png", MONTAGE_FILE],
            json!({"bundle": {"num_slices": 8}, "modality": "CT"}),
        ));
        let m = materializer(Arc::clone(&service));

        let payload = m.materialize(&JobHandle::from("j1"), None).await.unwrap();
        assert_eq!(payload.image_name, MONTAGE_FILE);
        assert_eq!(payload.slice_count, 8);
        assert_eq!(payload.modality, "CT");
        assert_eq!(
            payload.image_base64,
            base64::engine::general_purpose::STANDARD.encode(MONTAGE_FILE)
        );
        assert!(payload.prompt_override.is_none());
    }

    #[tokio::test]
    async fn materialize_is_idempotent() {
        let service = Arc::new(FakeService::new(&[MONTAGE_FILE], Value::Null));
        let m = materializer(Arc::clone(&service));
        let job = JobHandle::from("j1");

        let first = m.materialize(&job, None).await.unwrap();
        let second = m.materialize(&job, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.bundle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.file_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn materialize_without_image_is_artifact_not_found() {
        let service = Arc::new(FakeService::new(&["metadata.json"], Value::Null));
        let m = materializer(service);
        let job = JobHandle::from("j1");

        let err = m.materialize(&job, None).await.unwrap_err();
        assert_matches!(err, MaterializeError::ArtifactNotFound(ref j) if *j == job);
        assert!(m.cached(&job).is_none());
    }

    #[tokio::test]
    async fn listing_failure_is_bundle_not_ready() {
        let mut service = FakeService::new(&[MONTAGE_FILE], Value::Null);
        service.fail_listing = true;
        let m = materializer(Arc::new(service));

        let err = m.materialize(&JobHandle::from("j1"), None).await.unwrap_err();
        assert_matches!(err, MaterializeError::BundleNotReady { .. });
        assert_matches!(CoreError::from(err), CoreError::BundleNotReady(_));
    }
}
