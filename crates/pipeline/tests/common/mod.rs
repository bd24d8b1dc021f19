//! In-process fakes for the compression and inference services.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ctlens_compressor::api::{CompressionService, CompressorApiError};
use ctlens_compressor::bundle::MONTAGE_FILE;
use ctlens_compressor::messages::{BundleListing, JobResult, UploadResponse};
use ctlens_core::stage::StageSnapshot;
use ctlens_core::types::{AnalyzablePayload, ClientStage, JobHandle, RemoteJobState};
use ctlens_inference::api::{ByteStream, InferenceError, InferenceService};
use ctlens_pipeline::config::PipelineConfig;
use ctlens_pipeline::orchestrator::{Orchestrator, StatusView};
use futures::StreamExt;

// ---------------------------------------------------------------------------
// Compression service
// ---------------------------------------------------------------------------

/// One scripted answer of `GET /result/{job_id}`.
#[derive(Debug, Clone)]
pub enum Poll {
    State(RemoteJobState),
    Failed(&'static str),
    TransportError,
}

/// Compression service that replays a script of poll answers.
///
/// The last answer repeats once the script is exhausted.
pub struct FakeCompressor {
    script: Mutex<VecDeque<Poll>>,
    last: Mutex<Poll>,
    files: Vec<String>,
    pub result_calls: AtomicUsize,
    pub bundle_calls: AtomicUsize,
    pub file_calls: AtomicUsize,
}

impl FakeCompressor {
    pub fn new(script: Vec<Poll>) -> Self {
        Self::with_files(script, &[MONTAGE_FILE, "slice_00_top.png", "metadata.json"])
    }

    pub fn with_files(script: Vec<Poll>, files: &[&str]) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Poll::State(RemoteJobState::Pending)),
            files: files.iter().map(|f| f.to_string()).collect(),
            result_calls: AtomicUsize::new(0),
            bundle_calls: AtomicUsize::new(0),
            file_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn next_poll(&self) -> Poll {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        last.clone()
    }
}

#[async_trait]
impl CompressionService for FakeCompressor {
    async fn upload(
        &self,
        _file_name: &str,
        _contents: Vec<u8>,
    ) -> Result<UploadResponse, CompressorApiError> {
        Ok(UploadResponse {
            job_id: JobHandle::from("uploaded-job"),
            status: RemoteJobState::Pending,
            message: Some("Upload received, compression started".into()),
        })
    }

    async fn get_result(&self, _job: &JobHandle) -> Result<JobResult, CompressorApiError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        let (status, error) = match self.next_poll() {
            Poll::State(state) => (state, None),
            Poll::Failed(message) => (RemoteJobState::Failed, Some(message.to_string())),
            Poll::TransportError => {
                return Err(CompressorApiError::ApiError {
                    status: 502,
                    body: "bad gateway".into(),
                })
            }
        };
        Ok(JobResult {
            status,
            metrics: Some(serde_json::json!({"num_slices": 8})),
            error,
            patient_id: None,
            created_at: None,
            completed_at: None,
        })
    }

    async fn get_bundle(&self, _job: &JobHandle) -> Result<BundleListing, CompressorApiError> {
        self.bundle_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BundleListing {
            files: self.files.clone(),
            metadata: serde_json::json!({"modality": "CT"}),
        })
    }

    async fn get_bundle_file(
        &self,
        _job: &JobHandle,
        file_name: &str,
    ) -> Result<Vec<u8>, CompressorApiError> {
        self.file_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("png:{file_name}").into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Inference service
// ---------------------------------------------------------------------------

/// Inference service that streams fixed chunks.
pub struct FakeInference {
    /// `Err` entries become [`InferenceError::Stream`] with that message.
    chunks: Vec<Result<Vec<u8>, String>>,
    /// Keep the stream open after the last chunk instead of ending it.
    hang: bool,
    pub analyze_calls: AtomicUsize,
}

impl FakeInference {
    pub fn streaming(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect(),
            hang: false,
            analyze_calls: AtomicUsize::new(0),
        }
    }

    pub fn hanging(chunks: &[&str]) -> Self {
        Self {
            hang: true,
            ..Self::streaming(chunks)
        }
    }

    pub fn failing_after(chunks: &[&str], error: &str) -> Self {
        let mut fake = Self::streaming(chunks);
        fake.chunks.push(Err(error.to_string()));
        fake
    }
}

#[async_trait]
impl InferenceService for FakeInference {
    async fn analyze(&self, _payload: &AnalyzablePayload) -> Result<ByteStream, InferenceError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);

        let chunks: Vec<_> = self
            .chunks
            .iter()
            .map(|c| match c {
                Ok(bytes) => Ok(bytes.clone()),
                Err(message) => Err(InferenceError::Stream(message.clone())),
            })
            .collect();

        let stream = futures::stream::iter(chunks);
        if self.hang {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pipeline settings fast enough for tests.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        poll_interval: Duration::from_millis(10),
        max_materialize_attempts: 3,
        analysis_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

pub fn orchestrator(
    compressor: Arc<FakeCompressor>,
    inference: Arc<FakeInference>,
    config: PipelineConfig,
) -> Orchestrator {
    Orchestrator::new(config, compressor, inference)
}

/// Wait until the job reaches a terminal stage and return its status.
pub async fn wait_terminal(orchestrator: &Orchestrator, job: &JobHandle) -> StatusView {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = orchestrator.status(job).await.expect("job should be known");
            if status.stage.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job should reach a terminal stage")
}

/// Whether a sequence of snapshots never regresses and stops at the first
/// terminal stage.
pub fn is_monotonic(stages: &[StageSnapshot]) -> bool {
    let mut seen_compressing = false;
    for (i, snap) in stages.iter().enumerate() {
        if seen_compressing && snap.stage == ClientStage::Queued {
            return false;
        }
        seen_compressing |= snap.stage.rank() >= ClientStage::Compressing.rank();
        if i > 0 && snap.stage.rank() < stages[i - 1].stage.rank() {
            return false;
        }
        if i > 0 && stages[i - 1].stage.is_terminal() && snap != &stages[i - 1] {
            return false;
        }
    }
    true
}
