//! Job orchestrator.
//!
//! [`Orchestrator`] owns the remote service clients, the bounded payload
//! and result stores, and one polling task per tracked job. It is created
//! once at startup and shared via `Arc` with request handlers.
//!
//! Per job it guarantees at most one poller and, through that poller's
//! [`TriggerLatch`], at most one analysis session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ctlens_compressor::api::CompressionService;
use ctlens_compressor::bundle::BundleMaterializer;
use ctlens_core::error::CoreError;
use ctlens_core::stage::StageSnapshot;
use ctlens_core::store::{BoundedStore, PayloadStore, ResultStore};
use ctlens_core::types::{AccumulatedDiagnosis, ClientStage, JobHandle, ResultRecord};
use ctlens_inference::api::InferenceService;
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::events::{EventBus, ScanEvent};
use crate::latch::TriggerLatch;
use crate::poller::JobPoller;
use crate::session::AnalysisSession;

/// How long [`Orchestrator::shutdown`] waits for each polling task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Client-facing status of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub job_id: JobHandle,
    pub stage: ClientStage,
    pub progress: f32,
    pub eta_seconds: u32,
    pub error_message: Option<String>,
}

impl StatusView {
    fn new(job_id: JobHandle, snapshot: &StageSnapshot) -> Self {
        Self {
            job_id,
            stage: snapshot.stage,
            progress: snapshot.progress,
            eta_seconds: snapshot.eta_seconds(),
            error_message: snapshot.error_message.clone(),
        }
    }
}

/// Final state of a job whose poller exited on its own.
#[derive(Debug, Clone)]
struct FinishedJob {
    snapshot: StageSnapshot,
    diagnosis: Option<AccumulatedDiagnosis>,
}

type JobMap = RwLock<HashMap<JobHandle, TrackedJob>>;

/// Bookkeeping for one tracked job.
struct TrackedJob {
    stage_rx: watch::Receiver<StageSnapshot>,
    diagnosis_rx: watch::Receiver<Option<AccumulatedDiagnosis>>,
    /// Per-job token (child of the master token).
    cancel: CancellationToken,
    task_handle: tokio::task::JoinHandle<()>,
}

pub struct Orchestrator {
    config: PipelineConfig,
    compressor: Arc<dyn CompressionService>,
    inference: Arc<dyn InferenceService>,
    materializer: Arc<BundleMaterializer>,
    payloads: Arc<PayloadStore>,
    results: Arc<ResultStore>,
    /// Jobs whose poller is still running.
    jobs: Arc<JobMap>,
    /// Terminal jobs, bounded like the result store.
    finished: Arc<BoundedStore<FinishedJob>>,
    events: Arc<EventBus>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        compressor: Arc<dyn CompressionService>,
        inference: Arc<dyn InferenceService>,
    ) -> Self {
        let payloads = Arc::new(PayloadStore::new(config.payload_cache_capacity));
        let results = Arc::new(ResultStore::new(config.result_cache_capacity));
        let finished = Arc::new(BoundedStore::new(config.result_cache_capacity));
        let materializer = Arc::new(BundleMaterializer::new(
            Arc::clone(&compressor),
            Arc::clone(&payloads),
        ));

        Self {
            config,
            compressor,
            inference,
            materializer,
            payloads,
            results,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            finished,
            events: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Upload a scan archive and start tracking the resulting job.
    pub async fn submit_upload(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<JobHandle, CoreError> {
        if contents.is_empty() {
            return Err(CoreError::Validation("Uploaded file is empty".into()));
        }

        let response = self.compressor.upload(file_name, contents).await?;
        tracing::info!(
            job_id = %response.job_id,
            file_name,
            status = ?response.status,
            "Scan uploaded",
        );

        self.track(response.job_id.clone()).await?;
        Ok(response.job_id)
    }

    /// Number of jobs whose poller is still running.
    pub async fn active_jobs(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Start polling `job`.
    ///
    /// Returns [`CoreError::Conflict`] if the job is already tracked or has
    /// finished and not been released yet.
    pub async fn track(&self, job: JobHandle) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Conflict("Orchestrator is shutting down".into()));
        }

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job) {
            return Err(CoreError::Conflict(format!("Job {job} is already tracked")));
        }
        if self.finished.contains(&job) {
            return Err(CoreError::Conflict(format!("Job {job} has already finished")));
        }

        let job_cancel = self.cancel.child_token();
        let (stage_tx, stage_rx) = watch::channel(StageSnapshot::queued());
        let (diagnosis_tx, diagnosis_rx) = watch::channel(None);
        let latch = Arc::new(TriggerLatch::new());

        let poller = JobPoller::new(
            job.clone(),
            Arc::clone(&self.compressor),
            Arc::clone(&self.materializer),
            Arc::clone(&latch),
            Arc::clone(&self.events),
            self.config.max_materialize_attempts,
        );

        let session = AnalysisSession {
            job: job.clone(),
            inference: Arc::clone(&self.inference),
            results: Arc::clone(&self.results),
            events: Arc::clone(&self.events),
            latch,
            diagnosis_tx,
            cancel: job_cancel.clone(),
            timeout: self.config.analysis_timeout,
        };

        let interval = self.config.poll_interval;
        let cancel = job_cancel.clone();
        let jobs_ref = Arc::clone(&self.jobs);
        let finished = Arc::clone(&self.finished);
        let task_job = job.clone();
        let task_handle = tokio::spawn(async move {
            poller
                .run(interval, cancel.clone(), stage_tx, move |payload| {
                    session.spawn(payload)
                })
                .await;
            retire(&jobs_ref, &finished, &task_job, &cancel).await;
        });

        jobs.insert(
            job.clone(),
            TrackedJob {
                stage_rx,
                diagnosis_rx,
                cancel: job_cancel,
                task_handle,
            },
        );

        tracing::info!(job_id = %job, "Tracking started");
        self.events.publish(ScanEvent::TrackingStarted { job_id: job });
        Ok(())
    }

    /// Current status of a job.
    ///
    /// `completed` is only reported while the job's result is still
    /// stored; once the result store evicts it the job is not found.
    pub async fn status(&self, job: &JobHandle) -> Result<StatusView, CoreError> {
        let snapshot = match self.jobs.read().await.get(job) {
            Some(tracked) => Some(tracked.stage_rx.borrow().clone()),
            None => self.finished.get(job).map(|done| done.snapshot),
        };

        match snapshot {
            Some(snapshot) if self.is_reportable(job, &snapshot) => {
                Ok(StatusView::new(job.clone(), &snapshot))
            }
            Some(_) => Err(not_found("job", job)),
            None if self.results.contains(job) => {
                Ok(StatusView::new(job.clone(), &StageSnapshot::completed()))
            }
            None => Err(not_found("job", job)),
        }
    }

    /// Live diagnosis of a job; empty until analysis starts.
    pub async fn diagnosis(&self, job: &JobHandle) -> Result<AccumulatedDiagnosis, CoreError> {
        let (snapshot, diagnosis) = match self.jobs.read().await.get(job) {
            Some(tracked) => (
                tracked.stage_rx.borrow().clone(),
                tracked.diagnosis_rx.borrow().clone(),
            ),
            None => {
                let done = self.finished.get(job).ok_or_else(|| not_found("job", job))?;
                (done.snapshot, done.diagnosis)
            }
        };

        if !self.is_reportable(job, &snapshot) {
            return Err(not_found("job", job));
        }
        Ok(diagnosis.unwrap_or_else(|| AccumulatedDiagnosis::new(job.clone())))
    }

    /// Final result of a job.
    pub fn results(&self, job: &JobHandle) -> Result<ResultRecord, CoreError> {
        self.results.get(job).ok_or_else(|| not_found("result", job))
    }

    /// Stop tracking `job` and drop its cached payload and result.
    pub async fn release(&self, job: &JobHandle) -> Result<(), CoreError> {
        let tracked = {
            let mut jobs = self.jobs.write().await;
            let tracked = jobs.remove(job);
            // Cancel under the lock so the polling task cannot retire the job.
            if let Some(tracked) = &tracked {
                tracked.cancel.cancel();
            }
            tracked
        };
        let finished = self.finished.remove(job);
        let payload = self.payloads.remove(job);
        let result = self.results.remove(job);

        if tracked.is_none() && finished.is_none() && payload.is_none() && result.is_none() {
            return Err(not_found("job", job));
        }

        tracing::info!(job_id = %job, "Tracking stopped");
        self.events.publish(ScanEvent::TrackingStopped { job_id: job.clone() });
        Ok(())
    }

    /// Cancel all polling and analysis tasks.
    ///
    /// Waits up to 5 seconds per task for a clean exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down orchestrator");
        self.cancel.cancel();

        // Drain first: exiting tasks take the write lock to retire.
        let drained: Vec<_> = self.jobs.write().await.drain().collect();
        for (job, tracked) in drained {
            tracing::debug!(job_id = %job, "Stopping polling task");
            tracked.cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, tracked.task_handle).await;
        }

        tracing::info!("Orchestrator shut down complete");
    }

    /// A `completed` snapshot is stale once its result has been evicted.
    fn is_reportable(&self, job: &JobHandle, snapshot: &StageSnapshot) -> bool {
        snapshot.stage != ClientStage::Completed || self.results.contains(job)
    }
}

/// Move a job whose poller exited on its own from `jobs` to `finished`.
///
/// A cancelled job was removed by `release` or `shutdown`, and any entry
/// now under its handle belongs to someone else.
async fn retire(
    jobs: &JobMap,
    finished: &BoundedStore<FinishedJob>,
    job: &JobHandle,
    cancel: &CancellationToken,
) {
    let mut jobs = jobs.write().await;
    if cancel.is_cancelled() {
        return;
    }
    let Some(tracked) = jobs.remove(job) else {
        return;
    };

    let done = FinishedJob {
        snapshot: tracked.stage_rx.borrow().clone(),
        diagnosis: tracked.diagnosis_rx.borrow().clone(),
    };
    tracing::debug!(job_id = %job, stage = %done.snapshot.stage, "Job retired");
    finished.insert(job.clone(), done);
}

fn not_found(entity: &'static str, job: &JobHandle) -> CoreError {
    CoreError::NotFound {
        entity,
        id: job.to_string(),
    }
}
