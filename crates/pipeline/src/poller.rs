//! Polling loop for one job.
//!
//! [`JobPoller::tick`] performs one poll: fetch the remote job state,
//! materialize the bundle once the job is `complete`, feed the mapped stage
//! into the [`JobTracker`], and claim the analysis trigger on the first
//! entry into `analyzing`. [`JobPoller::run`] repeats that on a fixed
//! cadence until the job is terminal or the cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use ctlens_compressor::api::CompressionService;
use ctlens_compressor::bundle::BundleMaterializer;
use ctlens_core::error::CoreError;
use ctlens_core::stage::StageSnapshot;
use ctlens_core::types::{AnalyzablePayload, ClientStage, JobHandle, RemoteJobState};
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, ScanEvent};
use crate::latch::TriggerLatch;
use crate::session::SessionOutcome;
use crate::tracker::JobTracker;

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of a single poll.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub snapshot: StageSnapshot,
    /// Set on the one tick that claimed the analysis trigger.
    pub trigger: Option<AnalyzablePayload>,
}

pub struct JobPoller {
    job: JobHandle,
    service: Arc<dyn CompressionService>,
    materializer: Arc<BundleMaterializer>,
    latch: Arc<TriggerLatch>,
    events: Arc<EventBus>,
    tracker: JobTracker,
}

impl JobPoller {
    pub fn new(
        job: JobHandle,
        service: Arc<dyn CompressionService>,
        materializer: Arc<BundleMaterializer>,
        latch: Arc<TriggerLatch>,
        events: Arc<EventBus>,
        max_materialize_attempts: u32,
    ) -> Self {
        let tracker = JobTracker::new(job.clone(), max_materialize_attempts);
        Self {
            job,
            service,
            materializer,
            latch,
            events,
            tracker,
        }
    }

    pub fn snapshot(&self) -> &StageSnapshot {
        self.tracker.snapshot()
    }

    /// Poll the job once.
    ///
    /// Once the job is terminal this returns the final snapshot without
    /// touching the network. A failed status request is returned as
    /// [`CoreError::Transport`] and leaves the stage unchanged.
    pub async fn tick(&mut self) -> Result<TickOutcome, CoreError> {
        if self.tracker.is_terminal() {
            return Ok(self.outcome(None));
        }

        let result = match self.service.get_result(&self.job).await {
            Ok(result) => result,
            Err(e) => {
                let err = CoreError::from(e);
                tracing::warn!(job_id = %self.job, error = %err, "Status poll failed");
                self.events.publish(ScanEvent::PollFailed {
                    job_id: self.job.clone(),
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let mut payload = None;
        if result.status == RemoteJobState::Complete {
            match self
                .materializer
                .materialize(&self.job, result.metrics.as_ref())
                .await
            {
                Ok(p) => {
                    self.tracker.reset_materialize_failures();
                    payload = Some(p);
                }
                Err(e) => {
                    let escalated = self.tracker.record_materialize_failure(&e.to_string());
                    tracing::warn!(
                        job_id = %self.job,
                        error = %e,
                        attempt = self.tracker.materialize_failures(),
                        escalated,
                        "Bundle materialization failed",
                    );
                }
            }
        }

        let candidate =
            StageSnapshot::from_remote(result.status, payload.is_some(), result.error.as_deref());
        if self.tracker.observe(candidate) || self.tracker.is_terminal() {
            self.publish_stage();
        }

        let trigger = match payload {
            Some(p) if self.tracker.stage() == ClientStage::Analyzing && self.latch.try_begin() => {
                Some(p)
            }
            _ => None,
        };

        Ok(self.outcome(trigger))
    }

    /// Settle the final stage from the analysis session outcome.
    pub fn resolve(&mut self, outcome: SessionOutcome) {
        match outcome {
            SessionOutcome::Completed { stream_error, .. } => self.tracker.complete(stream_error),
            SessionOutcome::Failed(message) => self.tracker.fail(message),
        }
        self.publish_stage();
    }

    /// Poll until the job is terminal or `cancel` fires.
    ///
    /// `launch` is called at most once, with the payload of the tick that
    /// claimed the trigger; polling stops there and the loop waits for the
    /// session outcome. Every snapshot is published on `stage_tx`.
    pub async fn run<F>(
        mut self,
        interval: Duration,
        cancel: CancellationToken,
        stage_tx: watch::Sender<StageSnapshot>,
        launch: F,
    ) where
        F: FnOnce(AnalyzablePayload) -> oneshot::Receiver<SessionOutcome>,
    {
        let mut launch = Some(launch);
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(job_id = %self.job, "Polling started");

        let outcome_rx = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %self.job, "Polling cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            // In-flight requests are not aborted; their result is dropped.
            let tick = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %self.job, "Polling cancelled");
                    return;
                }
                tick = self.tick() => tick,
            };

            let Ok(TickOutcome { snapshot, trigger }) = tick else {
                continue;
            };
            stage_tx.send_replace(snapshot);

            if self.tracker.is_terminal() {
                tracing::info!(
                    job_id = %self.job,
                    stage = %self.tracker.stage(),
                    "Polling finished",
                );
                return;
            }

            if let Some(payload) = trigger {
                if let Some(launch) = launch.take() {
                    break launch(payload);
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %self.job, "Polling cancelled during analysis");
            }
            outcome = outcome_rx => {
                let outcome = outcome.unwrap_or_else(|_| {
                    SessionOutcome::Failed("Analysis session ended unexpectedly".into())
                });
                self.resolve(outcome);
                stage_tx.send_replace(self.tracker.snapshot().clone());
                tracing::info!(
                    job_id = %self.job,
                    stage = %self.tracker.stage(),
                    "Polling finished",
                );
            }
        }
    }

    fn outcome(&self, trigger: Option<AnalyzablePayload>) -> TickOutcome {
        TickOutcome {
            snapshot: self.tracker.snapshot().clone(),
            trigger,
        }
    }

    fn publish_stage(&self) {
        let snapshot = self.tracker.snapshot();
        tracing::debug!(
            job_id = %self.job,
            stage = %snapshot.stage,
            progress = snapshot.progress,
            "Stage changed",
        );
        self.events.publish(ScanEvent::StageChanged {
            job_id: self.job.clone(),
            stage: snapshot.stage,
            progress: snapshot.progress,
        });
    }
}
