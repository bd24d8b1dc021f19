//! Analysis session: one inference stream per job.
//!
//! Spawned by the poller's one-shot trigger. Streams the diagnosis into a
//! `watch` channel as it grows, enforces the wall-clock deadline, stores
//! the synthesized [`ResultRecord`], and reports a [`SessionOutcome`] back
//! to the poller over a `oneshot` channel.

use std::sync::Arc;
use std::time::Duration;

use ctlens_core::store::ResultStore;
use ctlens_core::types::{AccumulatedDiagnosis, AnalyzablePayload, JobHandle, ResultRecord};
use ctlens_inference::aggregator::consume_stream;
use ctlens_inference::api::{InferenceError, InferenceService};
use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, ScanEvent};
use crate::latch::TriggerLatch;
use crate::tracker::EMPTY_ANALYSIS_MESSAGE;

/// How an analysis session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// A result record exists for the job. `stream_error` is set when the
    /// stream failed after delivering some text.
    Completed {
        record: ResultRecord,
        stream_error: Option<String>,
    },
    /// No text was received.
    Failed(String),
}

/// Everything one analysis session needs, bundled so the poller can fire
/// it without knowing about inference.
pub struct AnalysisSession {
    pub job: JobHandle,
    pub inference: Arc<dyn InferenceService>,
    pub results: Arc<ResultStore>,
    pub events: Arc<EventBus>,
    pub latch: Arc<TriggerLatch>,
    pub diagnosis_tx: watch::Sender<Option<AccumulatedDiagnosis>>,
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

impl AnalysisSession {
    /// Start the session on a new task and return the outcome receiver.
    ///
    /// The receiver errors if the session is cancelled before finishing.
    pub fn spawn(self, payload: AnalyzablePayload) -> oneshot::Receiver<SessionOutcome> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        tokio::spawn(self.run(payload, outcome_tx));
        outcome_rx
    }

    async fn run(self, payload: AnalyzablePayload, outcome_tx: oneshot::Sender<SessionOutcome>) {
        tracing::info!(job_id = %self.job, image = %payload.image_name, "Starting AI analysis");
        self.events.publish(ScanEvent::AnalysisStarted {
            job_id: self.job.clone(),
        });

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::info!(job_id = %self.job, "Analysis cancelled");
                self.latch.finish();
                return;
            }
            outcome = self.stream(&payload) => outcome,
        };

        self.latch.finish();
        let _ = outcome_tx.send(outcome);
    }

    async fn stream(&self, payload: &AnalyzablePayload) -> SessionOutcome {
        let deadline = Instant::now() + self.timeout;
        let mut latest = AccumulatedDiagnosis::new(self.job.clone());

        let failure = match timeout_at(deadline, self.inference.analyze(payload)).await {
            Err(_) => Some(InferenceError::Timeout(self.timeout)),
            Ok(Err(e)) => Some(e),
            Ok(Ok(bytes)) => {
                let snapshots = consume_stream(self.job.clone(), bytes);
                tokio::pin!(snapshots);

                loop {
                    match timeout_at(deadline, snapshots.next()).await {
                        Err(_) => break Some(InferenceError::Timeout(self.timeout)),
                        Ok(None) => break None,
                        Ok(Some(Err(e))) => break Some(e),
                        Ok(Some(Ok(snapshot))) => {
                            self.events.publish(ScanEvent::DiagnosisUpdated {
                                job_id: self.job.clone(),
                                text_len: snapshot.text.len(),
                                findings: snapshot.findings.len(),
                            });
                            self.diagnosis_tx.send_replace(Some(snapshot.clone()));
                            latest = snapshot;
                        }
                    }
                }
            }
        };

        if let Some(e) = &failure {
            tracing::warn!(
                job_id = %self.job,
                error = %e,
                text_len = latest.text.len(),
                "Analysis stream ended with error",
            );
            // The session is over either way; the partial text is final.
            latest.is_complete = true;
            if latest.findings.is_empty() && latest.has_text() {
                latest.refresh_findings();
            }
            self.diagnosis_tx.send_replace(Some(latest.clone()));
        }

        self.conclude(&latest, payload, failure)
    }

    fn conclude(
        &self,
        diagnosis: &AccumulatedDiagnosis,
        payload: &AnalyzablePayload,
        failure: Option<InferenceError>,
    ) -> SessionOutcome {
        let truncated = failure.is_some();

        match ResultRecord::synthesize(diagnosis, payload, truncated) {
            Some(record) => {
                let record = self.results.insert_if_absent(self.job.clone(), record);
                tracing::info!(
                    job_id = %self.job,
                    findings = record.findings.len(),
                    truncated = record.truncated,
                    "Analysis result stored",
                );
                self.events.publish(ScanEvent::AnalysisCompleted {
                    job_id: self.job.clone(),
                    truncated: record.truncated,
                });
                SessionOutcome::Completed {
                    record,
                    stream_error: failure.map(|e| e.to_string()),
                }
            }
            None => {
                let error = failure
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| EMPTY_ANALYSIS_MESSAGE.to_string());
                tracing::error!(job_id = %self.job, error = %error, "Analysis produced no result");
                self.events.publish(ScanEvent::AnalysisFailed {
                    job_id: self.job.clone(),
                    error: error.clone(),
                });
                SessionOutcome::Failed(error)
            }
        }
    }
}
