//! Job lifecycle events and the in-process bus they are published on.
//!
//! Events are fire-and-forget: publishing with no subscriber drops the
//! event, and slow subscribers observe `RecvError::Lagged`.

use ctlens_core::types::{ClientStage, JobHandle};
use serde::Serialize;
use tokio::sync::broadcast;

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A lifecycle event of a tracked scan job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// A poller was started for the job.
    TrackingStarted { job_id: JobHandle },

    /// The job's client stage changed.
    StageChanged {
        job_id: JobHandle,
        stage: ClientStage,
        progress: f32,
    },

    /// A single poll failed; polling continues on the next tick.
    PollFailed { job_id: JobHandle, error: String },

    /// The analysis session was started.
    AnalysisStarted { job_id: JobHandle },

    /// The accumulated diagnosis text grew.
    DiagnosisUpdated {
        job_id: JobHandle,
        text_len: usize,
        findings: usize,
    },

    /// A result record was stored for the job.
    AnalysisCompleted { job_id: JobHandle, truncated: bool },

    /// The analysis session ended without a result.
    AnalysisFailed { job_id: JobHandle, error: String },

    /// Tracking was cancelled and the job's cached entries released.
    TrackingStopped { job_id: JobHandle },
}

/// Fan-out bus for [`ScanEvent`]s, shared via `Arc`.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: ScanEvent) {
        // Only fails when nobody is subscribed.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
