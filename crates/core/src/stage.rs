//! Mapping from the compression service's coarse job state onto the
//! client-facing stage model.

use serde::Serialize;

use crate::types::{ClientStage, RemoteJobState};

/// Message reported when a failed job carries no error text of its own.
pub const FALLBACK_FAILURE_MESSAGE: &str = "Compression job failed";

/// Map a remote state plus local payload readiness to a stage and progress.
///
/// `complete` only becomes `analyzing` once the analyzable payload exists;
/// until then the job is still reported as compressing. Unrecognized states
/// map to `queued` with zero progress instead of failing the poll.
pub fn map_stage(remote: RemoteJobState, payload_exists: bool) -> (ClientStage, f32) {
    match remote {
        RemoteJobState::Pending => (ClientStage::Queued, 0.1),
        RemoteJobState::Processing => (ClientStage::Compressing, 0.5),
        RemoteJobState::Complete if payload_exists => (ClientStage::Analyzing, 0.8),
        RemoteJobState::Complete => (ClientStage::Compressing, 0.7),
        RemoteJobState::Failed => (ClientStage::Error, 0.0),
        RemoteJobState::Unknown => (ClientStage::Queued, 0.0),
    }
}

/// Point-in-time stage view published to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSnapshot {
    pub stage: ClientStage,
    pub progress: f32,
    pub error_message: Option<String>,
}

impl StageSnapshot {
    /// Initial snapshot for a freshly submitted job.
    pub fn queued() -> Self {
        Self {
            stage: ClientStage::Queued,
            progress: 0.0,
            error_message: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            stage: ClientStage::Completed,
            progress: 1.0,
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            stage: ClientStage::Error,
            progress: 0.0,
            error_message: Some(message.into()),
        }
    }

    /// Build a snapshot from one poll result.
    ///
    /// For `failed` jobs the remote error text is carried verbatim, falling
    /// back to [`FALLBACK_FAILURE_MESSAGE`] when absent or blank.
    pub fn from_remote(
        remote: RemoteJobState,
        payload_exists: bool,
        remote_error: Option<&str>,
    ) -> Self {
        let (stage, progress) = map_stage(remote, payload_exists);
        let error_message = (stage == ClientStage::Error).then(|| {
            remote_error
                .filter(|msg| !msg.trim().is_empty())
                .unwrap_or(FALLBACK_FAILURE_MESSAGE)
                .to_string()
        });
        Self {
            stage,
            progress,
            error_message,
        }
    }

    /// Estimated seconds until a result is available.
    pub fn eta_seconds(&self) -> u32 {
        self.stage.eta_seconds()
    }
}
