//! Per-job stage state machine.
//!
//! [`JobTracker`] owns the published [`StageSnapshot`] of one job and
//! decides which candidate snapshots from the stage mapper are accepted:
//!
//! - terminal stages (`completed`, `error`) are final;
//! - a candidate ranked below the current stage is ignored, so a job never
//!   regresses (e.g. back to `queued` after `compressing`);
//! - within the same stage, progress only moves forward.
//!
//! It is pure: no I/O, no clocks. The poller feeds it.

use ctlens_core::stage::StageSnapshot;
use ctlens_core::types::{ClientStage, JobHandle};

/// Message used when an analysis session produced no text.
pub const EMPTY_ANALYSIS_MESSAGE: &str = "AI analysis returned no output";

#[derive(Debug, Clone)]
pub struct JobTracker {
    job: JobHandle,
    current: StageSnapshot,
    materialize_failures: u32,
    max_materialize_attempts: u32,
}

impl JobTracker {
    pub fn new(job: JobHandle, max_materialize_attempts: u32) -> Self {
        Self {
            job,
            current: StageSnapshot::queued(),
            materialize_failures: 0,
            max_materialize_attempts: max_materialize_attempts.max(1),
        }
    }

    pub fn job(&self) -> &JobHandle {
        &self.job
    }

    pub fn snapshot(&self) -> &StageSnapshot {
        &self.current
    }

    pub fn stage(&self) -> ClientStage {
        self.current.stage
    }

    pub fn is_terminal(&self) -> bool {
        self.current.stage.is_terminal()
    }

    /// Offer a candidate snapshot. Returns `true` when the stage changed.
    pub fn observe(&mut self, candidate: StageSnapshot) -> bool {
        if self.is_terminal() {
            return false;
        }

        let current_rank = self.current.stage.rank();
        let candidate_rank = candidate.stage.rank();

        if candidate_rank < current_rank {
            tracing::debug!(
                job_id = %self.job,
                current = %self.current.stage,
                candidate = %candidate.stage,
                "Ignoring stage regression",
            );
            return false;
        }

        if candidate.stage == self.current.stage {
            self.current.progress = self.current.progress.max(candidate.progress);
            return false;
        }

        self.current = candidate;
        true
    }

    /// Record a failed materialization attempt.
    ///
    /// Returns `true` when the failure budget is exhausted and the job has
    /// moved to `error`.
    pub fn record_materialize_failure(&mut self, reason: &str) -> bool {
        if self.is_terminal() {
            return false;
        }

        self.materialize_failures += 1;
        if self.materialize_failures < self.max_materialize_attempts {
            return false;
        }

        self.fail(format!(
            "Analysis image unavailable after {} attempts: {reason}",
            self.materialize_failures
        ));
        true
    }

    pub fn reset_materialize_failures(&mut self) {
        self.materialize_failures = 0;
    }

    pub fn materialize_failures(&self) -> u32 {
        self.materialize_failures
    }

    /// Move to `completed`. `stream_error` is kept as the snapshot's error
    /// message when the result was synthesized from a truncated stream.
    pub fn complete(&mut self, stream_error: Option<String>) {
        if self.is_terminal() {
            return;
        }
        self.current = StageSnapshot {
            error_message: stream_error,
            ..StageSnapshot::completed()
        };
    }

    /// Move to `error`.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.current = StageSnapshot::error(message);
    }
}
