//! Shared domain types for scan jobs, payloads, and analysis results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::findings::extract_findings;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Modality reported when the bundle metadata does not declare one.
pub const DEFAULT_MODALITY: &str = "CT";

// ---------------------------------------------------------------------------
// JobHandle
// ---------------------------------------------------------------------------

/// Opaque job identifier assigned by the compression service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Remote and client-facing states
// ---------------------------------------------------------------------------

/// Coarse job state as reported by the compression service.
///
/// Unrecognized wire values deserialize to [`RemoteJobState::Unknown`] so a
/// newer service cannot break polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteJobState {
    Pending,
    Processing,
    Complete,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Client-facing processing stage.
///
/// Variants are declared in pipeline order; [`ClientStage::rank`] exposes
/// that order for monotonicity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStage {
    Queued,
    Normalizing,
    Compressing,
    Analyzing,
    Completed,
    Error,
}

impl ClientStage {
    /// Position in the pipeline. `Completed` and `Error` share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            ClientStage::Queued => 0,
            ClientStage::Normalizing => 1,
            ClientStage::Compressing => 2,
            ClientStage::Analyzing => 3,
            ClientStage::Completed | ClientStage::Error => 4,
        }
    }

    /// Terminal stages end polling for the job.
    pub fn is_terminal(self) -> bool {
        matches!(self, ClientStage::Completed | ClientStage::Error)
    }

    /// Rough time remaining until a result is available.
    pub fn eta_seconds(self) -> u32 {
        match self {
            ClientStage::Queued => 45,
            ClientStage::Normalizing => 35,
            ClientStage::Compressing => 20,
            ClientStage::Analyzing => 10,
            ClientStage::Completed | ClientStage::Error => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClientStage::Queued => "queued",
            ClientStage::Normalizing => "normalizing",
            ClientStage::Compressing => "compressing",
            ClientStage::Analyzing => "analyzing",
            ClientStage::Completed => "completed",
            ClientStage::Error => "error",
        }
    }
}

impl fmt::Display for ClientStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AnalyzablePayload
// ---------------------------------------------------------------------------

/// The representative image of a completed job, ready for AI analysis.
///
/// Built once per job by the bundle materializer and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzablePayload {
    pub job_handle: JobHandle,
    /// Base64 (standard alphabet, padded) encoding of the image artifact.
    pub image_base64: String,
    /// Bundle file name the image was read from.
    pub image_name: String,
    pub slice_count: u32,
    pub modality: String,
    pub prompt_override: Option<String>,
}

// ---------------------------------------------------------------------------
// AccumulatedDiagnosis
// ---------------------------------------------------------------------------

/// Running view of the analysis text for one job.
///
/// `text` only ever grows during a session; `findings` is recomputed from
/// the whole text by [`AccumulatedDiagnosis::refresh_findings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedDiagnosis {
    pub job_handle: JobHandle,
    pub text: String,
    pub findings: Vec<String>,
    pub is_complete: bool,
}

impl AccumulatedDiagnosis {
    pub fn new(job_handle: JobHandle) -> Self {
        Self {
            job_handle,
            text: String::new(),
            findings: Vec::new(),
            is_complete: false,
        }
    }

    /// Append a text delta to the document.
    pub fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Recompute the findings list from the full accumulated text.
    pub fn refresh_findings(&mut self) {
        self.findings = extract_findings(&self.text);
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// ResultRecord
// ---------------------------------------------------------------------------

/// Final analysis result for a job, combining the diagnosis text with the
/// payload metadata it was produced from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub job_handle: JobHandle,
    pub diagnosis: String,
    pub findings: Vec<String>,
    pub modality: String,
    pub slice_count: u32,
    /// Set when the stream ended with a fatal error before completing.
    pub truncated: bool,
    pub completed_at: Timestamp,
}

impl ResultRecord {
    /// Build a result from the accumulated text and the job's payload.
    ///
    /// Returns `None` when no text was accumulated. Findings are extracted
    /// from the full text rather than copied from the last snapshot.
    pub fn synthesize(
        diagnosis: &AccumulatedDiagnosis,
        payload: &AnalyzablePayload,
        truncated: bool,
    ) -> Option<Self> {
        if !diagnosis.has_text() {
            return None;
        }
        Some(Self {
            job_handle: diagnosis.job_handle.clone(),
            diagnosis: diagnosis.text.trim().to_string(),
            findings: extract_findings(&diagnosis.text),
            modality: payload.modality.clone(),
            slice_count: payload.slice_count,
            truncated,
            completed_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> AnalyzablePayload {
        AnalyzablePayload {
            job_handle: JobHandle::from("job-1"),
            image_base64: "aGk=".into(),
            image_name: "montage_overview.png".into(),
            slice_count: 8,
            modality: "CT".into(),
            prompt_override: None,
        }
    }

    #[test]
    fn remote_state_parses_known_values() {
        let state: RemoteJobState = serde_json::from_str(r#""processing""#).unwrap();
        assert_eq!(state, RemoteJobState::Processing);
    }

    #[test]
    fn remote_state_unknown_value_does_not_fail() {
        let state: RemoteJobState = serde_json::from_str(r#""archived""#).unwrap();
        assert_eq!(state, RemoteJobState::Unknown);
    }

    #[test]
    fn client_stage_serializes_lowercase() {
        let json = serde_json::to_string(&ClientStage::Analyzing).unwrap();
        assert_eq!(json, r#""analyzing""#);
    }

    #[test]
    fn stage_ranks_follow_pipeline_order() {
        assert!(ClientStage::Queued.rank() < ClientStage::Compressing.rank());
        assert!(ClientStage::Compressing.rank() < ClientStage::Analyzing.rank());
        assert_eq!(ClientStage::Completed.rank(), ClientStage::Error.rank());
    }

    #[test]
    fn job_handle_is_transparent_in_json() {
        let handle = JobHandle::from("abc");
        assert_eq!(serde_json::to_string(&handle).unwrap(), r#""abc""#);
    }

    #[test]
    fn synthesize_skips_empty_text() {
        let mut diagnosis = AccumulatedDiagnosis::new(JobHandle::from("job-1"));
        diagnosis.append("   ");
        assert!(ResultRecord::synthesize(&diagnosis, &payload(), false).is_none());
    }

    #[test]
    fn synthesize_carries_payload_metadata() {
        let mut diagnosis = AccumulatedDiagnosis::new(JobHandle::from("job-1"));
        diagnosis.append("• Small nodule in right upper lobe\n");

        let record = ResultRecord::synthesize(&diagnosis, &payload(), true).unwrap();
        assert_eq!(record.modality, "CT");
        assert_eq!(record.slice_count, 8);
        assert!(record.truncated);
        assert_eq!(record.findings, vec!["Small nodule in right upper lobe"]);
    }
}
