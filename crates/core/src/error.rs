use crate::types::JobHandle;

/// Job-level error taxonomy shared by every crate in the workspace.
///
/// Fragment-level parse failures ([`CoreError::StreamParse`]) stay local to
/// the stream aggregator; everything else is surfaced to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// Network or HTTP failure talking to a remote service.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The job's artifact bundle cannot be materialized yet.
    #[error("Bundle not ready: {0}")]
    BundleNotReady(String),

    /// The job completed but its bundle holds no usable image artifact.
    #[error("No image artifact found for job {0}")]
    ArtifactNotFound(JobHandle),

    /// A single stream fragment could not be parsed.
    #[error("Stream parse error: {0}")]
    StreamParse(String),

    /// The analysis stream failed as a whole.
    #[error("Analysis stream failed: {0}")]
    StreamFatal(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl CoreError {
    /// Whether the failed operation may succeed if retried on a later poll.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transport(_) | CoreError::BundleNotReady(_))
    }
}
