//! Error taxonomy shared across the orchestrator, worker and client.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Result type alias used throughout gantry.
pub type Result<T> = std::result::Result<T, GantryError>;

/// Everything that can go wrong inside the orchestrator.
///
/// Engine-internal and backend failures are converted into terminal ERROR
/// executions rather than crashing the orchestrator; the control-plane maps
/// each variant onto a small stable set of response codes.
#[derive(Debug, Error)]
pub enum GantryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("pipeline not registered: {0}")]
    PipelineNotRegistered(String),

    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("pipeline already registered: {0}")]
    PipelineAlreadyRegistered(String),

    #[error("no active version of pipeline {0}")]
    NoActivePipeline(String),

    /// Invariant violation: should be unreachable after any well-formed
    /// sequence of activate/deactivate calls.
    #[error("multiple active versions of pipeline {0}")]
    MultipleActivePipelines(String),

    #[error("unknown task implementation: {0}")]
    UnknownTask(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("scheduled event not found: {0}")]
    ScheduledEventNotFound(Uuid),

    #[error("trigger time {time} for {label} has already elapsed")]
    SchedulingPast {
        label: String,
        time: DateTime<Utc>,
    },

    #[error("backend not available: {0}")]
    BackendUnavailable(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("job submission failed: {0}")]
    SubmissionFailure(String),

    #[error("pipeline execution failed: {0}")]
    ExecutionFailure(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("credentials for pipeline {0} have expired")]
    CredentialsExpired(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GantryError {
    /// Wraps a persistence-layer error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        GantryError::Storage(err.to_string())
    }
}
