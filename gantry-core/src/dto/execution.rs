//! Execution DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::args::TaskArgs;
use crate::domain::execution::{ExecMode, Execution, ExecutionState, NoticeDetail, ResourceSpec};

/// Request to execute the active version of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchExecution {
    pub pipeline: String,
    #[serde(default)]
    pub args: TaskArgs,
    #[serde(default)]
    pub mode: ExecMode,
    #[serde(default)]
    pub resources: Option<ResourceSpec>,
    /// Opt-in out-of-band completion notice.
    #[serde(default)]
    pub notice: Option<NoticeDetail>,
}

/// Handle returned by a launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub execution: Uuid,
}

/// Lightweight execution listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub uuid: Uuid,
    pub pipeline: String,
    pub version: i64,
    pub state: ExecutionState,
    pub mode: ExecMode,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
}

impl From<&Execution> for ExecutionSummary {
    fn from(e: &Execution) -> Self {
        Self {
            uuid: e.uuid,
            pipeline: e.pipeline_name.clone(),
            version: e.pipeline_version,
            state: e.state,
            mode: e.mode,
            created_at: e.created_at,
            started_at: e.started_at,
            ended_at: e.ended_at,
            elapsed_ms: e.elapsed_ms,
        }
    }
}
