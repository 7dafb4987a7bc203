//! Schedule DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::args::TaskArgs;

/// Request to schedule a pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub pipeline: String,
    /// Defaults to the pipeline name.
    #[serde(default)]
    pub label: Option<String>,
    /// Trigger expression: `HH:MM:SS` wall-clock or RFC 3339.
    pub trigger_time: String,
    /// Recurrence expression (e.g. "30m"); omit for one-shot.
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub args: TaskArgs,
}

/// Handle returned for a stored schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub uuid: Uuid,
}
