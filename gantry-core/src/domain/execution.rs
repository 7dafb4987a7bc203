//! Execution domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pipeline::{Pipeline, TaskRef};

/// Execution lifecycle states.
///
/// Persisted as the numeric codes 1-6. Transitions are strictly
/// `Created -> Initialized -> Running -> {Finished | Error}`, with
/// `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Created,
    Initialized,
    Running,
    Finished,
    Error,
    Cancelled,
}

impl ExecutionState {
    /// Numeric state code stored in the execution record.
    pub fn code(self) -> i64 {
        match self {
            ExecutionState::Created => 1,
            ExecutionState::Initialized => 2,
            ExecutionState::Running => 3,
            ExecutionState::Finished => 4,
            ExecutionState::Error => 5,
            ExecutionState::Cancelled => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ExecutionState::Created),
            2 => Some(ExecutionState::Initialized),
            3 => Some(ExecutionState::Running),
            4 => Some(ExecutionState::Finished),
            5 => Some(ExecutionState::Error),
            6 => Some(ExecutionState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Finished | ExecutionState::Error | ExecutionState::Cancelled
        )
    }

    /// Cancellation is only valid while the execution is live.
    pub fn can_cancel(self) -> bool {
        !self.is_terminal()
    }
}

/// How the pipeline body is isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Pool-admitted subprocess on the orchestrator host.
    Local,
    /// Freshly allocated job on the cluster resource manager.
    Job,
}

impl Default for ExecMode {
    fn default() -> Self {
        ExecMode::Local
    }
}

/// Abstract resource request for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cores: u32,
    pub memory_mb: Option<u64>,
    pub partition: Option<String>,
    pub exclusive: bool,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cores: 1,
            memory_mb: None,
            partition: None,
            exclusive: false,
        }
    }
}

/// Detail level of an out-of-band completion notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeDetail {
    /// Pipeline name, state and timing only.
    Summary,
    /// Summary plus the captured output streams.
    Output,
    /// Everything, including the serialized return value or error.
    Full,
}

/// One run of a pipeline.
///
/// Owned by the execution engine for its lifetime and persisted on every
/// state transition. Serialized payloads (args, return value, captured
/// streams) are opaque to the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Store-assigned identity, absent until first persisted.
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub pipeline_name: String,
    pub pipeline_version: i64,
    pub owner: String,
    /// Set when a scheduled event triggered this run.
    pub schedule_uuid: Option<Uuid>,
    pub state: ExecutionState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
    pub mode: ExecMode,
    pub resources: ResourceSpec,
    /// Snapshot of the pipeline's implementation descriptor at launch time.
    pub implementation: TaskRef,
    pub args: Option<String>,
    pub return_value: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl Execution {
    pub fn new(pipeline: &Pipeline, mode: ExecMode, resources: ResourceSpec) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            pipeline_name: pipeline.name.clone(),
            pipeline_version: pipeline.version,
            owner: pipeline.owner.clone(),
            schedule_uuid: None,
            state: ExecutionState::Created,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            elapsed_ms: None,
            mode,
            resources,
            implementation: pipeline.implementation.clone(),
            args: None,
            return_value: None,
            stdout: None,
            stderr: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::TaskRef;

    #[test]
    fn test_state_codes() {
        for code in 1..=6 {
            let state = ExecutionState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert!(ExecutionState::from_code(0).is_none());
        assert!(ExecutionState::from_code(7).is_none());
    }

    #[test]
    fn test_terminal_and_cancellable() {
        assert!(ExecutionState::Created.can_cancel());
        assert!(ExecutionState::Initialized.can_cancel());
        assert!(ExecutionState::Running.can_cancel());
        assert!(!ExecutionState::Finished.can_cancel());
        assert!(!ExecutionState::Error.can_cancel());
        assert!(!ExecutionState::Cancelled.can_cancel());

        assert!(ExecutionState::Finished.is_terminal());
        assert!(!ExecutionState::Running.is_terminal());
    }

    #[test]
    fn test_execution_round_trip() {
        let pipeline = Pipeline::new("ingest", 3, "ops", vec![], TaskRef::named("echo"));
        let mut exec = Execution::new(&pipeline, ExecMode::Job, ResourceSpec::default());
        exec.state = ExecutionState::Finished;
        exec.started_at = Some(Utc::now());
        exec.ended_at = Some(Utc::now());
        exec.elapsed_ms = Some(1250);
        exec.args = Some(r#"{"args":[1]}"#.to_string());
        exec.return_value = Some("42".to_string());
        exec.stdout = Some("done\n".to_string());

        let encoded = serde_json::to_string(&exec).unwrap();
        let decoded: Execution = serde_json::from_str(&encoded).unwrap();
        assert_eq!(exec, decoded);
    }
}
