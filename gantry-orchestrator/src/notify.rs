//! Out-of-band completion notices
//!
//! Callers of `run` may opt into a notice when their execution reaches a
//! terminal state. Delivery is a narrow seam; the default sink writes the
//! notice to the log.

use async_trait::async_trait;
use gantry_core::domain::execution::{Execution, ExecutionState, NoticeDetail};
use uuid::Uuid;

/// Notice assembled from a finished execution at the requested detail level.
#[derive(Debug, Clone)]
pub struct ExecutionNotice {
    pub execution: Uuid,
    pub pipeline: String,
    pub version: i64,
    pub state: ExecutionState,
    pub elapsed_ms: Option<i64>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub result: Option<String>,
}

impl ExecutionNotice {
    pub fn from_execution(exec: &Execution, detail: NoticeDetail) -> Self {
        let mut notice = Self {
            execution: exec.uuid,
            pipeline: exec.pipeline_name.clone(),
            version: exec.pipeline_version,
            state: exec.state,
            elapsed_ms: exec.elapsed_ms,
            stdout: None,
            stderr: None,
            result: None,
        };
        if matches!(detail, NoticeDetail::Output | NoticeDetail::Full) {
            notice.stdout = exec.stdout.clone();
            notice.stderr = exec.stderr.clone();
        }
        if matches!(detail, NoticeDetail::Full) {
            notice.result = exec.return_value.clone();
        }
        notice
    }
}

/// Outbound notice delivery seam.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn deliver(&self, notice: &ExecutionNotice);
}

/// Default sink: the notice goes to the log.
pub struct LogNotifySink;

#[async_trait]
impl NotifySink for LogNotifySink {
    async fn deliver(&self, notice: &ExecutionNotice) {
        tracing::info!(
            execution = %notice.execution,
            pipeline = %notice.pipeline,
            version = notice.version,
            state = ?notice.state,
            elapsed_ms = notice.elapsed_ms,
            "execution notice"
        );
        if let Some(stdout) = &notice.stdout {
            tracing::info!(execution = %notice.execution, "captured output:\n{stdout}");
        }
        if let Some(stderr) = &notice.stderr
            && !stderr.is_empty()
        {
            tracing::info!(execution = %notice.execution, "captured errors:\n{stderr}");
        }
    }
}
