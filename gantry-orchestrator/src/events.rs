//! Orchestration events
//!
//! Components communicate through one tagged event type, relayed by the
//! manager and dispatched exhaustively by variant.

use gantry_core::args::TaskArgs;
use gantry_core::domain::execution::ExecutionState;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum OrchestrationEvent {
    /// A trigger source requests a pipeline execution.
    ExecutePipeline {
        schedule_uuid: Option<Uuid>,
        pipeline: String,
        args: TaskArgs,
    },
    /// A timer reached its fire instant.
    TimerFired { label: String, recurrent: bool },
    /// An execution transitioned to RUNNING.
    ExecutionStarted { execution: Uuid },
    /// An execution reached a terminal state.
    ExecutionFinished {
        execution: Uuid,
        state: ExecutionState,
    },
}

pub type EventSender = mpsc::UnboundedSender<OrchestrationEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<OrchestrationEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
