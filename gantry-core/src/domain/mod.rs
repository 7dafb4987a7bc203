//! Core domain types
//!
//! Business entities shared between the orchestrator (which persists them)
//! and the worker and client crates.

pub mod execution;
pub mod notification;
pub mod pipeline;
pub mod schedule;

pub use execution::{ExecMode, Execution, ExecutionState, NoticeDetail, ResourceSpec};
pub use notification::{Notification, NotificationSubscription};
pub use pipeline::{ParamSpec, Pipeline, TaskRef};
pub use schedule::ScheduledEvent;
