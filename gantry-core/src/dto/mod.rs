//! Data transfer objects for the control-plane API
//!
//! Request and response payloads exchanged between the orchestrator and its
//! clients. Domain entities are returned directly where their shape already
//! fits; summaries exist where the full record would be needlessly heavy.

pub mod execution;
pub mod notification;
pub mod pipeline;
pub mod schedule;

pub use execution::{ExecutionSummary, LaunchExecution, LaunchResponse};
pub use notification::{PublishRequest, SubscribeRequest};
pub use pipeline::{PipelineQuery, PipelineSummary, RegisterPipeline};
pub use schedule::{ScheduleRequest, ScheduleResponse};
