//! Job deployment backends
//!
//! A job runs one task on an isolated worker: either a pool-admitted local
//! subprocess or a freshly allocated batch job on the cluster's resource
//! manager. Both backends resolve to the same task report.

mod batch;
mod handshake;
mod local;
mod rpc;

pub use batch::BatchJob;
pub use local::LocalJob;

use gantry_core::args::TaskArgs;
use gantry_core::domain::execution::ResourceSpec;

/// Submission parameters shared by both backends.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Task identity; also the admission pool key for local jobs.
    pub task: String,
    pub args: TaskArgs,
    pub resources: ResourceSpec,
    pub job_name: String,
}
