//! Bounded async task primitive
//!
//! `spawn_with` runs a future on the runtime and hands back a handle with
//! wait/get/cancel semantics; `ProcessPools` enforces capacity-limited
//! admission with FIFO queueing per task identity.

mod handle;
mod pools;

pub use handle::{CancelToken, TaskHandle, TaskWaitError, spawn_cancellable, spawn_with};
pub use pools::{PoolPermit, ProcessPools};
