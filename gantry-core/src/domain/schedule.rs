//! Scheduled event domain type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted intent to trigger a pipeline at a time.
///
/// Cancellation soft-deletes the event (active = false); the runtime timer
/// counterpart lives in the orchestrator's timer wheel, keyed by `uuid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Store-assigned identity, absent until first persisted.
    pub id: Option<i64>,
    pub uuid: Uuid,
    /// Human-facing label; defaults to the target pipeline name.
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub active: bool,
    pub trigger_time: DateTime<Utc>,
    /// Recurrence expression (e.g. "2h30m"); `None` for one-shot events.
    pub recurrence: Option<String>,
    /// Target pipeline name; the active version is resolved at fire time.
    pub pipeline: String,
    /// Opaque serialized arguments forwarded to the triggered execution.
    pub args: Option<String>,
}
