//! Notification domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A published, label-addressed event.
///
/// `triggered` is the append-only audit trail of pipeline names whose
/// executions this notification started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Store-assigned identity, absent until first persisted.
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub label: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
    #[serde(default)]
    pub triggered: Vec<String>,
}

/// A pipeline registered to react to notifications under a label.
///
/// Many subscriptions may share a label; at publish time they are resolved
/// in registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSubscription {
    /// Store-assigned identity, absent until first persisted.
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub label: String,
    pub owner: String,
    pub pipeline: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_round_trip() {
        let n = Notification {
            id: None,
            uuid: Uuid::new_v4(),
            label: "ingest-done".to_string(),
            owner: "ops".to_string(),
            created_at: Utc::now(),
            payload: json!({"event": "finished", "result": [1, 2]}),
            triggered: vec!["report".to_string()],
        };

        let encoded = serde_json::to_string(&n).unwrap();
        let decoded: Notification = serde_json::from_str(&encoded).unwrap();
        assert_eq!(n, decoded);
    }
}
