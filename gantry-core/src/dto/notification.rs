//! Notification DTOs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to publish a notification under a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub label: String,
    #[serde(default)]
    pub payload: Value,
}

/// Request to subscribe (or unsubscribe) a pipeline to a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub label: String,
    pub pipeline: String,
}
