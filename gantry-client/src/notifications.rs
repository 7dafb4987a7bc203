//! Notification endpoints

use gantry_core::domain::notification::{Notification, NotificationSubscription};
use gantry_core::dto::notification::{PublishRequest, SubscribeRequest};
use serde::Deserialize;
use serde_json::Value;

use crate::{OrchestratorClient, Result};

#[derive(Deserialize)]
struct RemovedResponse {
    removed: bool,
}

impl OrchestratorClient {
    /// Publishes a notification; the returned record carries the audit list
    /// of pipelines it triggered.
    pub async fn publish(&self, label: &str, payload: Value) -> Result<Notification> {
        let response = self
            .client
            .post(format!("{}/notification/publish", self.base_url))
            .json(&PublishRequest {
                label: label.to_string(),
                payload,
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Subscribes a pipeline to a label.
    pub async fn subscribe(
        &self,
        label: &str,
        pipeline: &str,
    ) -> Result<NotificationSubscription> {
        let response = self
            .client
            .post(format!("{}/notification/subscribe", self.base_url))
            .json(&SubscribeRequest {
                label: label.to_string(),
                pipeline: pipeline.to_string(),
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Removes the matching subscriptions.
    pub async fn unsubscribe(&self, label: &str, pipeline: &str) -> Result<bool> {
        let response = self
            .client
            .post(format!("{}/notification/unsubscribe", self.base_url))
            .json(&SubscribeRequest {
                label: label.to_string(),
                pipeline: pipeline.to_string(),
            })
            .send()
            .await?;
        let body: RemovedResponse = self.handle_response(response).await?;
        Ok(body.removed)
    }

    /// Every notification published under a label, oldest first.
    pub async fn list_notifications(&self, label: &str) -> Result<Vec<Notification>> {
        let response = self
            .client
            .get(format!("{}/notification/{}", self.base_url, label))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// The most recent notification under a label, if any.
    pub async fn last_notification(&self, label: &str) -> Result<Option<Notification>> {
        let response = self
            .client
            .get(format!("{}/notification/{}/last", self.base_url, label))
            .send()
            .await?;
        self.handle_response(response).await
    }
}
