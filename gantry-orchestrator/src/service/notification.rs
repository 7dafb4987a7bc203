//! Notification bus
//!
//! Label-addressed publish/subscribe store. Publishing persists the
//! notification, then triggers the subscribed pipelines one by one in
//! registration order, waiting only for each execution to be initiated.

use async_trait::async_trait;
use chrono::Utc;
use gantry_core::args::TaskArgs;
use gantry_core::domain::notification::{Notification, NotificationSubscription};
use gantry_core::error::{GantryError, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::repository::notification as notification_repository;
use crate::retry::RetryPolicy;
use crate::service::catalog::PipelineCatalog;

/// Seam through which the bus starts subscriber executions.
#[async_trait]
pub trait PipelineTrigger: Send + Sync {
    /// Starts an execution of the named pipeline's active version and returns
    /// once it is initiated (not completed).
    async fn trigger(&self, pipeline: &str, args: TaskArgs) -> Result<Uuid>;
}

pub struct NotificationBus {
    pool: SqlitePool,
    retry: RetryPolicy,
    owner: String,
}

impl NotificationBus {
    pub fn new(pool: SqlitePool, retry: RetryPolicy, owner: impl Into<String>) -> Self {
        Self {
            pool,
            retry,
            owner: owner.into(),
        }
    }

    /// Subscribes a pipeline to a label. The pipeline must have an active
    /// version at subscription time.
    pub async fn subscribe(
        &self,
        label: &str,
        pipeline: &str,
        catalog: &PipelineCatalog,
    ) -> Result<NotificationSubscription> {
        if label.trim().is_empty() {
            return Err(GantryError::InvalidArgument(
                "notification label cannot be empty".to_string(),
            ));
        }
        let active = catalog.get_active(pipeline).await?;

        let subscription = NotificationSubscription {
            id: None,
            uuid: Uuid::new_v4(),
            label: label.to_string(),
            owner: self.owner.clone(),
            pipeline: active.name,
        };
        let stored = self
            .retry
            .run(|| notification_repository::insert_subscription(&self.pool, &subscription))
            .await
            .map_err(GantryError::storage)?;

        tracing::info!("pipeline {} subscribed to '{}'", stored.pipeline, label);
        Ok(stored)
    }

    /// Removes every subscription matching label and pipeline.
    pub async fn unsubscribe(&self, label: &str, pipeline: &str) -> Result<bool> {
        let removed = self
            .retry
            .run(|| notification_repository::delete_subscriptions(&self.pool, label, pipeline))
            .await
            .map_err(GantryError::storage)?;
        Ok(removed > 0)
    }

    pub async fn subscriptions(&self, label: &str) -> Result<Vec<NotificationSubscription>> {
        notification_repository::subscriptions_by_label(&self.pool, label)
            .await
            .map_err(GantryError::storage)
    }

    pub async fn subscriptions_for_pipeline(
        &self,
        pipeline: &str,
    ) -> Result<Vec<NotificationSubscription>> {
        notification_repository::subscriptions_by_pipeline(&self.pool, pipeline)
            .await
            .map_err(GantryError::storage)
    }

    /// Persists a notification, then triggers every subscriber in
    /// registration order. A subscriber that fails to trigger is logged and
    /// skipped; the others still run.
    pub async fn publish(
        &self,
        label: &str,
        payload: Value,
        trigger: &dyn PipelineTrigger,
    ) -> Result<Notification> {
        let notification = Notification {
            id: None,
            uuid: Uuid::new_v4(),
            label: label.to_string(),
            owner: self.owner.clone(),
            created_at: Utc::now(),
            payload: payload.clone(),
            triggered: Vec::new(),
        };
        let mut stored = self
            .retry
            .run(|| notification_repository::insert_notification(&self.pool, &notification))
            .await
            .map_err(GantryError::storage)?;

        let subscribers = self.subscriptions(label).await?;
        for subscriber in subscribers {
            let args = chain_args(&payload);
            match trigger.trigger(&subscriber.pipeline, args).await {
                Ok(execution) => {
                    tracing::info!(
                        "notification '{}' triggered {} (execution {})",
                        label,
                        subscriber.pipeline,
                        execution
                    );
                    stored.triggered.push(subscriber.pipeline.clone());
                    self.retry
                        .run(|| {
                            notification_repository::update_triggered(
                                &self.pool,
                                stored.uuid,
                                &stored.triggered,
                            )
                        })
                        .await
                        .map_err(GantryError::storage)?;
                }
                Err(err) => {
                    tracing::warn!(
                        "notification '{}' could not trigger {}: {err}",
                        label,
                        subscriber.pipeline
                    );
                }
            }
        }

        Ok(stored)
    }

    pub async fn last(&self, label: &str) -> Result<Option<Notification>> {
        notification_repository::last_by_label(&self.pool, label)
            .await
            .map_err(GantryError::storage)
    }

    pub async fn list(&self, label: &str) -> Result<Vec<Notification>> {
        notification_repository::list_by_label(&self.pool, label)
            .await
            .map_err(GantryError::storage)
    }
}

/// Maps a published payload onto execution arguments.
///
/// `event=finished` unwraps the carried result and forwards it positionally;
/// `event=failed` forwards the carried error the same way; any other payload
/// rides along as keyword data only.
fn chain_args(payload: &Value) -> TaskArgs {
    let mut args = TaskArgs::new().with_kwarg("event_data", payload.clone());

    match payload.get("event").and_then(Value::as_str) {
        Some("finished") => {
            let result = payload.get("result").cloned().unwrap_or(Value::Null);
            match result {
                Value::Array(items) => args.args = items,
                other => args.args = vec![other],
            }
        }
        Some("failed") => {
            let error = payload
                .get("result")
                .or_else(|| payload.get("error"))
                .cloned()
                .unwrap_or(Value::Null);
            args.args = vec![error];
        }
        _ => {}
    }

    args
}
