//! Notification API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::domain::notification::{Notification, NotificationSubscription};
use gantry_core::dto::notification::{PublishRequest, SubscribeRequest};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::manager::Orchestrator;

/// POST /notification/publish
pub async fn publish(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<PublishRequest>,
) -> ApiResult<Json<Notification>> {
    tracing::info!("publishing notification: {}", req.label);
    let notification = orchestrator.publish(&req.label, req.payload).await?;
    Ok(Json(notification))
}

/// POST /notification/subscribe
pub async fn subscribe(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<NotificationSubscription>> {
    tracing::info!("subscribing {} to '{}'", req.pipeline, req.label);
    let subscription = orchestrator.subscribe(&req.label, &req.pipeline).await?;
    Ok(Json(subscription))
}

/// POST /notification/unsubscribe
pub async fn unsubscribe(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let removed = orchestrator.unsubscribe(&req.label, &req.pipeline).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// GET /notification/{label}
pub async fn list_notifications(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(label): Path<String>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = orchestrator.notifications_for(&label).await?;
    Ok(Json(notifications))
}

/// GET /notification/{label}/last
pub async fn last_notification(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(label): Path<String>,
) -> ApiResult<Json<Option<Notification>>> {
    let notification = orchestrator.last_notification(&label).await?;
    Ok(Json(notification))
}
