//! Schedule API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::domain::schedule::ScheduledEvent;
use gantry_core::dto::schedule::{ScheduleRequest, ScheduleResponse};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::manager::Orchestrator;

/// POST /schedule
pub async fn create_schedule(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<ScheduleRequest>,
) -> ApiResult<Json<ScheduleResponse>> {
    tracing::info!("scheduling pipeline: {}", req.pipeline);
    let event = orchestrator.schedule_at(req).await?;
    Ok(Json(ScheduleResponse { uuid: event.uuid }))
}

/// GET /schedule/{uuid}
pub async fn get_schedule(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Json<ScheduledEvent>> {
    let event = orchestrator.get_schedule(uuid).await?;
    Ok(Json(event))
}

/// POST /schedule/{uuid}/cancel
pub async fn cancel_schedule(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    tracing::info!("cancelling schedule: {uuid}");
    let cancelled = orchestrator.cancel_schedule(uuid).await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

/// GET /pipeline/{name}/schedules
pub async fn list_schedules(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<ScheduledEvent>>> {
    let events = orchestrator.schedules_for(&name).await?;
    Ok(Json(events))
}
