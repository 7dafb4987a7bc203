//! Execution API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::domain::execution::Execution;
use gantry_core::dto::execution::{ExecutionSummary, LaunchExecution, LaunchResponse};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::manager::Orchestrator;

/// POST /execution/launch
pub async fn launch_execution(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<LaunchExecution>,
) -> ApiResult<Json<LaunchResponse>> {
    tracing::info!("launching pipeline: {}", req.pipeline);
    let execution = orchestrator
        .execute(
            &req.pipeline,
            req.args,
            req.mode,
            req.resources.unwrap_or_default(),
            req.notice,
        )
        .await?;
    Ok(Json(LaunchResponse { execution }))
}

/// GET /execution/{uuid}
pub async fn get_execution(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Json<Execution>> {
    let execution = orchestrator.get_execution(uuid).await?;
    Ok(Json(execution))
}

/// POST /execution/{uuid}/cancel
pub async fn cancel_execution(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    tracing::info!("cancelling execution: {uuid}");
    let cancelled = orchestrator.cancel_execution(uuid).await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

/// GET /execution/running
pub async fn running_executions(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Json<Vec<ExecutionSummary>> {
    let running = orchestrator.running_executions();
    Json(running.iter().map(ExecutionSummary::from).collect())
}

/// GET /pipeline/{name}/executions
pub async fn list_executions(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<ExecutionSummary>>> {
    let executions = orchestrator.executions_for(&name).await?;
    Ok(Json(executions.iter().map(ExecutionSummary::from).collect()))
}

/// GET /pipeline/{name}/executions/last
pub async fn last_execution(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Option<Execution>>> {
    let execution = orchestrator.last_execution(&name).await?;
    Ok(Json(execution))
}
