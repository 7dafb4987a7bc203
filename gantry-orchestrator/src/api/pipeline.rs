//! Pipeline API handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::pipeline::{PipelineQuery, PipelineSummary, RegisterPipeline};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::manager::Orchestrator;

/// POST /pipeline/register
pub async fn register_pipeline(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<RegisterPipeline>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("registering pipeline: {}", req.name);
    let pipeline = orchestrator.register_pipeline(req).await?;
    Ok(Json(pipeline))
}

/// GET /pipeline/{name}
pub async fn get_pipelines(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(name): Path<String>,
    Query(query): Query<PipelineQuery>,
) -> ApiResult<Json<Vec<PipelineSummary>>> {
    let pipelines = orchestrator.get_pipelines(&name, &query).await?;
    Ok(Json(pipelines.iter().map(PipelineSummary::from).collect()))
}

/// POST /pipeline/{name}/{version}/activate
pub async fn activate_pipeline(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path((name, version)): Path<(String, i64)>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("activating pipeline: {name} v{version}");
    let pipeline = orchestrator.activate_pipeline(&name, version).await?;
    Ok(Json(pipeline))
}

/// POST /pipeline/{name}/{version}/deactivate
pub async fn deactivate_pipeline(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path((name, version)): Path<(String, i64)>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("deactivating pipeline: {name} v{version}");
    let pipeline = orchestrator.deactivate_pipeline(&name, version).await?;
    Ok(Json(pipeline))
}
