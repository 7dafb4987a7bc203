//! API module
//!
//! Thin HTTP layer over the orchestrator façade. Each submodule handles the
//! endpoints for one domain; every error is mapped onto a small stable set
//! of response codes in `error`.

pub mod error;
pub mod execution;
pub mod health;
pub mod notification;
pub mod pipeline;
pub mod schedule;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::manager::Orchestrator;

/// Create the main API router with all endpoints
pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/register", post(pipeline::register_pipeline))
        .route("/pipeline/{name}", get(pipeline::get_pipelines))
        .route(
            "/pipeline/{name}/{version}/activate",
            post(pipeline::activate_pipeline),
        )
        .route(
            "/pipeline/{name}/{version}/deactivate",
            post(pipeline::deactivate_pipeline),
        )
        // Execution endpoints
        .route("/execution/launch", post(execution::launch_execution))
        .route("/execution/running", get(execution::running_executions))
        .route("/execution/{uuid}", get(execution::get_execution))
        .route("/execution/{uuid}/cancel", post(execution::cancel_execution))
        .route(
            "/pipeline/{name}/executions",
            get(execution::list_executions),
        )
        .route(
            "/pipeline/{name}/executions/last",
            get(execution::last_execution),
        )
        // Schedule endpoints
        .route("/schedule", post(schedule::create_schedule))
        .route("/schedule/{uuid}", get(schedule::get_schedule))
        .route("/schedule/{uuid}/cancel", post(schedule::cancel_schedule))
        .route("/pipeline/{name}/schedules", get(schedule::list_schedules))
        // Notification endpoints
        .route("/notification/publish", post(notification::publish))
        .route("/notification/subscribe", post(notification::subscribe))
        .route("/notification/unsubscribe", post(notification::unsubscribe))
        .route("/notification/{label}", get(notification::list_notifications))
        .route(
            "/notification/{label}/last",
            get(notification::last_notification),
        )
        // Add state and middleware
        .with_state(orchestrator)
        .layer(TraceLayer::new_for_http())
}
