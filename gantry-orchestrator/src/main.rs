//! Gantry Orchestrator
//!
//! Orchestrates versioned pipeline executions across two substrates: local
//! isolated worker processes with bounded per-task admission, and batch jobs
//! deployed through the cluster resource manager. A time-based scheduler and
//! a label-addressed notification bus chain executions into ad-hoc
//! workflows; everything is reachable through the control-plane API.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod events;
mod jobs;
mod manager;
mod notify;
mod pool;
mod repository;
mod retry;
mod scheduler;
mod service;

use crate::config::Config;
use crate::manager::Orchestrator;
use gantry_core::task::TaskRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gantry Orchestrator...");

    let config = Arc::new(Config::from_env());
    config.validate()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let registry = Arc::new(TaskRegistry::with_builtins());
    tracing::info!("Task registry: {:?}", registry.names());

    let orchestrator = Orchestrator::start(Arc::clone(&config), pool, registry).await?;

    let app = api::create_router(Arc::clone(&orchestrator));
    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    orchestrator.stop();
    Ok(())
}
