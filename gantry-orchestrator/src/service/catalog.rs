//! Pipeline catalog
//!
//! Versioned registry of pipeline implementations with
//! single-active-version-per-name semantics.

use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::pipeline::{PipelineQuery, RegisterPipeline};
use gantry_core::error::{GantryError, Result};
use gantry_core::task::TaskRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::repository::pipeline as pipeline_repository;
use crate::retry::RetryPolicy;

pub struct PipelineCatalog {
    pool: SqlitePool,
    retry: RetryPolicy,
    registry: Arc<TaskRegistry>,
    owner: String,
}

impl PipelineCatalog {
    pub fn new(
        pool: SqlitePool,
        retry: RetryPolicy,
        registry: Arc<TaskRegistry>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            retry,
            registry,
            owner: owner.into(),
        }
    }

    pub async fn is_registered(&self, name: &str) -> Result<bool> {
        pipeline_repository::exists(&self.pool, name)
            .await
            .map_err(GantryError::storage)
    }

    /// Registers a pipeline implementation.
    ///
    /// First registration of a name yields version 1, inactive. Re-registering
    /// an existing name without `new_version` returns the latest registration
    /// unchanged; with `new_version` it appends `max(version) + 1`, inactive.
    pub async fn register(&self, req: RegisterPipeline) -> Result<Pipeline> {
        if req.name.trim().is_empty() {
            return Err(GantryError::InvalidArgument(
                "pipeline name cannot be empty".to_string(),
            ));
        }
        if !self.registry.contains(&req.implementation.task) {
            return Err(GantryError::UnknownTask(req.implementation.task.clone()));
        }

        let owner = req.owner.clone().unwrap_or_else(|| self.owner.clone());
        let registered = self.is_registered(&req.name).await?;

        let version = if req.new_version {
            let current = pipeline_repository::max_version(&self.pool, &req.name)
                .await
                .map_err(GantryError::storage)?
                .ok_or_else(|| GantryError::PipelineNotRegistered(req.name.clone()))?;
            current + 1
        } else {
            if registered {
                let existing = pipeline_repository::latest(&self.pool, &req.name)
                    .await
                    .map_err(GantryError::storage)?
                    .ok_or_else(|| GantryError::PipelineNotFound(req.name.clone()))?;
                return Ok(existing);
            }
            1
        };

        let pipeline = Pipeline::new(&req.name, version, owner, req.tags, req.implementation);
        let stored = self
            .retry
            .run(|| pipeline_repository::insert(&self.pool, &pipeline))
            .await
            .map_err(GantryError::storage)?;

        tracing::info!("pipeline registered: {} v{}", stored.name, stored.version);
        Ok(stored)
    }

    /// Lookup by name plus optional version/active/tag filters.
    pub async fn get(&self, name: &str, query: &PipelineQuery) -> Result<Vec<Pipeline>> {
        let pipelines = pipeline_repository::list(&self.pool, name, query)
            .await
            .map_err(GantryError::storage)?;
        if pipelines.is_empty() {
            return Err(GantryError::PipelineNotFound(name.to_string()));
        }
        Ok(pipelines)
    }

    /// The single active version of a name.
    pub async fn get_active(&self, name: &str) -> Result<Pipeline> {
        let mut active = pipeline_repository::active_versions(&self.pool, name)
            .await
            .map_err(GantryError::storage)?;
        match active.len() {
            0 => Err(GantryError::NoActivePipeline(name.to_string())),
            1 => Ok(active.remove(0)),
            n => {
                tracing::error!("{n} active versions of pipeline {name}");
                Err(GantryError::MultipleActivePipelines(name.to_string()))
            }
        }
    }

    /// Activates one version, deactivating every sibling first.
    ///
    /// The two writes are not atomic: a reader between them can observe zero
    /// active versions for the name.
    pub async fn activate(&self, name: &str, version: i64) -> Result<Pipeline> {
        let target = pipeline_repository::find(&self.pool, name, version)
            .await
            .map_err(GantryError::storage)?
            .ok_or_else(|| GantryError::PipelineNotFound(name.to_string()))?;
        if target.active {
            return Ok(target);
        }

        self.retry
            .run(|| pipeline_repository::deactivate_all(&self.pool, name))
            .await
            .map_err(GantryError::storage)?;
        self.retry
            .run(|| pipeline_repository::set_active(&self.pool, name, version, true))
            .await
            .map_err(GantryError::storage)?;

        tracing::info!("pipeline activated: {name} v{version}");
        pipeline_repository::find(&self.pool, name, version)
            .await
            .map_err(GantryError::storage)?
            .ok_or_else(|| GantryError::PipelineNotFound(name.to_string()))
    }

    pub async fn deactivate(&self, name: &str, version: i64) -> Result<Pipeline> {
        let target = pipeline_repository::find(&self.pool, name, version)
            .await
            .map_err(GantryError::storage)?
            .ok_or_else(|| GantryError::PipelineNotFound(name.to_string()))?;
        if !target.active {
            return Ok(target);
        }

        self.retry
            .run(|| pipeline_repository::set_active(&self.pool, name, version, false))
            .await
            .map_err(GantryError::storage)?;

        tracing::info!("pipeline deactivated: {name} v{version}");
        pipeline_repository::find(&self.pool, name, version)
            .await
            .map_err(GantryError::storage)?
            .ok_or_else(|| GantryError::PipelineNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use gantry_core::domain::pipeline::TaskRef;

    fn catalog(pool: SqlitePool) -> PipelineCatalog {
        PipelineCatalog::new(
            pool,
            RetryPolicy::default(),
            Arc::new(TaskRegistry::with_builtins()),
            "ops",
        )
    }

    fn request(name: &str, new_version: bool) -> RegisterPipeline {
        RegisterPipeline {
            name: name.to_string(),
            implementation: TaskRef::named("echo"),
            owner: None,
            tags: vec![],
            new_version,
        }
    }

    #[tokio::test]
    async fn test_first_registration_is_version_one_inactive() {
        let catalog = catalog(db::memory_pool().await);
        let p = catalog.register(request("ingest", false)).await.unwrap();
        assert_eq!(p.version, 1);
        assert!(!p.active);
        assert_eq!(p.owner, "ops");
    }

    #[tokio::test]
    async fn test_reregistration_is_idempotent() {
        let catalog = catalog(db::memory_pool().await);
        let first = catalog.register(request("ingest", false)).await.unwrap();
        let again = catalog.register(request("ingest", false)).await.unwrap();
        assert_eq!(again.version, first.version);

        let all = catalog.get("ingest", &PipelineQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_new_version_requires_prior_registration() {
        let catalog = catalog(db::memory_pool().await);
        let err = catalog.register(request("ingest", true)).await.unwrap_err();
        assert!(matches!(err, GantryError::PipelineNotRegistered(_)));
    }

    #[tokio::test]
    async fn test_new_version_increments() {
        let catalog = catalog(db::memory_pool().await);
        catalog.register(request("ingest", false)).await.unwrap();
        let second = catalog.register(request("ingest", true)).await.unwrap();
        let third = catalog.register(request("ingest", true)).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(third.version, 3);
        assert!(!third.active);
    }

    #[tokio::test]
    async fn test_unknown_task_is_rejected() {
        let catalog = catalog(db::memory_pool().await);
        let mut req = request("ingest", false);
        req.implementation = TaskRef::named("no-such-task");
        let err = catalog.register(req).await.unwrap_err();
        assert!(matches!(err, GantryError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn test_at_most_one_active_version() {
        let catalog = catalog(db::memory_pool().await);
        catalog.register(request("ingest", false)).await.unwrap();
        catalog.register(request("ingest", true)).await.unwrap();
        catalog.register(request("ingest", true)).await.unwrap();

        // any interleaving of activations leaves exactly one active version
        catalog.activate("ingest", 1).await.unwrap();
        catalog.activate("ingest", 3).await.unwrap();
        catalog.activate("ingest", 2).await.unwrap();

        let active = catalog.get_active("ingest").await.unwrap();
        assert_eq!(active.version, 2);

        let query = PipelineQuery {
            active: Some(true),
            ..Default::default()
        };
        assert_eq!(catalog.get("ingest", &query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_leaves_no_active_version() {
        let catalog = catalog(db::memory_pool().await);
        catalog.register(request("ingest", false)).await.unwrap();
        catalog.activate("ingest", 1).await.unwrap();
        catalog.deactivate("ingest", 1).await.unwrap();

        let err = catalog.get_active("ingest").await.unwrap_err();
        assert!(matches!(err, GantryError::NoActivePipeline(_)));
    }

    #[tokio::test]
    async fn test_get_unknown_name_is_not_found() {
        let catalog = catalog(db::memory_pool().await);
        let err = catalog
            .get("ghost", &PipelineQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::PipelineNotFound(_)));
    }
}
