//! Pipeline repository

use chrono::{DateTime, Utc};
use gantry_core::domain::pipeline::{Pipeline, TaskRef};
use gantry_core::dto::pipeline::PipelineQuery;
use sqlx::SqlitePool;

use super::{join_tags, split_tags};

/// Inserts a registration and returns it with its store identity.
pub async fn insert(pool: &SqlitePool, pipeline: &Pipeline) -> Result<Pipeline, sqlx::Error> {
    let implementation =
        serde_json::to_string(&pipeline.implementation).expect("task ref is valid json");

    let result = sqlx::query(
        r#"
        INSERT INTO pipelines (name, version, owner, created_at, tags, active, implementation)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&pipeline.name)
    .bind(pipeline.version)
    .bind(&pipeline.owner)
    .bind(pipeline.created_at)
    .bind(join_tags(&pipeline.tags))
    .bind(pipeline.active)
    .bind(implementation)
    .execute(pool)
    .await?;

    let mut stored = pipeline.clone();
    stored.id = Some(result.last_insert_rowid());
    Ok(stored)
}

/// Finds one version of a name.
pub async fn find(
    pool: &SqlitePool,
    name: &str,
    version: i64,
) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, name, version, owner, created_at, tags, active, implementation
        FROM pipelines
        WHERE name = $1 AND version = $2
        "#,
    )
    .bind(name)
    .bind(version)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Latest registered version of a name.
pub async fn latest(pool: &SqlitePool, name: &str) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, name, version, owner, created_at, tags, active, implementation
        FROM pipelines
        WHERE name = $1
        ORDER BY version DESC
        LIMIT 1
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

pub async fn max_version(pool: &SqlitePool, name: &str) -> Result<Option<i64>, sqlx::Error> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM pipelines WHERE name = $1")
            .bind(name)
            .fetch_one(pool)
            .await?;
    Ok(version)
}

/// Lookup by name with optional version/active/tag filters.
pub async fn list(
    pool: &SqlitePool,
    name: &str,
    query: &PipelineQuery,
) -> Result<Vec<Pipeline>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, name, version, owner, created_at, tags, active, implementation
        FROM pipelines
        WHERE name = $1
        ORDER BY version ASC
        "#,
    )
    .bind(name)
    .fetch_all(pool)
    .await?;

    let pipelines = rows
        .into_iter()
        .map(Pipeline::from)
        .filter(|p| query.version.is_none_or(|v| p.version == v))
        .filter(|p| query.active.is_none_or(|a| p.active == a))
        .filter(|p| {
            query
                .tag
                .as_ref()
                .is_none_or(|t| p.tags.iter().any(|tag| tag == t))
        })
        .collect();

    Ok(pipelines)
}

/// All active versions of a name. More than one row is an invariant
/// violation the caller treats as fatal.
pub async fn active_versions(pool: &SqlitePool, name: &str) -> Result<Vec<Pipeline>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, name, version, owner, created_at, tags, active, implementation
        FROM pipelines
        WHERE name = $1 AND active = 1
        ORDER BY version ASC
        "#,
    )
    .bind(name)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Clears the active flag on every version of a name.
pub async fn deactivate_all(pool: &SqlitePool, name: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE pipelines SET active = 0 WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Sets the active flag on one version.
pub async fn set_active(
    pool: &SqlitePool,
    name: &str,
    version: i64,
    active: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE pipelines SET active = $1 WHERE name = $2 AND version = $3")
        .bind(active)
        .bind(name)
        .bind(version)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn exists(pool: &SqlitePool, name: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pipelines WHERE name = $1")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

// =============================================================================
// Database row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: i64,
    name: String,
    version: i64,
    owner: String,
    created_at: DateTime<Utc>,
    tags: String,
    active: bool,
    implementation: String,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        let implementation: TaskRef = serde_json::from_str(&row.implementation).unwrap_or_default();
        Pipeline {
            id: Some(row.id),
            name: row.name,
            version: row.version,
            owner: row.owner,
            created_at: row.created_at,
            tags: split_tags(&row.tags),
            active: row.active,
            implementation,
        }
    }
}
