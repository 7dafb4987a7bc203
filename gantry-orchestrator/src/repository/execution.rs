//! Execution repository

use chrono::{DateTime, Utc};
use gantry_core::domain::execution::{ExecMode, Execution, ExecutionState, ResourceSpec};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Inserts a fresh execution record and returns it with its store identity.
pub async fn insert(pool: &SqlitePool, exec: &Execution) -> Result<Execution, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO executions (
            uuid, pipeline_name, pipeline_version, owner, schedule_uuid, state,
            created_at, started_at, ended_at, elapsed_ms, mode, resources,
            implementation, args, return_value, stdout, stderr
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(exec.uuid.to_string())
    .bind(&exec.pipeline_name)
    .bind(exec.pipeline_version)
    .bind(&exec.owner)
    .bind(exec.schedule_uuid.map(|u| u.to_string()))
    .bind(exec.state.code())
    .bind(exec.created_at)
    .bind(exec.started_at)
    .bind(exec.ended_at)
    .bind(exec.elapsed_ms)
    .bind(mode_to_str(exec.mode))
    .bind(serde_json::to_string(&exec.resources).expect("resource spec is valid json"))
    .bind(serde_json::to_string(&exec.implementation).expect("task ref is valid json"))
    .bind(&exec.args)
    .bind(&exec.return_value)
    .bind(&exec.stdout)
    .bind(&exec.stderr)
    .execute(pool)
    .await?;

    let mut stored = exec.clone();
    stored.id = Some(result.last_insert_rowid());
    Ok(stored)
}

/// Writes the full record back; called on every state transition.
pub async fn update(pool: &SqlitePool, exec: &Execution) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE executions
        SET state = $1, started_at = $2, ended_at = $3, elapsed_ms = $4,
            args = $5, return_value = $6, stdout = $7, stderr = $8
        WHERE uuid = $9
        "#,
    )
    .bind(exec.state.code())
    .bind(exec.started_at)
    .bind(exec.ended_at)
    .bind(exec.elapsed_ms)
    .bind(&exec.args)
    .bind(&exec.return_value)
    .bind(&exec.stdout)
    .bind(&exec.stderr)
    .bind(exec.uuid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_uuid(
    pool: &SqlitePool,
    uuid: Uuid,
) -> Result<Option<Execution>, sqlx::Error> {
    let row = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, uuid, pipeline_name, pipeline_version, owner, schedule_uuid,
               state, created_at, started_at, ended_at, elapsed_ms, mode,
               resources, implementation, args, return_value, stdout, stderr
        FROM executions
        WHERE uuid = $1
        "#,
    )
    .bind(uuid.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

pub async fn list_for_pipeline(
    pool: &SqlitePool,
    pipeline_name: &str,
) -> Result<Vec<Execution>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, uuid, pipeline_name, pipeline_version, owner, schedule_uuid,
               state, created_at, started_at, ended_at, elapsed_ms, mode,
               resources, implementation, args, return_value, stdout, stderr
        FROM executions
        WHERE pipeline_name = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(pipeline_name)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn last_for_pipeline(
    pool: &SqlitePool,
    pipeline_name: &str,
) -> Result<Option<Execution>, sqlx::Error> {
    let row = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, uuid, pipeline_name, pipeline_version, owner, schedule_uuid,
               state, created_at, started_at, ended_at, elapsed_ms, mode,
               resources, implementation, args, return_value, stdout, stderr
        FROM executions
        WHERE pipeline_name = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(pipeline_name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

// =============================================================================
// Helpers and row types
// =============================================================================

fn mode_to_str(mode: ExecMode) -> &'static str {
    match mode {
        ExecMode::Local => "local",
        ExecMode::Job => "job",
    }
}

fn str_to_mode(s: &str) -> ExecMode {
    match s {
        "job" => ExecMode::Job,
        _ => ExecMode::Local,
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: i64,
    uuid: String,
    pipeline_name: String,
    pipeline_version: i64,
    owner: String,
    schedule_uuid: Option<String>,
    state: i64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    elapsed_ms: Option<i64>,
    mode: String,
    resources: String,
    implementation: String,
    args: Option<String>,
    return_value: Option<String>,
    stdout: Option<String>,
    stderr: Option<String>,
}

impl From<ExecutionRow> for Execution {
    fn from(row: ExecutionRow) -> Self {
        Execution {
            id: Some(row.id),
            uuid: Uuid::parse_str(&row.uuid).unwrap_or_default(),
            pipeline_name: row.pipeline_name,
            pipeline_version: row.pipeline_version,
            owner: row.owner,
            schedule_uuid: row
                .schedule_uuid
                .as_deref()
                .and_then(|s| Uuid::parse_str(s).ok()),
            state: ExecutionState::from_code(row.state).unwrap_or(ExecutionState::Error),
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            elapsed_ms: row.elapsed_ms,
            mode: str_to_mode(&row.mode),
            resources: serde_json::from_str(&row.resources).unwrap_or_default(),
            implementation: serde_json::from_str(&row.implementation).unwrap_or_default(),
            args: row.args,
            return_value: row.return_value,
            stdout: row.stdout,
            stderr: row.stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use gantry_core::domain::pipeline::{Pipeline, TaskRef};

    fn sample() -> Execution {
        let pipeline = Pipeline::new("ingest", 2, "ops", vec![], TaskRef::named("echo"));
        Execution::new(&pipeline, ExecMode::Job, ResourceSpec::default())
    }

    #[tokio::test]
    async fn test_insert_find_round_trip() {
        let pool = db::memory_pool().await;
        let exec = sample();

        let stored = insert(&pool, &exec).await.unwrap();
        assert!(stored.id.is_some());

        let found = find_by_uuid(&pool, exec.uuid).await.unwrap().unwrap();
        assert_eq!(found.uuid, exec.uuid);
        assert_eq!(found.pipeline_name, "ingest");
        assert_eq!(found.pipeline_version, 2);
        assert_eq!(found.state, ExecutionState::Created);
        assert_eq!(found.mode, ExecMode::Job);
        assert_eq!(found.resources, ResourceSpec::default());
        assert_eq!(found.implementation.task, "echo");
    }

    #[tokio::test]
    async fn test_update_persists_transitions() {
        let pool = db::memory_pool().await;
        let mut exec = insert(&pool, &sample()).await.unwrap();

        exec.state = ExecutionState::Finished;
        exec.started_at = Some(Utc::now());
        exec.ended_at = Some(Utc::now());
        exec.elapsed_ms = Some(90);
        exec.return_value = Some("3.5".to_string());
        exec.stdout = Some("done\n".to_string());
        update(&pool, &exec).await.unwrap();

        let found = find_by_uuid(&pool, exec.uuid).await.unwrap().unwrap();
        assert_eq!(found.state, ExecutionState::Finished);
        assert_eq!(found.elapsed_ms, Some(90));
        assert_eq!(found.return_value.as_deref(), Some("3.5"));
        assert!(found.started_at.unwrap() <= found.ended_at.unwrap());
    }

    #[tokio::test]
    async fn test_listing_order_and_last() {
        let pool = db::memory_pool().await;
        let first = insert(&pool, &sample()).await.unwrap();
        let second = insert(&pool, &sample()).await.unwrap();

        let listed = list_for_pipeline(&pool, "ingest").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].uuid, first.uuid);

        let last = last_for_pipeline(&pool, "ingest").await.unwrap().unwrap();
        assert_eq!(last.uuid, second.uuid);

        assert!(last_for_pipeline(&pool, "other").await.unwrap().is_none());
    }
}
