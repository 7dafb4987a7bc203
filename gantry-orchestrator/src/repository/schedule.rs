//! Scheduled event repository

use chrono::{DateTime, Utc};
use gantry_core::domain::schedule::ScheduledEvent;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{join_tags, split_tags};

pub async fn insert(
    pool: &SqlitePool,
    event: &ScheduledEvent,
) -> Result<ScheduledEvent, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO scheduled_events (
            uuid, name, owner, created_at, tags, active, trigger_time,
            recurrence, pipeline, args
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(event.uuid.to_string())
    .bind(&event.name)
    .bind(&event.owner)
    .bind(event.created_at)
    .bind(join_tags(&event.tags))
    .bind(event.active)
    .bind(event.trigger_time)
    .bind(&event.recurrence)
    .bind(&event.pipeline)
    .bind(&event.args)
    .execute(pool)
    .await?;

    let mut stored = event.clone();
    stored.id = Some(result.last_insert_rowid());
    Ok(stored)
}

/// Flips the active flag; cancellation is a soft delete.
pub async fn set_active(
    pool: &SqlitePool,
    uuid: Uuid,
    active: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE scheduled_events SET active = $1 WHERE uuid = $2")
        .bind(active)
        .bind(uuid.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_by_uuid(
    pool: &SqlitePool,
    uuid: Uuid,
) -> Result<Option<ScheduledEvent>, sqlx::Error> {
    let row = sqlx::query_as::<_, ScheduledEventRow>(
        r#"
        SELECT id, uuid, name, owner, created_at, tags, active, trigger_time,
               recurrence, pipeline, args
        FROM scheduled_events
        WHERE uuid = $1
        "#,
    )
    .bind(uuid.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Every active event; re-registered as timers at startup.
pub async fn list_active(pool: &SqlitePool) -> Result<Vec<ScheduledEvent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ScheduledEventRow>(
        r#"
        SELECT id, uuid, name, owner, created_at, tags, active, trigger_time,
               recurrence, pipeline, args
        FROM scheduled_events
        WHERE active = 1
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_for_pipeline(
    pool: &SqlitePool,
    pipeline: &str,
) -> Result<Vec<ScheduledEvent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ScheduledEventRow>(
        r#"
        SELECT id, uuid, name, owner, created_at, tags, active, trigger_time,
               recurrence, pipeline, args
        FROM scheduled_events
        WHERE pipeline = $1
        ORDER BY id ASC
        "#,
    )
    .bind(pipeline)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

// =============================================================================
// Database row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ScheduledEventRow {
    id: i64,
    uuid: String,
    name: String,
    owner: String,
    created_at: DateTime<Utc>,
    tags: String,
    active: bool,
    trigger_time: DateTime<Utc>,
    recurrence: Option<String>,
    pipeline: String,
    args: Option<String>,
}

impl From<ScheduledEventRow> for ScheduledEvent {
    fn from(row: ScheduledEventRow) -> Self {
        ScheduledEvent {
            id: Some(row.id),
            uuid: Uuid::parse_str(&row.uuid).unwrap_or_default(),
            name: row.name,
            owner: row.owner,
            created_at: row.created_at,
            tags: split_tags(&row.tags),
            active: row.active,
            trigger_time: row.trigger_time,
            recurrence: row.recurrence,
            pipeline: row.pipeline,
            args: row.args,
        }
    }
}
