//! Notification and subscription repository

use chrono::{DateTime, Utc};
use gantry_core::domain::notification::{Notification, NotificationSubscription};
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn insert_notification(
    pool: &SqlitePool,
    notification: &Notification,
) -> Result<Notification, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (uuid, label, owner, created_at, payload, triggered)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(notification.uuid.to_string())
    .bind(&notification.label)
    .bind(&notification.owner)
    .bind(notification.created_at)
    .bind(notification.payload.to_string())
    .bind(serde_json::to_string(&notification.triggered).expect("trigger list is valid json"))
    .execute(pool)
    .await?;

    let mut stored = notification.clone();
    stored.id = Some(result.last_insert_rowid());
    Ok(stored)
}

/// Rewrites the append-only trigger audit list.
pub async fn update_triggered(
    pool: &SqlitePool,
    uuid: Uuid,
    triggered: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE notifications SET triggered = $1 WHERE uuid = $2")
        .bind(serde_json::to_string(triggered).expect("trigger list is valid json"))
        .bind(uuid.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_by_label(
    pool: &SqlitePool,
    label: &str,
) -> Result<Vec<Notification>, sqlx::Error> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT id, uuid, label, owner, created_at, payload, triggered
        FROM notifications
        WHERE label = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(label)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn last_by_label(
    pool: &SqlitePool,
    label: &str,
) -> Result<Option<Notification>, sqlx::Error> {
    let row = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT id, uuid, label, owner, created_at, payload, triggered
        FROM notifications
        WHERE label = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(label)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

pub async fn insert_subscription(
    pool: &SqlitePool,
    subscription: &NotificationSubscription,
) -> Result<NotificationSubscription, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO notification_subscriptions (uuid, label, owner, pipeline)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(subscription.uuid.to_string())
    .bind(&subscription.label)
    .bind(&subscription.owner)
    .bind(&subscription.pipeline)
    .execute(pool)
    .await?;

    let mut stored = subscription.clone();
    stored.id = Some(result.last_insert_rowid());
    Ok(stored)
}

/// Removes every subscription matching label and pipeline.
pub async fn delete_subscriptions(
    pool: &SqlitePool,
    label: &str,
    pipeline: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM notification_subscriptions WHERE label = $1 AND pipeline = $2",
    )
    .bind(label)
    .bind(pipeline)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Subscriptions for a label in registration order.
pub async fn subscriptions_by_label(
    pool: &SqlitePool,
    label: &str,
) -> Result<Vec<NotificationSubscription>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, uuid, label, owner, pipeline
        FROM notification_subscriptions
        WHERE label = $1
        ORDER BY id ASC
        "#,
    )
    .bind(label)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn subscriptions_by_pipeline(
    pool: &SqlitePool,
    pipeline: &str,
) -> Result<Vec<NotificationSubscription>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, uuid, label, owner, pipeline
        FROM notification_subscriptions
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
struct NotificationRow {
    id: i64,
    uuid: String,
    label: String,
    owner: String,
    created_at: DateTime<Utc>,
    payload: String,
    triggered: String,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: Some(row.id),
            uuid: Uuid::parse_str(&row.uuid).unwrap_or_default(),
            label: row.label,
            owner: row.owner,
            created_at: row.created_at,
            payload: serde_json::from_str(&row.payload).unwrap_or_default(),
            triggered: serde_json::from_str(&row.triggered).unwrap_or_default(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    uuid: String,
    label: String,
    owner: String,
    pipeline: String,
}

impl From<SubscriptionRow> for NotificationSubscription {
    fn from(row: SubscriptionRow) -> Self {
        NotificationSubscription {
            id: Some(row.id),
            uuid: Uuid::parse_str(&row.uuid).unwrap_or_default(),
            label: row.label,
            owner: row.owner,
            pipeline: row.pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn notification(label: &str) -> Notification {
        Notification {
            id: None,
            uuid: Uuid::new_v4(),
            label: label.to_string(),
            owner: "ops".to_string(),
            created_at: Utc::now(),
            payload: json!({"k": 1}),
            triggered: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_notification_round_trip_and_audit_update() {
        let pool = db::memory_pool().await;
        let n = insert_notification(&pool, &notification("done")).await.unwrap();

        update_triggered(&pool, n.uuid, &["report".to_string()])
            .await
            .unwrap();

        let listed = list_by_label(&pool, "done").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].triggered, vec!["report".to_string()]);
        assert_eq!(listed[0].payload, json!({"k": 1}));
    }

    #[tokio::test]
    async fn test_last_by_label() {
        let pool = db::memory_pool().await;
        insert_notification(&pool, &notification("done")).await.unwrap();
        let second = insert_notification(&pool, &notification("done")).await.unwrap();

        let last = last_by_label(&pool, "done").await.unwrap().unwrap();
        assert_eq!(last.uuid, second.uuid);
        assert!(last_by_label(&pool, "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscriptions_keep_registration_order() {
        let pool = db::memory_pool().await;
        for pipeline in ["report", "archive"] {
            let sub = NotificationSubscription {
                id: None,
                uuid: Uuid::new_v4(),
                label: "done".to_string(),
                owner: "ops".to_string(),
                pipeline: pipeline.to_string(),
            };
            insert_subscription(&pool, &sub).await.unwrap();
        }

        let subs = subscriptions_by_label(&pool, "done").await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].pipeline, "report");
        assert_eq!(subs[1].pipeline, "archive");

        assert_eq!(delete_subscriptions(&pool, "done", "report").await.unwrap(), 1);
        assert_eq!(subscriptions_by_label(&pool, "done").await.unwrap().len(), 1);
        assert_eq!(
            subscriptions_by_pipeline(&pool, "archive").await.unwrap().len(),
            1
        );
    }
}
