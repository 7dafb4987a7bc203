//! Scheduler service
//!
//! Persists scheduled events, keeps their runtime timers registered on the
//! wheel, and maps fired timers back onto pipeline execution requests.

use chrono::Utc;
use gantry_core::args::TaskArgs;
use gantry_core::domain::schedule::ScheduledEvent;
use gantry_core::dto::schedule::ScheduleRequest;
use gantry_core::error::{GantryError, Result};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::repository::schedule as schedule_repository;
use crate::retry::RetryPolicy;
use crate::scheduler::{TimeEvent, TimerWheel, timeparse};

/// A fired timer resolved into something the manager can execute.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub schedule_uuid: Uuid,
    pub pipeline: String,
    pub args: TaskArgs,
}

pub struct SchedulerService {
    pool: SqlitePool,
    retry: RetryPolicy,
    wheel: Arc<Mutex<TimerWheel>>,
    owner: String,
}

impl SchedulerService {
    pub fn new(
        pool: SqlitePool,
        retry: RetryPolicy,
        wheel: Arc<Mutex<TimerWheel>>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            retry,
            wheel,
            owner: owner.into(),
        }
    }

    /// Re-registers every persisted active event as a runtime timer.
    ///
    /// One-shot events whose trigger time passed while the orchestrator was
    /// down are deactivated instead of firing late.
    pub async fn restore(&self) -> Result<usize> {
        let events = schedule_repository::list_active(&self.pool)
            .await
            .map_err(GantryError::storage)?;

        let now = Utc::now();
        let mut restored = 0;
        for event in events {
            let recurrence = match &event.recurrence {
                Some(expr) => Some(timeparse::parse_recurrence(expr)?),
                None => None,
            };
            match TimeEvent::new(event.uuid.to_string(), event.trigger_time, recurrence, now) {
                Ok(timer) => {
                    self.wheel.lock().expect("timer wheel lock").add(timer);
                    restored += 1;
                }
                Err(GantryError::SchedulingPast { .. }) => {
                    tracing::warn!(
                        "scheduled event {} ({}) expired while offline, deactivating",
                        event.uuid,
                        event.name
                    );
                    self.retry
                        .run(|| schedule_repository::set_active(&self.pool, event.uuid, false))
                        .await
                        .map_err(GantryError::storage)?;
                }
                Err(err) => return Err(err),
            }
        }
        tracing::info!("restored {restored} scheduled event(s)");
        Ok(restored)
    }

    /// Stores a scheduled event and registers its timer.
    ///
    /// A one-shot trigger time already in the past is rejected here, before
    /// anything is persisted.
    pub async fn schedule_at(&self, req: ScheduleRequest) -> Result<ScheduledEvent> {
        let now = Utc::now();
        let trigger_time = timeparse::resolve(&req.trigger_time, now)?;
        let recurrence = match &req.recurrence {
            Some(expr) => Some(timeparse::parse_recurrence(expr)?),
            None => None,
        };

        let event = ScheduledEvent {
            id: None,
            uuid: Uuid::new_v4(),
            name: req.label.clone().unwrap_or_else(|| req.pipeline.clone()),
            owner: self.owner.clone(),
            created_at: now,
            tags: req.tags.clone(),
            active: true,
            trigger_time,
            recurrence: req.recurrence.clone(),
            pipeline: req.pipeline.clone(),
            args: Some(serde_json::to_string(&req.args)?),
        };

        // validates the trigger (SchedulingPast) before the event is stored
        let timer = TimeEvent::new(event.uuid.to_string(), trigger_time, recurrence, now)?;

        let stored = self
            .retry
            .run(|| schedule_repository::insert(&self.pool, &event))
            .await
            .map_err(GantryError::storage)?;
        self.wheel.lock().expect("timer wheel lock").add(timer);

        tracing::info!(
            "scheduled {} at {} (recurrence {:?})",
            stored.pipeline,
            stored.trigger_time,
            stored.recurrence
        );
        Ok(stored)
    }

    /// Soft-deletes the event and discards its timer. Idempotent on the
    /// timer side.
    pub async fn cancel(&self, uuid: Uuid) -> Result<bool> {
        let found = schedule_repository::find_by_uuid(&self.pool, uuid)
            .await
            .map_err(GantryError::storage)?
            .ok_or(GantryError::ScheduledEventNotFound(uuid))?;

        if found.active {
            self.retry
                .run(|| schedule_repository::set_active(&self.pool, uuid, false))
                .await
                .map_err(GantryError::storage)?;
        }
        self.wheel
            .lock()
            .expect("timer wheel lock")
            .remove(&uuid.to_string());
        Ok(true)
    }

    pub async fn get(&self, uuid: Uuid) -> Result<ScheduledEvent> {
        schedule_repository::find_by_uuid(&self.pool, uuid)
            .await
            .map_err(GantryError::storage)?
            .ok_or(GantryError::ScheduledEventNotFound(uuid))
    }

    pub async fn list_for(&self, pipeline: &str) -> Result<Vec<ScheduledEvent>> {
        schedule_repository::list_for_pipeline(&self.pool, pipeline)
            .await
            .map_err(GantryError::storage)
    }

    /// Resolves a fired timer into an execution request.
    ///
    /// Inactive events are ignored; a fired one-shot is deactivated before
    /// the request is handed back.
    pub async fn on_timer_fired(
        &self,
        label: &str,
        recurrent: bool,
    ) -> Result<Option<ExecuteRequest>> {
        let uuid = Uuid::parse_str(label)
            .map_err(|_| GantryError::InvalidArgument(format!("not a timer label: {label}")))?;

        let Some(event) = schedule_repository::find_by_uuid(&self.pool, uuid)
            .await
            .map_err(GantryError::storage)?
        else {
            tracing::warn!("timer fired for unknown scheduled event {uuid}");
            return Ok(None);
        };

        if !event.active {
            tracing::debug!("scheduled event {uuid} no longer active, ignoring fire");
            return Ok(None);
        }

        if !recurrent {
            self.retry
                .run(|| schedule_repository::set_active(&self.pool, uuid, false))
                .await
                .map_err(GantryError::storage)?;
        }

        let args = event
            .args
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        Ok(Some(ExecuteRequest {
            schedule_uuid: uuid,
            pipeline: event.pipeline,
            args,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::TimeDelta;

    async fn service() -> SchedulerService {
        SchedulerService::new(
            db::memory_pool().await,
            RetryPolicy::default(),
            Arc::new(Mutex::new(TimerWheel::new())),
            "ops",
        )
    }

    fn request(trigger_time: String, recurrence: Option<String>) -> ScheduleRequest {
        ScheduleRequest {
            pipeline: "ingest".to_string(),
            label: None,
            trigger_time,
            recurrence,
            tags: vec![],
            args: TaskArgs::new(),
        }
    }

    fn future_expr(seconds: i64) -> String {
        (Utc::now() + TimeDelta::seconds(seconds)).to_rfc3339()
    }

    fn past_expr(seconds: i64) -> String {
        (Utc::now() - TimeDelta::seconds(seconds)).to_rfc3339()
    }

    #[tokio::test]
    async fn test_schedule_registers_timer_and_row() {
        let service = service().await;
        let stored = service
            .schedule_at(request(future_expr(60), None))
            .await
            .unwrap();

        assert!(stored.active);
        assert_eq!(stored.name, "ingest");
        assert!(
            service
                .wheel
                .lock()
                .unwrap()
                .contains(&stored.uuid.to_string())
        );
    }

    #[tokio::test]
    async fn test_one_shot_in_the_past_is_rejected_before_storing() {
        let service = service().await;
        let err = service
            .schedule_at(request(past_expr(60), None))
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::SchedulingPast { .. }));
        assert!(service.wheel.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recurrent_past_base_is_accepted() {
        let service = service().await;
        let stored = service
            .schedule_at(request(past_expr(60), Some("30s".to_string())))
            .await
            .unwrap();
        assert!(service.wheel.lock().unwrap().contains(&stored.uuid.to_string()));
    }

    #[tokio::test]
    async fn test_cancel_soft_deletes_and_discards_timer() {
        let service = service().await;
        let stored = service
            .schedule_at(request(future_expr(60), None))
            .await
            .unwrap();

        assert!(service.cancel(stored.uuid).await.unwrap());
        assert!(!service.get(stored.uuid).await.unwrap().active);
        assert!(service.wheel.lock().unwrap().is_empty());

        // cancelling again still succeeds; the timer removal is idempotent
        assert!(service.cancel(stored.uuid).await.unwrap());

        let err = service.cancel(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, GantryError::ScheduledEventNotFound(_)));
    }

    #[tokio::test]
    async fn test_fired_one_shot_deactivates_and_requests_execution() {
        let service = service().await;
        let stored = service
            .schedule_at(request(future_expr(60), None))
            .await
            .unwrap();

        let request = service
            .on_timer_fired(&stored.uuid.to_string(), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.pipeline, "ingest");
        assert_eq!(request.schedule_uuid, stored.uuid);

        // deactivated: a second fire of the same label is ignored
        assert!(
            service
                .on_timer_fired(&stored.uuid.to_string(), false)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_fired_recurrent_event_stays_active() {
        let service = service().await;
        let stored = service
            .schedule_at(request(future_expr(1), Some("2s".to_string())))
            .await
            .unwrap();

        let first = service
            .on_timer_fired(&stored.uuid.to_string(), true)
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(service.get(stored.uuid).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_restore_deactivates_expired_one_shots() {
        let pool = db::memory_pool().await;
        let wheel = Arc::new(Mutex::new(TimerWheel::new()));
        let service = SchedulerService::new(
            pool.clone(),
            RetryPolicy::default(),
            Arc::clone(&wheel),
            "ops",
        );

        // a live recurring event and a stale one-shot, as they would be
        // found at startup
        let live = ScheduledEvent {
            id: None,
            uuid: Uuid::new_v4(),
            name: "beat".to_string(),
            owner: "ops".to_string(),
            created_at: Utc::now(),
            tags: vec![],
            active: true,
            trigger_time: Utc::now() - TimeDelta::seconds(90),
            recurrence: Some("1m".to_string()),
            pipeline: "ingest".to_string(),
            args: None,
        };
        let stale = ScheduledEvent {
            recurrence: None,
            uuid: Uuid::new_v4(),
            name: "once".to_string(),
            ..live.clone()
        };
        schedule_repository::insert(&pool, &live).await.unwrap();
        schedule_repository::insert(&pool, &stale).await.unwrap();

        assert_eq!(service.restore().await.unwrap(), 1);
        assert!(wheel.lock().unwrap().contains(&live.uuid.to_string()));
        assert!(!service.get(stale.uuid).await.unwrap().active);
    }
}
