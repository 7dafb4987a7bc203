//! Orchestrator façade
//!
//! Composes the catalog, the execution engine, the scheduler and the
//! notification bus behind one interface, and relays orchestration events
//! between them. One instance owns all shared state (active executions,
//! admission pools, timer wheel), so several orchestrators can coexist in
//! one process.

use async_trait::async_trait;
use gantry_core::args::TaskArgs;
use gantry_core::domain::execution::{ExecMode, Execution, NoticeDetail, ResourceSpec};
use gantry_core::domain::notification::{Notification, NotificationSubscription};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::domain::schedule::ScheduledEvent;
use gantry_core::dto::pipeline::{PipelineQuery, RegisterPipeline};
use gantry_core::dto::schedule::ScheduleRequest;
use gantry_core::error::{GantryError, Result};
use gantry_core::task::TaskRegistry;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::events::{self, EventReceiver, EventSender, OrchestrationEvent};
use crate::notify::{LogNotifySink, NotifySink};
use crate::pool::ProcessPools;
use crate::retry::RetryPolicy;
use crate::scheduler::{self, TimerWheel};
use crate::service::execution::{ExecutionEngine, JobLauncher, StandardLauncher};
use crate::service::{NotificationBus, PipelineCatalog, PipelineTrigger, SchedulerService};

/// Credential/secret service seam.
///
/// Consulted before every execution; the real service lives elsewhere.
pub trait CredentialGate: Send + Sync {
    fn is_valid(&self, pipeline: &str) -> bool;
    fn fetch_secret(&self, label: &str) -> Result<Vec<u8>>;
}

/// Default gate: every pipeline is valid, no secrets are stored.
pub struct PermissiveGate;

impl CredentialGate for PermissiveGate {
    fn is_valid(&self, _pipeline: &str) -> bool {
        true
    }

    fn fetch_secret(&self, label: &str) -> Result<Vec<u8>> {
        Err(GantryError::InvalidArgument(format!(
            "no secret stored under {label}"
        )))
    }
}

pub struct Orchestrator {
    pub catalog: PipelineCatalog,
    pub engine: Arc<ExecutionEngine>,
    pub scheduler: SchedulerService,
    pub notifications: NotificationBus,
    gate: Arc<dyn CredentialGate>,
    events: EventSender,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Builds and starts an orchestrator with the production backends.
    pub async fn start(
        config: Arc<Config>,
        pool: SqlitePool,
        registry: Arc<TaskRegistry>,
    ) -> Result<Arc<Self>> {
        let pools = Arc::new(ProcessPools::new());
        let launcher = Arc::new(StandardLauncher::new(Arc::clone(&config), pools));
        Self::start_with(
            config,
            pool,
            registry,
            launcher,
            Arc::new(PermissiveGate),
            Arc::new(LogNotifySink),
        )
        .await
    }

    /// Full-injection constructor; the tests use it to swap the launcher,
    /// the credential gate and the notify sink.
    pub async fn start_with(
        config: Arc<Config>,
        pool: SqlitePool,
        registry: Arc<TaskRegistry>,
        launcher: Arc<dyn JobLauncher>,
        gate: Arc<dyn CredentialGate>,
        notify: Arc<dyn NotifySink>,
    ) -> Result<Arc<Self>> {
        let retry = RetryPolicy::default();
        let (events_tx, events_rx) = events::channel();
        let wheel = Arc::new(Mutex::new(TimerWheel::new()));

        let catalog = PipelineCatalog::new(
            pool.clone(),
            retry.clone(),
            Arc::clone(&registry),
            config.owner.clone(),
        );
        let engine = ExecutionEngine::new(
            pool.clone(),
            retry.clone(),
            launcher,
            events_tx.clone(),
            notify,
        );
        let scheduler = SchedulerService::new(
            pool.clone(),
            retry.clone(),
            Arc::clone(&wheel),
            config.owner.clone(),
        );
        let notifications = NotificationBus::new(pool, retry, config.owner.clone());

        let orchestrator = Arc::new(Self {
            catalog,
            engine,
            scheduler,
            notifications,
            gate,
            events: events_tx.clone(),
            background: Mutex::new(Vec::new()),
        });

        orchestrator.scheduler.restore().await?;

        let timer_loop =
            scheduler::start_polling(wheel, config.scheduler_resolution, events_tx);
        let relay = tokio::spawn(Arc::clone(&orchestrator).relay(events_rx));
        orchestrator
            .background
            .lock()
            .expect("background task list")
            .extend([timer_loop, relay]);

        tracing::info!("orchestrator started");
        Ok(orchestrator)
    }

    /// Event relay: routes every orchestration event to its handler.
    async fn relay(self: Arc<Self>, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            match event {
                OrchestrationEvent::TimerFired { label, recurrent } => {
                    match self.scheduler.on_timer_fired(&label, recurrent).await {
                        Ok(Some(request)) => {
                            if let Err(err) = self
                                .execute_scheduled(
                                    request.schedule_uuid,
                                    &request.pipeline,
                                    request.args,
                                )
                                .await
                            {
                                tracing::error!(
                                    "scheduled execution of {} failed to start: {err}",
                                    request.pipeline
                                );
                            }
                        }
                        Ok(None) => {}
                        Err(err) => tracing::error!("timer {label} could not be resolved: {err}"),
                    }
                }
                OrchestrationEvent::ExecutePipeline {
                    schedule_uuid,
                    pipeline,
                    args,
                } => {
                    let outcome = match schedule_uuid {
                        Some(uuid) => self.execute_scheduled(uuid, &pipeline, args).await,
                        None => {
                            self.execute(
                                &pipeline,
                                args,
                                ExecMode::default(),
                                ResourceSpec::default(),
                                None,
                            )
                            .await
                        }
                    };
                    if let Err(err) = outcome {
                        tracing::error!("execution of {pipeline} failed to start: {err}");
                    }
                }
                OrchestrationEvent::ExecutionStarted { execution } => {
                    tracing::debug!("execution started: {execution}");
                }
                OrchestrationEvent::ExecutionFinished { execution, state } => {
                    tracing::info!("execution finished: {execution} ({state:?})");
                }
            }
        }
        tracing::debug!("event relay stopped");
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    pub async fn register_pipeline(&self, req: RegisterPipeline) -> Result<Pipeline> {
        self.catalog.register(req).await
    }

    pub async fn get_pipelines(&self, name: &str, query: &PipelineQuery) -> Result<Vec<Pipeline>> {
        self.catalog.get(name, query).await
    }

    pub async fn get_active_pipeline(&self, name: &str) -> Result<Pipeline> {
        self.catalog.get_active(name).await
    }

    pub async fn activate_pipeline(&self, name: &str, version: i64) -> Result<Pipeline> {
        self.catalog.activate(name, version).await
    }

    pub async fn deactivate_pipeline(&self, name: &str, version: i64) -> Result<Pipeline> {
        self.catalog.deactivate(name, version).await
    }

    // =========================================================================
    // Executions
    // =========================================================================

    /// Executes the active version of a pipeline. Returns once the execution
    /// is initiated; completion is observed through the accessors.
    pub async fn execute(
        &self,
        pipeline_name: &str,
        args: TaskArgs,
        mode: ExecMode,
        resources: ResourceSpec,
        notice: Option<NoticeDetail>,
    ) -> Result<Uuid> {
        if !self.gate.is_valid(pipeline_name) {
            return Err(GantryError::CredentialsExpired(pipeline_name.to_string()));
        }
        let pipeline = self.catalog.get_active(pipeline_name).await?;
        let exec = self
            .engine
            .create(&pipeline, mode, resources, None)
            .await?;
        self.engine
            .run(exec, args, notice)
            .await
    }

    async fn execute_scheduled(
        &self,
        schedule_uuid: Uuid,
        pipeline_name: &str,
        args: TaskArgs,
    ) -> Result<Uuid> {
        if !self.gate.is_valid(pipeline_name) {
            return Err(GantryError::CredentialsExpired(pipeline_name.to_string()));
        }
        let pipeline = self.catalog.get_active(pipeline_name).await?;
        let exec = self
            .engine
            .create(
                &pipeline,
                ExecMode::default(),
                ResourceSpec::default(),
                Some(schedule_uuid),
            )
            .await?;
        self.engine
            .run(exec, args, None)
            .await
    }

    pub async fn get_execution(&self, uuid: Uuid) -> Result<Execution> {
        self.engine.get(uuid).await
    }

    pub async fn cancel_execution(&self, uuid: Uuid) -> Result<bool> {
        self.engine.cancel(uuid).await
    }

    pub async fn executions_for(&self, pipeline: &str) -> Result<Vec<Execution>> {
        self.engine.list_for(pipeline).await
    }

    pub async fn last_execution(&self, pipeline: &str) -> Result<Option<Execution>> {
        self.engine.last_for(pipeline).await
    }

    pub fn running_executions(&self) -> Vec<Execution> {
        self.engine.running()
    }

    // =========================================================================
    // Schedules
    // =========================================================================

    pub async fn schedule_at(&self, req: ScheduleRequest) -> Result<ScheduledEvent> {
        self.scheduler.schedule_at(req).await
    }

    pub async fn cancel_schedule(&self, uuid: Uuid) -> Result<bool> {
        self.scheduler.cancel(uuid).await
    }

    pub async fn get_schedule(&self, uuid: Uuid) -> Result<ScheduledEvent> {
        self.scheduler.get(uuid).await
    }

    pub async fn schedules_for(&self, pipeline: &str) -> Result<Vec<ScheduledEvent>> {
        self.scheduler.list_for(pipeline).await
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    pub async fn publish(&self, label: &str, payload: Value) -> Result<Notification> {
        self.notifications.publish(label, payload, self).await
    }

    pub async fn subscribe(
        &self,
        label: &str,
        pipeline: &str,
    ) -> Result<NotificationSubscription> {
        self.notifications
            .subscribe(label, pipeline, &self.catalog)
            .await
    }

    pub async fn unsubscribe(&self, label: &str, pipeline: &str) -> Result<bool> {
        self.notifications.unsubscribe(label, pipeline).await
    }

    pub async fn notifications_for(&self, label: &str) -> Result<Vec<Notification>> {
        self.notifications.list(label).await
    }

    pub async fn last_notification(&self, label: &str) -> Result<Option<Notification>> {
        self.notifications.last(label).await
    }

    /// Injects an orchestration event; trigger sources use this instead of
    /// calling the engine directly.
    pub fn raise(&self, event: OrchestrationEvent) {
        let _ = self.events.send(event);
    }

    /// Stops the timer loop and the event relay.
    pub fn stop(&self) {
        tracing::info!("stopping orchestrator");
        for task in self.background.lock().expect("background task list").drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl PipelineTrigger for Orchestrator {
    async fn trigger(&self, pipeline: &str, args: TaskArgs) -> Result<Uuid> {
        self.execute(
            pipeline,
            args,
            ExecMode::default(),
            ResourceSpec::default(),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::jobs::JobSpec;
    use crate::pool::{CancelToken, TaskHandle, spawn_with};
    use gantry_core::domain::execution::ExecutionState;
    use gantry_core::domain::pipeline::TaskRef;
    use gantry_core::task::TaskReport;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Runs the task in-process instead of spawning a worker.
    struct InProcessLauncher {
        registry: Arc<TaskRegistry>,
    }

    impl JobLauncher for InProcessLauncher {
        fn launch(
            &self,
            spec: JobSpec,
            _mode: ExecMode,
            cancel: CancelToken,
        ) -> TaskHandle<std::result::Result<TaskReport, GantryError>> {
            let registry = Arc::clone(&self.registry);
            spawn_with(cancel, move |_token| async move {
                Ok(registry.run(&spec.task, spec.args))
            })
        }
    }

    struct ClosedGate;

    impl CredentialGate for ClosedGate {
        fn is_valid(&self, _pipeline: &str) -> bool {
            false
        }

        fn fetch_secret(&self, _label: &str) -> Result<Vec<u8>> {
            Err(GantryError::InvalidArgument("sealed".to_string()))
        }
    }

    async fn orchestrator() -> Arc<Orchestrator> {
        orchestrator_with_gate(Arc::new(PermissiveGate)).await
    }

    async fn orchestrator_with_gate(gate: Arc<dyn CredentialGate>) -> Arc<Orchestrator> {
        let registry = Arc::new(TaskRegistry::with_builtins());
        Orchestrator::start_with(
            Arc::new(Config::default()),
            db::memory_pool().await,
            Arc::clone(&registry),
            Arc::new(InProcessLauncher { registry }),
            gate,
            Arc::new(LogNotifySink),
        )
        .await
        .unwrap()
    }

    async fn register_active(orch: &Orchestrator, name: &str, task: &str) {
        orch.register_pipeline(RegisterPipeline {
            name: name.to_string(),
            implementation: TaskRef::named(task),
            owner: None,
            tags: vec![],
            new_version: false,
        })
        .await
        .unwrap();
        orch.activate_pipeline(name, 1).await.unwrap();
    }

    async fn wait_terminal(orch: &Orchestrator, uuid: Uuid) -> Execution {
        for _ in 0..200 {
            let exec = orch.get_execution(uuid).await.unwrap();
            if exec.state.is_terminal() {
                return exec;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("execution never reached a terminal state");
    }

    #[tokio::test]
    async fn test_execute_end_to_end() {
        let orch = orchestrator().await;
        register_active(&orch, "adder", "sum").await;

        let uuid = orch
            .execute(
                "adder",
                TaskArgs::positional(vec![json!(1), json!(2)]),
                ExecMode::Local,
                ResourceSpec::default(),
                None,
            )
            .await
            .unwrap();

        let finished = wait_terminal(&orch, uuid).await;
        assert_eq!(finished.state, ExecutionState::Finished);
        assert_eq!(finished.return_value.as_deref(), Some("3.0"));
        orch.stop();
    }

    #[tokio::test]
    async fn test_execute_requires_an_active_version() {
        let orch = orchestrator().await;
        orch.register_pipeline(RegisterPipeline {
            name: "dormant".to_string(),
            implementation: TaskRef::named("echo"),
            owner: None,
            tags: vec![],
            new_version: false,
        })
        .await
        .unwrap();

        let err = orch
            .execute(
                "dormant",
                TaskArgs::new(),
                ExecMode::Local,
                ResourceSpec::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::NoActivePipeline(_)));
        orch.stop();
    }

    #[tokio::test]
    async fn test_expired_credentials_block_execution() {
        let orch = orchestrator_with_gate(Arc::new(ClosedGate)).await;
        register_active(&orch, "sealed", "echo").await;

        let err = orch
            .execute(
                "sealed",
                TaskArgs::new(),
                ExecMode::Local,
                ResourceSpec::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::CredentialsExpired(_)));
        orch.stop();
    }

    #[tokio::test]
    async fn test_publish_chains_subscribed_pipelines() {
        let orch = orchestrator().await;
        register_active(&orch, "report", "echo").await;
        orch.subscribe("ingest-done", "report").await.unwrap();

        let notification = orch
            .publish("ingest-done", json!({"event": "finished", "result": [7]}))
            .await
            .unwrap();
        assert_eq!(notification.triggered, vec!["report".to_string()]);

        // the chained execution exists and completes
        let last = orch.last_execution("report").await.unwrap().unwrap();
        let finished = wait_terminal(&orch, last.uuid).await;
        assert_eq!(finished.state, ExecutionState::Finished);
        orch.stop();
    }

    #[tokio::test]
    async fn test_timer_fire_relays_into_an_execution() {
        let orch = orchestrator().await;
        register_active(&orch, "nightly", "echo").await;

        let schedule = orch
            .schedule_at(ScheduleRequest {
                pipeline: "nightly".to_string(),
                label: None,
                trigger_time: (chrono::Utc::now() + chrono::TimeDelta::hours(1)).to_rfc3339(),
                recurrence: None,
                tags: vec![],
                args: TaskArgs::new(),
            })
            .await
            .unwrap();

        // fire the timer by hand instead of waiting an hour
        orch.raise(OrchestrationEvent::TimerFired {
            label: schedule.uuid.to_string(),
            recurrent: false,
        });

        for _ in 0..200 {
            if let Some(exec) = orch.last_execution("nightly").await.unwrap() {
                assert_eq!(exec.schedule_uuid, Some(schedule.uuid));
                wait_terminal(&orch, exec.uuid).await;
                // the one-shot deactivated itself
                assert!(!orch.get_schedule(schedule.uuid).await.unwrap().active);
                orch.stop();
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("timer fire never produced an execution");
    }

    #[tokio::test]
    async fn test_two_orchestrators_do_not_share_state() {
        let first = orchestrator().await;
        let second = orchestrator().await;
        register_active(&first, "solo", "echo").await;

        // the second instance has its own store and catalog
        let err = second
            .get_pipelines("solo", &PipelineQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::PipelineNotFound(_)));
        first.stop();
        second.stop();
    }
}
