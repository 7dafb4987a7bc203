//! Execution engine
//!
//! Drives one pipeline execution end to end: state machine, worker dispatch,
//! output capture, persistence on every transition. Each execution's record
//! is written by the single task driving it, so state transitions are
//! monotonic and observed in order.

use chrono::Utc;
use gantry_core::args::TaskArgs;
use gantry_core::domain::execution::{
    ExecMode, Execution, ExecutionState, NoticeDetail, ResourceSpec,
};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::error::{GantryError, Result};
use gantry_core::task::TaskReport;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::Config;
use crate::events::{EventSender, OrchestrationEvent};
use crate::jobs::{BatchJob, JobSpec, LocalJob};
use crate::notify::{ExecutionNotice, NotifySink};
use crate::pool::{CancelToken, ProcessPools, TaskHandle};
use crate::repository::execution as execution_repository;
use crate::retry::RetryPolicy;

/// Seam between the engine and the job backends.
pub trait JobLauncher: Send + Sync {
    fn launch(
        &self,
        spec: JobSpec,
        mode: ExecMode,
        cancel: CancelToken,
    ) -> TaskHandle<std::result::Result<TaskReport, GantryError>>;
}

/// Production launcher: local pool-admitted subprocess or batch job.
pub struct StandardLauncher {
    config: Arc<Config>,
    pools: Arc<ProcessPools>,
}

impl StandardLauncher {
    pub fn new(config: Arc<Config>, pools: Arc<ProcessPools>) -> Self {
        Self { config, pools }
    }
}

impl JobLauncher for StandardLauncher {
    fn launch(
        &self,
        spec: JobSpec,
        mode: ExecMode,
        cancel: CancelToken,
    ) -> TaskHandle<std::result::Result<TaskReport, GantryError>> {
        match mode {
            ExecMode::Local => LocalJob::submit(
                Arc::clone(&self.config),
                Arc::clone(&self.pools),
                spec,
                cancel,
            ),
            ExecMode::Job => {
                // inside an allocation we run an interactive step; otherwise
                // the job queues through the batch path
                let interactive = std::env::var("SLURM_JOB_ID").is_ok();
                BatchJob::submit(Arc::clone(&self.config), spec, interactive, cancel)
            }
        }
    }
}

struct ActiveExecution {
    record: Execution,
    cancel: CancelToken,
}

pub struct ExecutionEngine {
    pool: SqlitePool,
    retry: RetryPolicy,
    launcher: Arc<dyn JobLauncher>,
    active: Mutex<HashMap<Uuid, ActiveExecution>>,
    events: EventSender,
    notify: Arc<dyn NotifySink>,
}

impl ExecutionEngine {
    pub fn new(
        pool: SqlitePool,
        retry: RetryPolicy,
        launcher: Arc<dyn JobLauncher>,
        events: EventSender,
        notify: Arc<dyn NotifySink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            retry,
            launcher,
            active: Mutex::new(HashMap::new()),
            events,
            notify,
        })
    }

    /// Allocates an execution in state CREATED and persists it.
    pub async fn create(
        &self,
        pipeline: &Pipeline,
        mode: ExecMode,
        resources: ResourceSpec,
        schedule_uuid: Option<Uuid>,
    ) -> Result<Execution> {
        let mut exec = Execution::new(pipeline, mode, resources);
        exec.schedule_uuid = schedule_uuid;

        let stored = self
            .retry
            .run(|| execution_repository::insert(&self.pool, &exec))
            .await
            .map_err(GantryError::storage)?;
        Ok(stored)
    }

    /// Serializes the arguments, registers the execution in the active index
    /// and hands it to a driver task. Returns as soon as the driver is
    /// spawned; the caller never blocks on completion.
    pub async fn run(
        self: &Arc<Self>,
        mut exec: Execution,
        args: TaskArgs,
        notice: Option<NoticeDetail>,
    ) -> Result<Uuid> {
        exec.args = Some(serde_json::to_string(&args)?);
        exec.state = ExecutionState::Initialized;
        self.persist(&exec).await;

        let cancel = CancelToken::new();
        {
            let mut active = self.active.lock().expect("active index lock");
            active.insert(
                exec.uuid,
                ActiveExecution {
                    record: exec.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        let uuid = exec.uuid;
        let this = Arc::clone(self);
        tokio::spawn(this.drive(exec, args, notice, cancel));
        Ok(uuid)
    }

    async fn drive(
        self: Arc<Self>,
        mut exec: Execution,
        args: TaskArgs,
        notice: Option<NoticeDetail>,
        cancel: CancelToken,
    ) {
        if cancel.is_cancelled() {
            return;
        }

        let spec = JobSpec {
            task: exec.implementation.task.clone(),
            args,
            resources: exec.resources.clone(),
            job_name: format!("{}-v{}", exec.pipeline_name, exec.pipeline_version),
        };
        let handle = self.launcher.launch(spec, exec.mode, cancel.clone());

        let started = Utc::now();
        exec.state = ExecutionState::Running;
        exec.started_at = Some(started);
        self.update_active(&exec);
        self.persist(&exec).await;
        if cancel.is_cancelled() {
            // the cancel raced the transition; make the record agree with it
            exec.state = ExecutionState::Cancelled;
            exec.ended_at = Some(Utc::now());
            self.persist(&exec).await;
            return;
        }
        let _ = self.events.send(OrchestrationEvent::ExecutionStarted {
            execution: exec.uuid,
        });

        let outcome = handle.get().await;
        if cancel.is_cancelled() {
            // cancel() already finalized the record
            return;
        }

        let ended = Utc::now();
        match outcome {
            Ok(Ok(report)) => {
                if report.success {
                    exec.state = ExecutionState::Finished;
                    exec.return_value = report.value.as_ref().map(|v| v.to_string());
                } else {
                    exec.state = ExecutionState::Error;
                    exec.return_value = report.error.clone();
                }
                exec.stdout = Some(report.stdout);
                exec.stderr = Some(report.stderr);
            }
            Ok(Err(err)) => {
                tracing::error!("execution {} failed: {err}", exec.uuid);
                exec.state = ExecutionState::Error;
                exec.stderr = Some(err.to_string());
            }
            Err(wait) => {
                tracing::error!("execution {} lost its worker: {wait}", exec.uuid);
                exec.state = ExecutionState::Error;
                exec.stderr = Some(wait.to_string());
            }
        }
        exec.ended_at = Some(ended);
        exec.elapsed_ms = Some((ended - started).num_milliseconds());

        self.update_active(&exec);
        self.persist(&exec).await;
        self.remove_active(exec.uuid);
        let _ = self.events.send(OrchestrationEvent::ExecutionFinished {
            execution: exec.uuid,
            state: exec.state,
        });

        if let Some(detail) = notice {
            let notice = ExecutionNotice::from_execution(&exec, detail);
            self.notify.deliver(&notice).await;
        }
    }

    /// Cancels a live execution.
    ///
    /// Returns false (and changes nothing) for executions already in a
    /// terminal state.
    pub async fn cancel(&self, uuid: Uuid) -> Result<bool> {
        let entry = {
            let mut active = self.active.lock().expect("active index lock");
            match active.get(&uuid) {
                Some(found) if found.record.state.can_cancel() => {
                    let token = found.cancel.clone();
                    let record = found.record.clone();
                    active.remove(&uuid);
                    Some((token, record))
                }
                Some(_) => return Ok(false),
                None => None,
            }
        };

        if let Some((token, record)) = entry {
            token.cancel();
            self.finalize_cancelled(record).await;
            return Ok(true);
        }

        // not active: created-but-never-run or left over from a past run
        let stored = execution_repository::find_by_uuid(&self.pool, uuid)
            .await
            .map_err(GantryError::storage)?
            .ok_or(GantryError::ExecutionNotFound(uuid))?;
        if !stored.state.can_cancel() {
            return Ok(false);
        }
        self.finalize_cancelled(stored).await;
        Ok(true)
    }

    async fn finalize_cancelled(&self, mut record: Execution) {
        let now = Utc::now();
        record.state = ExecutionState::Cancelled;
        record.ended_at = Some(now);
        if let Some(started) = record.started_at {
            record.elapsed_ms = Some((now - started).num_milliseconds());
        }
        self.persist(&record).await;
        let _ = self.events.send(OrchestrationEvent::ExecutionFinished {
            execution: record.uuid,
            state: record.state,
        });
    }

    /// Resolves first from the active index, then from the store.
    pub async fn get(&self, uuid: Uuid) -> Result<Execution> {
        if let Some(found) = self.active.lock().expect("active index lock").get(&uuid) {
            return Ok(found.record.clone());
        }
        execution_repository::find_by_uuid(&self.pool, uuid)
            .await
            .map_err(GantryError::storage)?
            .ok_or(GantryError::ExecutionNotFound(uuid))
    }

    /// All executions of a pipeline, live snapshots overlaying stored rows.
    pub async fn list_for(&self, pipeline_name: &str) -> Result<Vec<Execution>> {
        let mut listed = execution_repository::list_for_pipeline(&self.pool, pipeline_name)
            .await
            .map_err(GantryError::storage)?;
        let active = self.active.lock().expect("active index lock");
        for exec in listed.iter_mut() {
            if let Some(found) = active.get(&exec.uuid) {
                *exec = found.record.clone();
            }
        }
        Ok(listed)
    }

    pub async fn last_for(&self, pipeline_name: &str) -> Result<Option<Execution>> {
        let last = execution_repository::last_for_pipeline(&self.pool, pipeline_name)
            .await
            .map_err(GantryError::storage)?;
        match last {
            Some(exec) => {
                let active = self.active.lock().expect("active index lock");
                Ok(Some(
                    active
                        .get(&exec.uuid)
                        .map(|a| a.record.clone())
                        .unwrap_or(exec),
                ))
            }
            None => Ok(None),
        }
    }

    /// Snapshot of the live executions.
    pub fn running(&self) -> Vec<Execution> {
        self.active
            .lock()
            .expect("active index lock")
            .values()
            .map(|a| a.record.clone())
            .collect()
    }

    fn update_active(&self, exec: &Execution) {
        let mut active = self.active.lock().expect("active index lock");
        if let Some(found) = active.get_mut(&exec.uuid) {
            found.record = exec.clone();
        }
    }

    fn remove_active(&self, uuid: Uuid) {
        self.active.lock().expect("active index lock").remove(&uuid);
    }

    async fn persist(&self, exec: &Execution) {
        if let Err(err) = self
            .retry
            .run(|| execution_repository::update(&self.pool, exec))
            .await
        {
            tracing::error!("could not persist execution {}: {err}", exec.uuid);
        }
    }
}
