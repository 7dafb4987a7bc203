//! Batch job backend
//!
//! Deploys a bootstrap worker through the cluster resource manager, waits for
//! its handshake banner on the submission's combined output stream, and
//! drives the RPC exchange against the worker's endpoint.

use gantry_core::error::GantryError;
use gantry_core::task::TaskReport;
use gantry_core::wire::Handshake;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::pool::{CancelToken, TaskHandle, spawn_with};

use super::handshake::{parse_handshake, pump_lines};
use super::rpc::WorkerClient;
use super::JobSpec;

pub struct BatchJob {
    config: Arc<Config>,
    spec: JobSpec,
    /// Interactive submissions run as a job step; batch ones queue.
    interactive: bool,
    job_id: Mutex<Option<u64>>,
}

impl BatchJob {
    /// Submits `spec` to the resource manager and returns its handle.
    pub fn submit(
        config: Arc<Config>,
        spec: JobSpec,
        interactive: bool,
        cancel: CancelToken,
    ) -> TaskHandle<Result<TaskReport, GantryError>> {
        let job = Arc::new(Self {
            config,
            spec,
            interactive,
            job_id: Mutex::new(None),
        });
        spawn_with(cancel, move |token| async move {
            tokio::select! {
                outcome = job.drive() => outcome,
                _ = token.cancelled() => {
                    job.cancel_allocation().await;
                    Err(GantryError::Cancelled)
                }
            }
        })
    }

    fn submission_command(&self) -> (PathBuf, Vec<String>) {
        let bin = if self.interactive {
            self.config.srun_bin.clone()
        } else {
            self.config.sbatch_bin.clone()
        };

        let mut args = vec!["--export=ALL".to_string()];
        if self.interactive {
            args.push("--unbuffered".to_string());
        } else {
            args.push("--wait".to_string());
            args.push("--output=/dev/stdout".to_string());
        }

        let res = &self.spec.resources;
        args.push(format!("--cpus-per-task={}", res.cores));
        if let Some(memory) = res.memory_mb {
            args.push(format!("--mem={memory}M"));
        }
        if let Some(partition) = &res.partition {
            args.push(format!("--partition={partition}"));
        }
        if res.exclusive {
            args.push("--exclusive".to_string());
        }
        args.push(format!("--job-name={}", self.spec.job_name));

        let worker = format!("{} serve", self.config.worker_bin.display());
        if self.interactive {
            args.extend(worker.split(' ').map(str::to_string));
        } else {
            args.push(format!("--wrap={worker}"));
        }

        (bin, args)
    }

    async fn drive(&self) -> Result<TaskReport, GantryError> {
        let (bin, args) = self.submission_command();
        tracing::info!("submitting job: {} {}", bin.display(), args.join(" "));

        let mut child = Command::new(&bin)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                GantryError::SubmissionFailure(format!("{}: {err}", bin.display()))
            })?;

        // fail fast when the submission command dies on the spot
        if let Ok(Some(status)) = child.try_wait()
            && !status.success()
        {
            return Err(GantryError::SubmissionFailure(format!(
                "submission command exited with {status}"
            )));
        }

        // merge stdout and stderr into one stream of lines
        let (lines_tx, mut lines) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, lines_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, lines_tx.clone()));
        }
        drop(lines_tx);

        let banner = self.await_handshake(&mut lines).await?;
        tracing::info!(
            "worker ready: job {} step {} at {}:{}",
            banner.job_id,
            banner.step_id,
            banner.host,
            banner.port
        );

        // keep draining the submission output for the log
        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                tracing::debug!("job output: {line}");
            }
        });

        if !self.interactive {
            self.await_running(banner.job_id).await?;
        }

        let mut client = match WorkerClient::connect(
            &banner.host,
            banner.port,
            self.config.rpc_connect_retries,
            self.config.rpc_connect_delay,
        )
        .await
        {
            Ok(client) => client,
            Err(err) => {
                // the allocation is still holding resources; give it back
                self.cancel_allocation().await;
                return Err(err);
            }
        };

        let outcome = client.call(&self.spec.task, self.spec.args.clone()).await;

        // stop the worker regardless of how the call went, then wait the
        // submission out
        if let Err(err) = client.stop().await {
            tracing::warn!("could not send stop to worker: {err}");
        }
        if let Err(err) = child.wait().await {
            tracing::warn!("could not await submission process: {err}");
        }

        outcome
    }

    /// Waits for the first banner on the submission's output.
    ///
    /// Only the first matching line releases the gate; duplicate banners are
    /// ignored. A closed stream before any banner is a submission failure.
    async fn await_handshake(
        &self,
        lines: &mut mpsc::UnboundedReceiver<String>,
    ) -> Result<Handshake, GantryError> {
        let banner = tokio::time::timeout(self.config.handshake_timeout, async {
            while let Some(line) = lines.recv().await {
                tracing::debug!("job output: {line}");
                if let Some(banner) = parse_handshake(&line) {
                    return Some(banner);
                }
            }
            None
        })
        .await
        .map_err(|_| GantryError::Timeout("worker handshake".to_string()))?;

        let banner = banner.ok_or_else(|| {
            GantryError::SubmissionFailure(
                "submission process exited before a handshake was seen".to_string(),
            )
        })?;

        if banner.job_id == 0 {
            return Err(GantryError::SubmissionFailure(
                "handshake carried no job id".to_string(),
            ));
        }
        if banner.port == 0 {
            return Err(GantryError::SubmissionFailure(
                "handshake carried no worker port".to_string(),
            ));
        }

        *self.job_id.lock().expect("job id slot") = Some(banner.job_id);
        Ok(banner)
    }

    /// Polls the queue listing until the job is observed RUNNING.
    async fn await_running(&self, job_id: u64) -> Result<(), GantryError> {
        for attempt in 0..self.config.status_poll_retries {
            let output = Command::new(&self.config.squeue_bin)
                .args(["-h", "-o", "%T", "-j", &job_id.to_string()])
                .output()
                .await;

            match output {
                Ok(output) => {
                    let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if state.eq_ignore_ascii_case("RUNNING") {
                        return Ok(());
                    }
                    tracing::debug!(
                        "job {} not running yet (state '{}', attempt {}/{})",
                        job_id,
                        state,
                        attempt + 1,
                        self.config.status_poll_retries
                    );
                }
                Err(err) => {
                    tracing::warn!("queue status poll failed: {err}");
                }
            }
            tokio::time::sleep(self.config.status_poll_delay).await;
        }

        Err(GantryError::SubmissionFailure(format!(
            "job {job_id} never reached RUNNING within {} polls",
            self.config.status_poll_retries
        )))
    }

    /// Cancels the allocation with the resource manager. Fire-and-forget:
    /// the job may outlive this call briefly.
    async fn cancel_allocation(&self) {
        let job_id = *self.job_id.lock().expect("job id slot");
        let Some(job_id) = job_id else {
            return;
        };
        tracing::info!("cancelling job allocation {job_id}");
        match Command::new(&self.config.scancel_bin)
            .arg(job_id.to_string())
            .output()
            .await
        {
            Ok(output) if !output.status.success() => {
                tracing::warn!(
                    "scancel {} exited with {}",
                    job_id,
                    output.status
                );
            }
            Err(err) => tracing::warn!("could not run scancel: {err}"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::args::TaskArgs;
    use gantry_core::domain::execution::ResourceSpec;

    fn job(interactive: bool, resources: ResourceSpec) -> BatchJob {
        BatchJob {
            config: Arc::new(Config::default()),
            spec: JobSpec {
                task: "crunch".to_string(),
                args: TaskArgs::new(),
                resources,
                job_name: "crunch-v1".to_string(),
            },
            interactive,
            job_id: Mutex::new(None),
        }
    }

    #[test]
    fn test_interactive_submission_command() {
        let resources = ResourceSpec {
            cores: 8,
            memory_mb: Some(4096),
            partition: Some("gpu".to_string()),
            exclusive: true,
        };
        let (bin, args) = job(true, resources).submission_command();

        assert!(bin.ends_with("srun"));
        assert!(args.contains(&"--unbuffered".to_string()));
        assert!(args.contains(&"--cpus-per-task=8".to_string()));
        assert!(args.contains(&"--mem=4096M".to_string()));
        assert!(args.contains(&"--partition=gpu".to_string()));
        assert!(args.contains(&"--exclusive".to_string()));
        assert!(args.contains(&"--job-name=crunch-v1".to_string()));
        assert!(args.iter().any(|a| a.ends_with("serve")));
    }

    #[test]
    fn test_batch_submission_wraps_the_worker() {
        let (bin, args) = job(false, ResourceSpec::default()).submission_command();

        assert!(bin.ends_with("sbatch"));
        assert!(args.contains(&"--wait".to_string()));
        assert!(!args.contains(&"--exclusive".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--wrap=")));
    }

    #[tokio::test]
    async fn test_first_banner_wins() {
        let job = job(true, ResourceSpec::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send("noise".to_string()).unwrap();
        tx.send("JOBID: 7 STEP: 0 PORT: 9001 HOST: node01".to_string())
            .unwrap();
        // a repeated banner with different coordinates is ignored
        tx.send("JOBID: 8 STEP: 0 PORT: 9002 HOST: node02".to_string())
            .unwrap();

        let banner = job.await_handshake(&mut rx).await.unwrap();
        assert_eq!(banner.job_id, 7);
        assert_eq!(banner.host, "node01");
        assert_eq!(*job.job_id.lock().unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_closed_stream_without_banner_is_fatal() {
        let job = job(true, ResourceSpec::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send("no banner here".to_string()).unwrap();
        drop(tx);

        let err = job.await_handshake(&mut rx).await.unwrap_err();
        assert!(matches!(err, GantryError::SubmissionFailure(_)));
    }

    #[tokio::test]
    async fn test_zero_port_banner_is_fatal() {
        let job = job(true, ResourceSpec::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send("JOBID: 7 STEP: 0 PORT: 0 HOST: node01".to_string())
            .unwrap();

        let err = job.await_handshake(&mut rx).await.unwrap_err();
        assert!(matches!(err, GantryError::SubmissionFailure(_)));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let mut job = job(true, ResourceSpec::default());
        let config = Config {
            handshake_timeout: std::time::Duration::from_millis(50),
            ..Config::default()
        };
        job.config = Arc::new(config);

        let (_tx, mut rx) = mpsc::unbounded_channel::<String>();
        let err = job.await_handshake(&mut rx).await.unwrap_err();
        assert!(matches!(err, GantryError::Timeout(_)));
    }
}
