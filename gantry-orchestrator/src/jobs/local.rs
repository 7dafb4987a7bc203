//! Local job backend
//!
//! Runs one task in an isolated subprocess of the bootstrap worker, admitted
//! through the bounded per-task pool. The worker answers with a single
//! `REPORT:` line on stdout; everything else it prints is passed through to
//! the log.

use gantry_core::error::GantryError;
use gantry_core::task::TaskReport;
use gantry_core::wire::{self, WorkerRequest};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::config::Config;
use crate::pool::{CancelToken, ProcessPools, TaskHandle, spawn_with};

use super::JobSpec;

pub struct LocalJob;

impl LocalJob {
    /// Submits `spec` to the local backend and returns its handle.
    pub fn submit(
        config: Arc<Config>,
        pools: Arc<ProcessPools>,
        spec: JobSpec,
        cancel: CancelToken,
    ) -> TaskHandle<Result<TaskReport, GantryError>> {
        spawn_with(cancel, move |token| {
            Self::run(config, pools, spec, token)
        })
    }

    async fn run(
        config: Arc<Config>,
        pools: Arc<ProcessPools>,
        spec: JobSpec,
        cancel: CancelToken,
    ) -> Result<TaskReport, GantryError> {
        // admission: capacity-limited per task identity, FIFO beyond it
        let _permit = tokio::select! {
            permit = pools.acquire(&spec.task, config.local_pool_capacity) => permit,
            _ = cancel.cancelled() => return Err(GantryError::Cancelled),
        };

        let mut command = Command::new(&config.worker_bin);
        command
            .arg("run-local")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|err| {
            GantryError::SubmissionFailure(format!(
                "could not start {}: {err}",
                config.worker_bin.display()
            ))
        })?;

        let request = WorkerRequest::Call {
            name: spec.task.clone(),
            args: spec.args.clone(),
        };
        let mut request_line = serde_json::to_string(&request)?;
        request_line.push('\n');
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| GantryError::SubmissionFailure("worker stdin unavailable".into()))?;
            stdin.write_all(request_line.as_bytes()).await?;
            // closing stdin tells the worker the request is complete
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GantryError::SubmissionFailure("worker stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| GantryError::SubmissionFailure("worker stderr unavailable".into()))?;

        let stderr_reader = tokio::spawn(async move {
            let mut collected = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let mut stdout_lines = BufReader::new(stdout).lines();
        let report = tokio::select! {
            report = scan_for_report(&mut stdout_lines) => report,
            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                return Err(GantryError::Cancelled);
            }
        };

        let status = child.wait().await?;
        let stray_stderr = stderr_reader.await.unwrap_or_default();

        match report {
            Some(mut report) => {
                if !stray_stderr.is_empty() {
                    report.stderr.push_str(&stray_stderr);
                }
                Ok(report)
            }
            None => Err(GantryError::ExecutionFailure(format!(
                "worker exited with {status} without a report: {}",
                stray_stderr.trim_end()
            ))),
        }
    }
}

/// Scans worker stdout for the report line; stray output is logged.
async fn scan_for_report<R>(
    lines: &mut tokio::io::Lines<BufReader<R>>,
) -> Option<TaskReport>
where
    R: tokio::io::AsyncRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(report) = wire::decode_report_line(&line) {
            return Some(report);
        }
        tracing::debug!("worker output: {line}");
    }
    None
}

/// Signals the worker's whole process group, then makes sure the direct
/// child is gone.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        // the worker is its own group leader, so this reaches descendants too
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    let _ = child.kill().await;
}
