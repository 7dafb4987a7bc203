//! Single-task local mode
//!
//! Reads one task request from stdin, runs it, and answers with a single
//! `REPORT:` line on stdout. The parent process captures everything else the
//! task prints as stray output.

use anyhow::{Context, Result, bail};
use gantry_core::task::{TaskRegistry, TaskReport};
use gantry_core::wire::{self, WorkerRequest};
use std::io::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run_local(registry: Arc<TaskRegistry>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let Some(line) = lines.next_line().await? else {
        bail!("no request on stdin");
    };

    let report = respond(&registry, &line).await?;

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", wire::encode_report_line(&report))?;
    stdout.flush()?;
    Ok(())
}

async fn respond(registry: &Arc<TaskRegistry>, line: &str) -> Result<TaskReport> {
    match serde_json::from_str::<WorkerRequest>(line) {
        Ok(WorkerRequest::Call { name, args }) => {
            tracing::info!("running task '{name}'");
            let registry = Arc::clone(registry);
            tokio::task::spawn_blocking(move || registry.run(&name, args))
                .await
                .context("task runner panicked")
        }
        Ok(WorkerRequest::Stop) => bail!("stop is not a local-mode request"),
        Err(err) => bail!("malformed request: {err}"),
    }
}
