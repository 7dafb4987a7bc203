//! RPC serving mode
//!
//! Binds an ephemeral port, announces it through the handshake banner, and
//! answers `call` requests from the task registry until a `stop` arrives.

use anyhow::{Context, Result};
use gantry_core::task::TaskRegistry;
use gantry_core::wire::{Handshake, WorkerRequest, WorkerResponse};
use std::io::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Debug, PartialEq, Eq)]
enum Control {
    Continue,
    Stop,
}

pub async fn serve(registry: Arc<TaskRegistry>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", 0))
        .await
        .context("could not bind the worker endpoint")?;
    let port = listener.local_addr()?.port();

    let banner = Handshake {
        job_id: env_u64("SLURM_JOB_ID"),
        step_id: env_u64("SLURM_STEP_ID"),
        port,
        host: hostname(),
    }
    .banner();

    // the submission stream synchronization point; printed exactly once
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{banner}")?;
    stdout.flush()?;

    tracing::info!("worker serving on port {port}");

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!("connection from {peer}");
        match handle_connection(stream, Arc::clone(&registry)).await {
            Ok(Control::Stop) => break,
            Ok(Control::Continue) => {}
            Err(err) => tracing::warn!("connection error: {err}"),
        }
    }

    tracing::info!("stop received, worker exiting");
    Ok(())
}

async fn handle_connection<S>(stream: S, registry: Arc<TaskRegistry>) -> Result<Control>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<WorkerRequest>(&line) {
            Ok(WorkerRequest::Call { name, args }) => {
                tracing::info!("running task '{name}'");
                let registry = Arc::clone(&registry);
                let report = tokio::task::spawn_blocking(move || registry.run(&name, args))
                    .await
                    .context("task runner panicked")?;
                WorkerResponse::Report { report }
            }
            Ok(WorkerRequest::Stop) => return Ok(Control::Stop),
            Err(err) => WorkerResponse::Refused {
                message: format!("malformed request: {err}"),
            },
        };

        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        write.write_all(encoded.as_bytes()).await?;
        write.flush().await?;
    }

    Ok(Control::Continue)
}

fn env_u64(name: &str) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn hostname() -> String {
    std::env::var("SLURMD_NODENAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
