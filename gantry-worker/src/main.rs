//! Gantry Worker
//!
//! The bootstrap worker deployed for every execution. Two modes:
//! - `serve`: bind an ephemeral TCP port, print the handshake banner, and
//!   serve the task RPC protocol until a stop message arrives. This is the
//!   process a resource-manager submission starts on a compute node.
//! - `run-local`: read one task request from stdin, run it, and write a
//!   single `REPORT:` line to stdout. Used for local executions.
//!
//! Stdout belongs to the wire protocol in both modes; logging goes to
//! stderr.

mod local;
mod server;

use anyhow::{Result, bail};
use gantry_core::task::TaskRegistry;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let registry = Arc::new(TaskRegistry::with_builtins());

    let mode = std::env::args().nth(1).unwrap_or_default();
    match mode.as_str() {
        "serve" => server::serve(registry).await,
        "run-local" => local::run_local(registry).await,
        other => bail!("unknown mode '{other}': expected 'serve' or 'run-local'"),
    }
}
