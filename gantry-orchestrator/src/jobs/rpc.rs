//! Worker RPC client
//!
//! Line-oriented JSON over TCP: one `call` per job, a `stop` on the way out.
//! Connection attempts retry with a fixed delay while the worker endpoint is
//! not yet listening.

use gantry_core::args::TaskArgs;
use gantry_core::error::GantryError;
use gantry_core::task::TaskReport;
use gantry_core::wire::{WorkerRequest, WorkerResponse};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

#[derive(Debug)]
pub struct WorkerClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    addr: String,
}

impl WorkerClient {
    /// Connects to a worker endpoint, retrying on connection failure.
    pub async fn connect(
        host: &str,
        port: u16,
        retries: u32,
        delay: Duration,
    ) -> Result<Self, GantryError> {
        let addr = format!("{host}:{port}");
        let mut attempt = 0;
        loop {
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    let (read, writer) = stream.into_split();
                    return Ok(Self {
                        reader: BufReader::new(read),
                        writer,
                        addr,
                    });
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= retries.max(1) {
                        return Err(GantryError::BackendUnavailable(format!("{addr}: {err}")));
                    }
                    tracing::warn!(
                        "worker at {} not available (attempt {}/{}), retrying: {}",
                        addr,
                        attempt,
                        retries,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Ships the task key and arguments; blocks until the worker reports.
    pub async fn call(&mut self, name: &str, args: TaskArgs) -> Result<TaskReport, GantryError> {
        self.send(&WorkerRequest::Call {
            name: name.to_string(),
            args,
        })
        .await?;

        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(GantryError::BackendUnavailable(format!(
                "{}: connection closed before a report arrived",
                self.addr
            )));
        }
        match serde_json::from_str::<WorkerResponse>(line.trim_end()) {
            Ok(WorkerResponse::Report { report }) => Ok(report),
            Ok(WorkerResponse::Refused { message }) => Err(GantryError::BackendUnavailable(message)),
            Err(err) => Err(GantryError::BackendUnavailable(format!(
                "{}: malformed worker response: {err}",
                self.addr
            ))),
        }
    }

    /// Sends the stop control message so the worker can exit cleanly.
    pub async fn stop(mut self) -> Result<(), GantryError> {
        self.send(&WorkerRequest::Stop).await
    }

    async fn send(&mut self, request: &WorkerRequest) -> Result<(), GantryError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::task::TaskRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn fake_worker(registry: Arc<TaskRegistry>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<WorkerRequest>(&line) {
                    Ok(WorkerRequest::Call { name, args }) => {
                        let report = registry.run(&name, args);
                        let response =
                            serde_json::to_string(&WorkerResponse::Report { report }).unwrap();
                        write.write_all(response.as_bytes()).await.unwrap();
                        write.write_all(b"\n").await.unwrap();
                    }
                    Ok(WorkerRequest::Stop) => break,
                    Err(_) => break,
                }
            }
        });
        port
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let port = fake_worker(Arc::new(TaskRegistry::with_builtins())).await;
        let mut client = WorkerClient::connect("127.0.0.1", port, 3, Duration::from_millis(50))
            .await
            .unwrap();

        let report = client
            .call("sum", TaskArgs::positional(vec![json!(20), json!(22)]))
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(report.value, Some(json!(42.0)));

        client.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_task_failure_travels_in_the_report() {
        let port = fake_worker(Arc::new(TaskRegistry::with_builtins())).await;
        let mut client = WorkerClient::connect("127.0.0.1", port, 3, Duration::from_millis(50))
            .await
            .unwrap();

        let report = client
            .call("fail", TaskArgs::positional(vec![json!("kaput")]))
            .await
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("kaput"));
    }

    #[tokio::test]
    async fn test_connect_exhausts_retries() {
        // nothing listens on this port
        let err = WorkerClient::connect("127.0.0.1", 1, 2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::BackendUnavailable(_)));
    }
}
