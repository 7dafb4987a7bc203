//! Gantry HTTP client
//!
//! A typed client for the orchestrator control-plane API: pipeline
//! registration and activation, execution launch and tracking, schedules and
//! notifications.
//!
//! # Example
//!
//! ```no_run
//! use gantry_client::OrchestratorClient;
//! use gantry_core::domain::pipeline::TaskRef;
//! use gantry_core::dto::pipeline::RegisterPipeline;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let pipeline = client
//!         .register_pipeline(RegisterPipeline {
//!             name: "ingest".to_string(),
//!             implementation: TaskRef::named("echo"),
//!             owner: None,
//!             tags: vec![],
//!             new_version: false,
//!         })
//!         .await?;
//!
//!     println!("registered {} v{}", pipeline.name, pipeline.version);
//!     Ok(())
//! }
//! ```

pub mod error;
mod executions;
mod notifications;
mod pipelines;
mod schedules;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the gantry orchestrator API
///
/// Methods are grouped by endpoint family:
/// - Pipeline management (register, list, activate, deactivate)
/// - Execution lifecycle (launch, get, cancel, listing)
/// - Schedules (create, cancel, listing)
/// - Notifications (publish, subscribe, listing)
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g. "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a client with a custom reqwest instance (timeouts, proxies,
    /// TLS settings).
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =========================================================================
    // Response handlers
    // =========================================================================

    /// Checks the status code and deserializes the JSON body.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        response
            .json()
            .await
            .map_err(|err| ClientError::ParseError(format!("invalid JSON response: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = OrchestratorClient::with_client("http://localhost:8080", http_client);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
