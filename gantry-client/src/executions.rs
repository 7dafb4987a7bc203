//! Execution endpoints

use gantry_core::domain::execution::Execution;
use gantry_core::dto::execution::{ExecutionSummary, LaunchExecution, LaunchResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::{OrchestratorClient, Result};

#[derive(Deserialize)]
struct CancelResponse {
    cancelled: bool,
}

impl OrchestratorClient {
    /// Launches an execution of a pipeline's active version.
    pub async fn launch_execution(&self, req: LaunchExecution) -> Result<LaunchResponse> {
        let response = self
            .client
            .post(format!("{}/execution/launch", self.base_url))
            .json(&req)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Fetches one execution by uuid.
    pub async fn get_execution(&self, uuid: Uuid) -> Result<Execution> {
        let response = self
            .client
            .get(format!("{}/execution/{}", self.base_url, uuid))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Cancels a live execution; false when it was already terminal.
    pub async fn cancel_execution(&self, uuid: Uuid) -> Result<bool> {
        let response = self
            .client
            .post(format!("{}/execution/{}/cancel", self.base_url, uuid))
            .send()
            .await?;
        let body: CancelResponse = self.handle_response(response).await?;
        Ok(body.cancelled)
    }

    /// Currently running executions.
    pub async fn running_executions(&self) -> Result<Vec<ExecutionSummary>> {
        let response = self
            .client
            .get(format!("{}/execution/running", self.base_url))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Every execution of a pipeline.
    pub async fn list_executions(&self, pipeline: &str) -> Result<Vec<ExecutionSummary>> {
        let response = self
            .client
            .get(format!("{}/pipeline/{}/executions", self.base_url, pipeline))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// The most recent execution of a pipeline, if any.
    pub async fn last_execution(&self, pipeline: &str) -> Result<Option<Execution>> {
        let response = self
            .client
            .get(format!(
                "{}/pipeline/{}/executions/last",
                self.base_url, pipeline
            ))
            .send()
            .await?;
        self.handle_response(response).await
    }
}
