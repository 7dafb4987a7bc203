//! Pipeline endpoints

use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::pipeline::{PipelineQuery, PipelineSummary, RegisterPipeline};

use crate::{OrchestratorClient, Result};

impl OrchestratorClient {
    /// Registers a pipeline implementation.
    pub async fn register_pipeline(&self, req: RegisterPipeline) -> Result<Pipeline> {
        let response = self
            .client
            .post(format!("{}/pipeline/register", self.base_url))
            .json(&req)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Lists the registered versions of a name, optionally filtered.
    pub async fn get_pipelines(
        &self,
        name: &str,
        query: &PipelineQuery,
    ) -> Result<Vec<PipelineSummary>> {
        let response = self
            .client
            .get(format!("{}/pipeline/{}", self.base_url, name))
            .query(query)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Activates one version, deactivating its siblings.
    pub async fn activate_pipeline(&self, name: &str, version: i64) -> Result<Pipeline> {
        let response = self
            .client
            .post(format!(
                "{}/pipeline/{}/{}/activate",
                self.base_url, name, version
            ))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Deactivates one version.
    pub async fn deactivate_pipeline(&self, name: &str, version: i64) -> Result<Pipeline> {
        let response = self
            .client
            .post(format!(
                "{}/pipeline/{}/{}/deactivate",
                self.base_url, name, version
            ))
            .send()
            .await?;
        self.handle_response(response).await
    }
}
