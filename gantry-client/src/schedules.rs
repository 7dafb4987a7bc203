//! Schedule endpoints

use gantry_core::domain::schedule::ScheduledEvent;
use gantry_core::dto::schedule::{ScheduleRequest, ScheduleResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::{OrchestratorClient, Result};

#[derive(Deserialize)]
struct CancelResponse {
    cancelled: bool,
}

impl OrchestratorClient {
    /// Stores a scheduled execution.
    pub async fn schedule_at(&self, req: ScheduleRequest) -> Result<ScheduleResponse> {
        let response = self
            .client
            .post(format!("{}/schedule", self.base_url))
            .json(&req)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Fetches one scheduled event by uuid.
    pub async fn get_schedule(&self, uuid: Uuid) -> Result<ScheduledEvent> {
        let response = self
            .client
            .get(format!("{}/schedule/{}", self.base_url, uuid))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Cancels (soft-deletes) a scheduled event.
    pub async fn cancel_schedule(&self, uuid: Uuid) -> Result<bool> {
        let response = self
            .client
            .post(format!("{}/schedule/{}/cancel", self.base_url, uuid))
            .send()
            .await?;
        let body: CancelResponse = self.handle_response(response).await?;
        Ok(body.cancelled)
    }

    /// Every scheduled event targeting a pipeline.
    pub async fn list_schedules(&self, pipeline: &str) -> Result<Vec<ScheduledEvent>> {
        let response = self
            .client
            .get(format!("{}/pipeline/{}/schedules", self.base_url, pipeline))
            .send()
            .await?;
        self.handle_response(response).await
    }
}
