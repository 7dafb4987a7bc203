//! API error handling
//!
//! Maps every orchestrator error onto a small stable set of response codes
//! plus a human-readable message. Callers must not depend on error class
//! identity across this boundary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gantry_core::error::GantryError;

/// API error wrapper.
#[derive(Debug)]
pub struct ApiError(pub GantryError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<GantryError> for ApiError {
    fn from(err: GantryError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GantryError::InvalidArgument(_)
            | GantryError::UnknownTask(_)
            | GantryError::SchedulingPast { .. }
            | GantryError::Serialization(_) => StatusCode::BAD_REQUEST,

            GantryError::PipelineNotFound(_)
            | GantryError::PipelineNotRegistered(_)
            | GantryError::NoActivePipeline(_)
            | GantryError::ExecutionNotFound(_)
            | GantryError::ScheduledEventNotFound(_) => StatusCode::NOT_FOUND,

            GantryError::PipelineAlreadyRegistered(_) => StatusCode::CONFLICT,

            GantryError::CredentialsExpired(_) => StatusCode::FORBIDDEN,

            GantryError::BackendUnavailable(_) | GantryError::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            GantryError::MultipleActivePipelines(_)
            | GantryError::SubmissionFailure(_)
            | GantryError::ExecutionFailure(_)
            | GantryError::Cancelled
            | GantryError::Storage(_)
            | GantryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }
        let message = self.0.to_string();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
