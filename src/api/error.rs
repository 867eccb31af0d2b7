//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::pipeline::PipelineError;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    retryable: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
            "retryable": self.retryable,
        }));
        (self.status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::UnknownStep(_) | PipelineError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::IllegalTransition { .. } => StatusCode::CONFLICT,
            PipelineError::StoreUnavailable(e) => {
                error!("Record store failure: {}", e);
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        Self {
            status,
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("Background task failed: {}", err))
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use crate::pipeline::{Step, StepStatus};
    use uuid::Uuid;

    #[test]
    fn test_pipeline_error_status_codes() {
        let cases = [
            (PipelineError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (
                PipelineError::UnknownStep("transcription_complete".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::InvalidPayload("missing step".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::IllegalTransition {
                    step: Step::Blog,
                    from: StepStatus::Pending,
                    to: StepStatus::Completed,
                    reason: "prerequisite".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                PipelineError::StoreUnavailable(StoreError::Poisoned),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
