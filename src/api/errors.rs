//! HTTP error mapping for the job manager handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::{JobManagerError, RemediationFailure};

#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Clone, Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Clone, Debug)]
pub struct ErrorState {
    pub message: String,
    pub details: Option<Value>,
}

impl ErrorState {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(ErrorState),
    NotFound(ErrorState),
    /// Refused lifecycle transition. Reported as 400 for orchestrator compatibility.
    Conflict(ErrorState),
    Unprocessable(ErrorState),
    Integrity(ErrorState),
    BadGateway(ErrorState),
    Internal(ErrorState),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(ErrorState::new(message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(ErrorState::new(message))
    }

    pub fn with_details(mut self, details: Value) -> Self {
        match &mut self {
            Self::BadRequest(s)
            | Self::NotFound(s)
            | Self::Conflict(s)
            | Self::Unprocessable(s)
            | Self::Integrity(s)
            | Self::BadGateway(s)
            | Self::Internal(s) => s.details = Some(details),
        }
        self
    }

    /// Like `From`, but malformed input is a plain 400 instead of 422.
    pub fn from_input(err: JobManagerError) -> Self {
        match err {
            JobManagerError::Validation(errors) => {
                let message = JobManagerError::Validation(errors.clone()).to_string();
                Self::bad_request(message).with_details(serde_json::json!(errors))
            }
            other => other.into(),
        }
    }
}

impl From<JobManagerError> for ApiError {
    fn from(err: JobManagerError) -> Self {
        let message = err.to_string();
        match err {
            JobManagerError::Validation(errors) => Self::Unprocessable(ErrorState::new(message))
                .with_details(serde_json::json!(errors)),
            JobManagerError::Json(_) | JobManagerError::Yaml(_) => {
                Self::Unprocessable(ErrorState::new(message))
            }
            JobManagerError::NotFound(_) => Self::NotFound(ErrorState::new(message)),
            JobManagerError::Conflict(_) => Self::Conflict(ErrorState::new(message)),
            JobManagerError::Integrity(_) => Self::Integrity(ErrorState::new(message)),
            JobManagerError::Upstream(_) => {
                error!(error = %message, "upstream failure");
                Self::BadGateway(ErrorState::new(message))
            }
            JobManagerError::Storage(_) => {
                error!(error = %message, "storage failure");
                Self::Internal(ErrorState::new(message))
            }
        }
    }
}

impl From<RemediationFailure> for ApiError {
    fn from(failure: RemediationFailure) -> Self {
        let api = Self::from_input(failure.error);
        match failure.incompliance {
            Some(incompliance) => api.with_details(serde_json::json!({ "incompliance": incompliance })),
            None => api,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, state) = match self {
            Self::BadRequest(s) => (StatusCode::BAD_REQUEST, "invalid_argument", s),
            Self::NotFound(s) => (StatusCode::NOT_FOUND, "not_found", s),
            Self::Conflict(s) => (StatusCode::BAD_REQUEST, "conflict", s),
            Self::Unprocessable(s) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", s),
            Self::Integrity(s) => (StatusCode::UNPROCESSABLE_ENTITY, "integrity_fault", s),
            Self::BadGateway(s) => (StatusCode::BAD_GATEWAY, "upstream_error", s),
            Self::Internal(s) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", s),
        };
        let body = ErrorEnvelope {
            error: ErrorBody {
                code,
                message: state.message,
                details: state.details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FieldError, UpstreamError};

    fn status_of(err: JobManagerError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_of(JobManagerError::job_not_found("j")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(JobManagerError::Conflict("no".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(JobManagerError::invalid("ID", "is required")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(JobManagerError::Integrity("targets".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(JobManagerError::Upstream(UpstreamError::NotConfigured {
                service: "matchmaker"
            })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(JobManagerError::Storage("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn input_errors_are_bad_requests() {
        let api = ApiError::from_input(JobManagerError::Validation(vec![FieldError::new(
            "owner_id",
            "must be a UUID",
        )]));
        match &api {
            ApiError::BadRequest(state) => {
                assert_eq!(state.details.as_ref().unwrap()[0]["field"], "owner_id");
            }
            other => panic!("expected bad request, got {other:?}"),
        }
        assert_eq!(api.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
