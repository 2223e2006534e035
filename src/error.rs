use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::Incompliance;

#[derive(Debug, Error)]
pub enum JobManagerError {
    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Integrity fault: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl JobManagerError {
    /// Shorthand for a validation failure on a single field.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn job_not_found(id: &str) -> Self {
        Self::NotFound(format!("job {id}"))
    }

    pub fn group_not_found(id: &str) -> Self {
        Self::NotFound(format!("job group {id}"))
    }
}

/// One offending field reported by an entity `validate()` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures talking to the Matchmaker or the Policy Manager.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} returned status {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to parse {service} response: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },
}

/// Returned by the remediation handler when the job mutation fails.
///
/// The incompliance report is persisted before the job is touched, so it is
/// carried here whenever it made it to the store.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RemediationFailure {
    pub incompliance: Option<Incompliance>,
    #[source]
    pub error: JobManagerError,
}

impl RemediationFailure {
    pub fn before_persist(error: JobManagerError) -> Self {
        Self {
            incompliance: None,
            error,
        }
    }

    pub fn after_persist(incompliance: Incompliance, error: JobManagerError) -> Self {
        Self {
            incompliance: Some(incompliance),
            error,
        }
    }
}
