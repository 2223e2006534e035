use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FieldError, JobManagerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// One observation about a deployed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(rename = "observedGeneration", default, skip_serializing_if = "is_zero")]
    pub observed_generation: i64,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
    pub reason: String,
    pub message: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Condition {
    pub fn new(condition_type: &str, status: ConditionStatus, reason: &str, message: &str) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status,
            observed_generation: 1,
            last_transition_time: Utc::now(),
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    fn field_errors(&self, prefix: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.condition_type.is_empty() {
            errors.push(FieldError::new(&format!("{prefix}.type"), "is required"));
        }
        if self.reason.is_empty() {
            errors.push(FieldError::new(&format!("{prefix}.reason"), "is required"));
        }
        if self.message.is_empty() {
            errors.push(FieldError::new(&format!("{prefix}.message"), "is required"));
        }
        errors
    }
}

/// Live status mirror for the artifact a job deployed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "ID", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(rename = "resource_uuid", default, skip_serializing_if = "String::is_empty")]
    pub resource_uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Resource {
    /// The status every freshly created job starts with: waiting for a
    /// placement and for an orchestrator to claim it.
    pub fn awaiting(resource_name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: String::new(),
            resource_uid: String::new(),
            resource_name: resource_name.to_string(),
            conditions: vec![
                Condition::new(
                    "Created",
                    ConditionStatus::True,
                    "AwaitingForTarget",
                    "Waiting for the Target",
                ),
                Condition::new(
                    "Created",
                    ConditionStatus::True,
                    "AwaitingForExecution",
                    "Waiting an Orchestrator to take the Job",
                ),
            ],
        }
    }

    /// Swap the whole condition list; the previous set is discarded.
    pub fn replace_conditions(&mut self, conditions: Vec<Condition>) {
        self.conditions = conditions;
    }

    pub(crate) fn field_errors(&self, prefix: &str) -> Vec<FieldError> {
        self.conditions
            .iter()
            .enumerate()
            .flat_map(|(i, c)| c.field_errors(&format!("{prefix}.conditions[{i}]")))
            .collect()
    }

    pub fn validate(&self) -> Result<(), JobManagerError> {
        let errors = self.field_errors("resource");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(JobManagerError::Validation(errors))
        }
    }
}
