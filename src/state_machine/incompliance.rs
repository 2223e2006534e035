use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{RemediationType, is_uuid};
use crate::error::{FieldError, JobManagerError};

/// Identifies what an incompliance report is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub subject_type: String,
    #[serde(rename = "appName", default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,
    #[serde(rename = "appComponent", default, skip_serializing_if = "String::is_empty")]
    pub app_component: String,
    #[serde(rename = "appInstance", default, skip_serializing_if = "String::is_empty")]
    pub app_instance: String,
    #[serde(rename = "resourceId", default, skip_serializing_if = "String::is_empty")]
    pub resource_id: String,
}

/// A policy violation reported by the policy manager. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incompliance {
    #[serde(rename = "ID", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "currentValue", default, skip_serializing_if = "String::is_empty")]
    pub current_value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub threshold: String,
    #[serde(rename = "policyName", default)]
    pub policy_name: String,
    #[serde(rename = "policyId", default, skip_serializing_if = "String::is_empty")]
    pub policy_id: String,
    #[serde(
        rename = "measurementBackend",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub measurement_backend: String,
    #[serde(rename = "extraLabels", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub subject: Subject,
    #[serde(default)]
    pub remediation: String,
}

impl Incompliance {
    /// Assign identity and receive time if the reporter did not.
    pub fn stamp(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        self.created_at = Utc::now();
    }

    /// The requested remediation, if it is one this service knows.
    pub fn remediation_kind(&self) -> Option<RemediationType> {
        self.remediation.parse().ok()
    }

    pub fn validate(&self) -> Result<(), JobManagerError> {
        let mut errors = Vec::new();
        if self.policy_name.is_empty() {
            errors.push(FieldError::new("policyName", "is required"));
        }
        if self.remediation.is_empty() {
            errors.push(FieldError::new("remediation", "is required"));
        }
        if !self.policy_id.is_empty() && !is_uuid(&self.policy_id) {
            errors.push(FieldError::new("policyId", "must be a UUID"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(JobManagerError::Validation(errors))
        }
    }
}
