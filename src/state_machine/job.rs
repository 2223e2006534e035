use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::resource::Resource;
use super::state::{JobState, JobType};
use crate::error::{FieldError, JobManagerError};

/// External execution backend a job is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorType {
    Ocm,
    Nuvla,
}

impl OrchestratorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorType::Ocm => "ocm",
            OrchestratorType::Nuvla => "nuvla",
        }
    }
}

impl FromStr for OrchestratorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ocm" => Ok(OrchestratorType::Ocm),
            "nuvla" => Ok(OrchestratorType::Nuvla),
            other => Err(format!("no valid orchestrator type provided: {other:?}")),
        }
    }
}

impl fmt::Display for OrchestratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Corrective action requested by a policy incompliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemediationType {
    #[serde(rename = "scale-up")]
    ScaleUp,
    #[serde(rename = "scale-down")]
    ScaleDown,
    #[serde(rename = "scale-out")]
    ScaleOut,
    #[serde(rename = "scale-in")]
    ScaleIn,
    #[serde(rename = "patch")]
    Patch,
    #[serde(rename = "reallocation")]
    Reallocation,
}

impl FromStr for RemediationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale-up" => Ok(RemediationType::ScaleUp),
            "scale-down" => Ok(RemediationType::ScaleDown),
            "scale-out" => Ok(RemediationType::ScaleOut),
            "scale-in" => Ok(RemediationType::ScaleIn),
            "patch" => Ok(RemediationType::Patch),
            "reallocation" => Ok(RemediationType::Reallocation),
            other => Err(format!("unknown remediation {other:?}")),
        }
    }
}

/// Placement hint for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default, with = "optional_orchestrator")]
    pub orchestrator: Option<OrchestratorType>,
}

impl Target {
    pub fn is_empty(&self) -> bool {
        self.cluster_name.is_empty() && self.node_name.is_empty() && self.orchestrator.is_none()
    }
}

/// An opaque deployment descriptor in canonical YAML form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainManifest {
    #[serde(rename = "yamlString", default)]
    pub yaml_string: String,
}

/// The unit of dispatchable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "ID", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "job_group_id", default)]
    pub group_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner_id: String,
    #[serde(default)]
    pub job_group_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_group_description: String,
    #[serde(rename = "type", default)]
    pub job_type: JobType,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_remediation"
    )]
    pub sub_type: Option<RemediationType>,
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub manifests: Vec<PlainManifest>,
    #[serde(rename = "targets", default)]
    pub target: Target,
    #[serde(default, with = "optional_orchestrator")]
    pub orchestrator: Option<OrchestratorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl Job {
    /// A fresh, unclaimed job with its identifier already assigned.
    pub fn new(job_type: JobType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            group_id: String::new(),
            owner_id: String::new(),
            job_group_name: String::new(),
            job_group_description: String::new(),
            job_type,
            sub_type: None,
            state: JobState::Created,
            manifests: Vec::new(),
            target: Target::default(),
            orchestrator: None,
            resource: None,
            namespace: String::new(),
        }
    }

    /// Set the placement and route the job to the target's orchestrator.
    pub fn place(&mut self, target: Target) {
        self.orchestrator = target.orchestrator;
        self.target = target;
    }

    pub fn is_unclaimed(&self) -> bool {
        self.owner_id.is_empty()
    }

    pub fn resource_uid(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .map(|r| r.resource_uid.as_str())
            .filter(|uid| !uid.is_empty())
    }

    pub fn validate(&self) -> Result<(), JobManagerError> {
        let mut errors = Vec::new();
        if !self.group_id.is_empty() && !is_uuid(&self.group_id) {
            errors.push(FieldError::new("job_group_id", "must be a UUID"));
        }
        if !self.owner_id.is_empty() && !is_uuid(&self.owner_id) {
            errors.push(FieldError::new("owner_id", "must be a UUID"));
        }
        for (i, manifest) in self.manifests.iter().enumerate() {
            if manifest.yaml_string.trim().is_empty() {
                errors.push(FieldError::new(
                    &format!("manifests[{i}].yamlString"),
                    "is required",
                ));
            }
        }
        if !self.target.is_empty() {
            if self.target.cluster_name.is_empty() {
                errors.push(FieldError::new("targets.cluster_name", "is required"));
            }
            if self.target.orchestrator.is_none() {
                errors.push(FieldError::new("targets.orchestrator", "is required"));
            }
        }
        if let Some(resource) = &self.resource {
            errors.extend(resource.field_errors("resource"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(JobManagerError::Validation(errors))
        }
    }
}

pub(crate) fn is_uuid(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

// Unknown or empty remediation kinds decode as unset rather than failing the
// whole document.
fn lenient_remediation<'de, D>(deserializer: D) -> Result<Option<RemediationType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// `None` ↔ `""`, matching how orchestrators send an unset orchestrator.
mod optional_orchestrator {
    use super::*;

    pub fn serialize<S>(value: &Option<OrchestratorType>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.map(|o| o.as_str()).unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OrchestratorType>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}
