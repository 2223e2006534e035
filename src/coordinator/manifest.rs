use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;

use crate::state_machine::PlainManifest;

const APPS_V1_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet"];
const CORE_V1_KINDS: &[&str] = &[
    "Pod",
    "Service",
    "ConfigMap",
    "Secret",
    "PersistentVolumeClaim",
    "ServiceAccount",
    "Namespace",
];

/// Why a declared manifest was left out of a job.
#[derive(Debug, Error)]
pub enum ManifestRejection {
    #[error("invalid manifest yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported object {api_version}/{kind}")]
    UnsupportedKind { api_version: String, kind: String },

    #[error("manifest has no metadata.name")]
    MissingName,
}

#[derive(Debug, Deserialize)]
struct ObjectHeader {
    #[serde(rename = "apiVersion", default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: ObjectMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

/// `metadata.name` of a raw manifest, if it has one.
pub fn manifest_name(manifest: &Value) -> Option<&str> {
    manifest.get("metadata")?.get("name")?.as_str()
}

/// Serialize a manifest to canonical YAML and check the result is an
/// object kind orchestrators can deploy.
pub fn canonicalize(manifest: &Value) -> Result<PlainManifest, ManifestRejection> {
    let yaml_string = serde_yaml::to_string(manifest)?;
    check_object(&yaml_string)?;
    Ok(PlainManifest { yaml_string })
}

fn check_object(yaml: &str) -> Result<(), ManifestRejection> {
    let header: ObjectHeader = serde_yaml::from_str(yaml)?;
    let known = match header.api_version.as_str() {
        "apps/v1" => APPS_V1_KINDS.contains(&header.kind.as_str()),
        "v1" => CORE_V1_KINDS.contains(&header.kind.as_str()),
        _ => false,
    };
    if !known {
        return Err(ManifestRejection::UnsupportedKind {
            api_version: header.api_version,
            kind: header.kind,
        });
    }
    if header.metadata.name.is_empty() {
        return Err(ManifestRejection::MissingName);
    }
    Ok(())
}
