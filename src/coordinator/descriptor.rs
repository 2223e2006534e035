use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::manifest::{canonicalize, manifest_name};
use crate::error::JobManagerError;
use crate::state_machine::PlainManifest;
use crate::upstream::MatchmakerResponse;

/// Reference from a component to a top-level manifest, by `metadata.name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub devices: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
}

/// One deployable part of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub component_type: String,
    #[serde(default)]
    pub manifests: Vec<ManifestRef>,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<serde_json::Value>,
    /// Raw placement; an object or an empty list once matchmaking ran.
    #[serde(default)]
    pub targets: serde_json::Value,
}

impl Component {
    // Fields the resolved component left empty keep the submitted value.
    fn backfill(&mut self, submitted: Component) {
        if self.component_type.is_empty() {
            self.component_type = submitted.component_type;
        }
        if self.manifests.is_empty() {
            self.manifests = submitted.manifests;
        }
        if self.requirements == Requirements::default() {
            self.requirements = submitted.requirements;
        }
        if self.policies.is_empty() {
            self.policies = submitted.policies;
        }
        if self.targets.is_null() {
            self.targets = submitted.targets;
        }
    }
}

/// The YAML document a user submits to create an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<serde_json::Value>,
    #[serde(default)]
    pub manifests: Vec<serde_yaml::Value>,
}

impl ApplicationDescriptor {
    /// Parse a submitted document. Leading and trailing line breaks are ignored.
    pub fn parse(document: &[u8]) -> Result<Self, JobManagerError> {
        let text = std::str::from_utf8(document)
            .map_err(|e| JobManagerError::invalid("body", format!("not UTF-8: {e}")))?;
        let trimmed = text.trim_matches(|c| c == '\r' || c == '\n');
        let descriptor: ApplicationDescriptor = serde_yaml::from_str(trimmed)
            .map_err(|e| JobManagerError::invalid("body", e.to_string()))?;
        debug!(name = %descriptor.name, components = descriptor.components.len(), "descriptor parsed");
        Ok(descriptor)
    }

    /// Fold the matchmaker's answer in. Fields it sent win.
    ///
    /// The resolved component list becomes the component list. Each resolved
    /// component is matched to the submitted one of the same name, whose
    /// values fill whatever the matchmaker left out.
    pub fn merge(&mut self, response: MatchmakerResponse) {
        if let Some(name) = response.name {
            self.name = name;
        }
        if let Some(description) = response.description {
            self.description = description;
        }
        if let Some(mut components) = response.components {
            let mut submitted = std::mem::take(&mut self.components);
            for component in &mut components {
                if let Some(i) = submitted.iter().position(|c| c.name == component.name) {
                    component.backfill(submitted.remove(i));
                }
            }
            self.components = components;
        }
        if let Some(manifests) = response.manifests {
            self.manifests = manifests;
        }
    }

    /// Canonical manifests a component asks for, in top-level declaration order.
    ///
    /// A manifest that cannot be read or is not a deployable object is
    /// skipped with a warning.
    pub fn manifests_for(&self, component: &Component) -> Vec<PlainManifest> {
        let mut selected = Vec::new();
        for manifest in &self.manifests {
            let Some(name) = manifest_name(manifest) else {
                warn!(component = %component.name, "skipping manifest without metadata.name");
                continue;
            };
            for reference in component.manifests.iter().filter(|r| r.name == name) {
                match canonicalize(manifest) {
                    Ok(plain) => selected.push(plain),
                    Err(rejection) => warn!(
                        component = %component.name,
                        manifest = %reference.name,
                        %rejection,
                        "skipping manifest"
                    ),
                }
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"
name: shop
description: web shop
components:
  - name: producer
    type: manifest
    manifests:
      - name: producer
      - name: producer-service
  - name: consumer
    type: manifest
    manifests:
      - name: consumer-widget
manifests:
  - apiVersion: v1
    kind: Service
    metadata:
      name: producer-service
  - apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: producer
  - apiVersion: example.com/v1
    kind: Widget
    metadata:
      name: consumer-widget
  - kind: ConfigMap
"#;

    #[test]
    fn parses_descriptor_with_line_breaks() {
        let raw = format!("\r\n{DESCRIPTOR}\r\n");
        let descriptor = ApplicationDescriptor::parse(raw.as_bytes()).unwrap();
        assert_eq!(descriptor.name, "shop");
        assert_eq!(descriptor.components.len(), 2);
        assert_eq!(descriptor.components[0].manifests[1].name, "producer-service");
        assert!(descriptor.components[0].targets.is_null());
        assert_eq!(descriptor.manifests.len(), 4);
    }

    #[test]
    fn malformed_document_is_a_validation_error() {
        let err = ApplicationDescriptor::parse(b"name: [unclosed").unwrap_err();
        assert!(matches!(err, JobManagerError::Validation(_)));
    }

    #[test]
    fn merge_takes_resolved_component_list() {
        let mut descriptor = ApplicationDescriptor::parse(DESCRIPTOR.as_bytes()).unwrap();
        let response: MatchmakerResponse = serde_json::from_str(
            r#"{"components": [{
                "name": "producer",
                "manifests": [{"name": "producer"}],
                "targets": {"cluster_name": "raspis", "orchestrator": "nuvla"}
            }]}"#,
        )
        .unwrap();
        descriptor.merge(response);

        assert_eq!(descriptor.name, "shop");
        assert_eq!(descriptor.components.len(), 1);
        assert_eq!(descriptor.components[0].targets["orchestrator"], "nuvla");
        assert_eq!(descriptor.manifests.len(), 4);
    }

    #[test]
    fn merge_keeps_submitted_fields_the_matchmaker_omits() {
        let mut descriptor = ApplicationDescriptor::parse(
            br#"
name: shop
components:
  - name: producer
    type: manifest
    manifests:
      - name: producer
    requirements:
      cpu: "2"
      architecture: arm64
  - name: consumer
    manifests:
      - name: consumer
"#,
        )
        .unwrap();
        let response: MatchmakerResponse = serde_json::from_str(
            r#"{"components": [
                {"name": "consumer", "targets": []},
                {"name": "producer", "requirements": {"memory": "1Gi"},
                 "targets": {"cluster_name": "raspis", "orchestrator": "ocm"}}
            ]}"#,
        )
        .unwrap();
        descriptor.merge(response);

        let consumer = &descriptor.components[0];
        assert_eq!(consumer.name, "consumer");
        assert_eq!(consumer.manifests[0].name, "consumer");
        assert!(consumer.targets.as_array().unwrap().is_empty());

        let producer = &descriptor.components[1];
        assert_eq!(producer.component_type, "manifest");
        assert_eq!(producer.manifests[0].name, "producer");
        assert_eq!(producer.requirements.memory, "1Gi");
        assert!(producer.requirements.cpu.is_empty());
        assert_eq!(producer.targets["orchestrator"], "ocm");
    }

    #[test]
    fn manifests_follow_declaration_order_and_skip_rejects() {
        let descriptor = ApplicationDescriptor::parse(DESCRIPTOR.as_bytes()).unwrap();

        let producer = descriptor.manifests_for(&descriptor.components[0]);
        assert_eq!(producer.len(), 2);
        assert!(producer[0].yaml_string.contains("kind: Service"));
        assert!(producer[1].yaml_string.contains("kind: Deployment"));

        let consumer = descriptor.manifests_for(&descriptor.components[1]);
        assert!(consumer.is_empty());
    }
}
