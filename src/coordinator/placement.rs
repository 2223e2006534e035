use serde_json::Value;

use crate::error::JobManagerError;
use crate::state_machine::Target;

/// A component's resolved placement as sent by the matchmaker.
///
/// The matchmaker answers with an object for a placed component and an
/// empty list when it found nowhere to put it. Anything else is garbage.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Unset,
    Single(Target),
    Invalid(String),
}

impl Placement {
    pub fn decode(raw: &Value) -> Self {
        match raw {
            Value::Object(_) => match serde_json::from_value::<Target>(raw.clone()) {
                Ok(target) => Placement::Single(target),
                Err(e) => Placement::Invalid(format!("malformed target object: {e}")),
            },
            Value::Array(items) if items.is_empty() => Placement::Unset,
            Value::Array(items) => {
                Placement::Invalid(format!("unexpected list of {} targets", items.len()))
            }
            Value::Null => Placement::Invalid("targets missing".to_string()),
            other => Placement::Invalid(format!("unexpected targets value {other}")),
        }
    }

    /// The target to place a job on, or an integrity fault naming `component`.
    pub fn into_target(self, component: &str) -> Result<Target, JobManagerError> {
        match self {
            Placement::Single(target) => Ok(target),
            Placement::Unset => Ok(Target::default()),
            Placement::Invalid(reason) => Err(JobManagerError::Integrity(format!(
                "component {component}: {reason}"
            ))),
        }
    }
}
