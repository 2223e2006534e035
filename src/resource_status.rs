use std::sync::Arc;

use tracing::info;

use crate::error::JobManagerError;
use crate::repository::JobStore;
use crate::state_machine::{Condition, Resource};

/// Mirrors what orchestrators observe about deployed resources.
pub struct ResourceStatusService {
    store: Arc<dyn JobStore>,
}

impl ResourceStatusService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Swap the condition list of the resource named by `resource_uuid`.
    /// Previous conditions are discarded; the submitted order is kept.
    pub async fn update_resource_state(&self, body: &[u8]) -> Result<Resource, JobManagerError> {
        let submitted: Resource = serde_json::from_slice(body)
            .map_err(|e| JobManagerError::invalid("body", e.to_string()))?;
        if submitted.resource_uid.is_empty() {
            return Err(JobManagerError::invalid("resource_uuid", "is required"));
        }
        submitted.validate()?;

        let job = self
            .store
            .find_job_by_resource_uid(&submitted.resource_uid)
            .await?;
        let mut resource = job.resource.unwrap_or_default();
        resource.resource_uid = submitted.resource_uid;
        if !submitted.resource_name.is_empty() {
            resource.resource_name = submitted.resource_name;
        }
        resource.replace_conditions(submitted.conditions);

        let stored = self.store.replace_resource(&job.id, resource).await?;
        info!(
            job_id = %job.id,
            resource_uuid = %stored.resource_uid,
            conditions = stored.conditions.len(),
            "resource status replaced"
        );
        Ok(stored)
    }

    /// Current conditions of the job's resource; empty if it has none yet.
    pub async fn conditions(&self, job_id: &str) -> Result<Vec<Condition>, JobManagerError> {
        let job = self.store.find_job(job_id).await?;
        Ok(job.resource.map(|r| r.conditions).unwrap_or_default())
    }
}
