use std::sync::Arc;

use tracing::{info, warn};

use crate::error::JobManagerError;
use crate::repository::JobStore;
use crate::state_machine::{Job, StateMachine};

/// Hands a dispatched job to the orchestrator instance that claimed it.
pub struct LeaseManager {
    store: Arc<dyn JobStore>,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Claim `job_id` for `owner_id`: `Created` becomes `Progressing`.
    ///
    /// The state check and the write happen in one store update, so of two
    /// pollers racing on the same job only one is granted the lease.
    pub async fn promote(&self, job_id: &str, owner_id: &str) -> Result<Job, JobManagerError> {
        if job_id.is_empty() {
            return Err(JobManagerError::invalid("job_uuid", "is required"));
        }
        if owner_id.is_empty() {
            return Err(JobManagerError::invalid("owner_id", "is required"));
        }
        if uuid::Uuid::parse_str(owner_id).is_err() {
            return Err(JobManagerError::invalid("owner_id", "must be a UUID"));
        }

        let owner = owner_id.to_string();
        let result = self
            .store
            .modify_job(
                job_id,
                Box::new(move |job: &mut Job| StateMachine::promote(job, &owner).map(|_| ())),
            )
            .await;

        match &result {
            Ok(_) => info!(job_id, owner_id, "job promoted"),
            Err(err) => warn!(job_id, owner_id, error = %err, "promote refused"),
        }
        result
    }
}
