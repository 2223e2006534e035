use std::sync::Arc;

use tracing::{info, warn};

use crate::error::JobManagerError;
use crate::repository::JobStore;
use crate::state_machine::{Job, JobState, JobType, RemediationType, StateMachine, Transition};

/// Direct job reads and the orchestrator status write-back.
pub struct JobService {
    store: Arc<dyn JobStore>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn find_job(&self, id: &str) -> Result<Job, JobManagerError> {
        self.store.find_job(id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>, JobManagerError> {
        self.store.list_jobs().await
    }

    /// Remove a single job. Only settled teardown work may be removed.
    pub async fn delete_job(&self, id: &str) -> Result<u64, JobManagerError> {
        let job = self.store.find_job(id).await?;
        if !StateMachine::is_deletable(&job) {
            return Err(JobManagerError::Conflict(format!(
                "job {id} cannot be deleted: it is {} in state {}",
                job.job_type, job.state
            )));
        }
        let removed = self.store.delete_job(id).await?;
        info!(job_id = id, "job deleted");
        Ok(removed)
    }

    /// Store the job an orchestrator reports back.
    ///
    /// The reported state must be reachable from the stored one. A finished
    /// reallocation is turned back into fresh creation work.
    pub async fn update_job(&self, body: &[u8]) -> Result<Job, JobManagerError> {
        let incoming: Job = serde_json::from_slice(body)
            .map_err(|e| JobManagerError::invalid("body", e.to_string()))?;
        if incoming.id.is_empty() {
            return Err(JobManagerError::invalid("ID", "is required"));
        }
        incoming.validate()?;

        let id = incoming.id.clone();
        let result = self
            .store
            .modify_job(
                &id,
                Box::new(move |stored: &mut Job| write_back(stored, incoming).map(|_| ())),
            )
            .await;
        match &result {
            Ok(job) => info!(job_id = %id, state = %job.state, job_type = %job.job_type, "job updated"),
            Err(err) => warn!(job_id = %id, error = %err, "job update refused"),
        }
        result
    }
}

fn write_back(stored: &mut Job, incoming: Job) -> Result<Transition, JobManagerError> {
    let transition = StateMachine::advance(stored, incoming.state)?;
    let previous = std::mem::replace(stored, incoming);

    stored.group_id = previous.group_id;
    stored.created_at = previous.created_at;
    if let (Some(resource), Some(old)) = (stored.resource.as_mut(), previous.resource.as_ref()) {
        if resource.id.is_empty() {
            resource.id = old.id.clone();
        }
        resource.job_id = stored.id.clone();
    }

    let finished_reallocation = stored.job_type == JobType::UpdateDeployment
        && stored.sub_type == Some(RemediationType::Reallocation)
        && stored.state == JobState::Finished;
    if finished_reallocation {
        return StateMachine::reallocate(stored);
    }
    Ok(transition)
}
