use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::JobManagerError;
use crate::repository::JobStore;
use crate::state_machine::{Job, JobState, JobType, OrchestratorType};

/// Default reclaim threshold for a lease that stopped being refreshed.
pub const DEFAULT_STALENESS_WINDOW_SECS: i64 = 300;

/// Whether `job` may be handed to `caller` polling on behalf of `orchestrator`.
///
/// The four arms are mutually exclusive:
/// 1. unclaimed creation work, for anyone;
/// 2. creation work whose lease went stale under a different owner;
/// 3. remediation work addressed back to its owner;
/// 4. teardown work addressed back to its owner.
///
/// A stale lease is never offered back to the owner that let it go stale.
pub fn is_executable(
    job: &Job,
    orchestrator: OrchestratorType,
    caller: &str,
    cutoff: DateTime<Utc>,
) -> bool {
    if job.orchestrator != Some(orchestrator) {
        return false;
    }
    match (job.job_type, job.state) {
        (JobType::CreateDeployment, JobState::Created) => job.is_unclaimed(),
        (JobType::CreateDeployment, JobState::Progressing | JobState::Degraded) => {
            job.owner_id != caller && job.updated_at < cutoff
        }
        (JobType::UpdateDeployment, JobState::Created)
        | (JobType::DeleteDeployment, JobState::Created) => job.owner_id == caller,
        _ => false,
    }
}

/// Filter a snapshot of stored jobs down to what `caller` may take, keeping
/// the snapshot order.
pub fn select_executable<'a>(
    jobs: impl IntoIterator<Item = &'a Job>,
    orchestrator: OrchestratorType,
    caller: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<Job> {
    let cutoff = now - window;
    jobs.into_iter()
        .filter(|job| is_executable(job, orchestrator, caller, cutoff))
        .cloned()
        .collect()
}

/// Answers orchestrator polls against the job store.
pub struct DispatchSelector {
    store: Arc<dyn JobStore>,
    window: Duration,
}

impl DispatchSelector {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self::with_window(store, Duration::seconds(DEFAULT_STALENESS_WINDOW_SECS))
    }

    pub fn with_window(store: Arc<dyn JobStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub async fn find_jobs_to_execute(
        &self,
        orchestrator: OrchestratorType,
        caller: &str,
    ) -> Result<Vec<Job>, JobManagerError> {
        let jobs = self.store.list_jobs().await?;
        let executable = select_executable(&jobs, orchestrator, caller, Utc::now(), self.window);
        debug!(
            %orchestrator,
            owner_id = caller,
            scanned = jobs.len(),
            executable = executable.len(),
            "dispatch poll"
        );
        Ok(executable)
    }
}
