use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{JobManagerError, RemediationFailure};
use crate::repository::JobStore;
use crate::state_machine::{Incompliance, Job, StateMachine};

/// Turns policy incompliance reports into remediation work for the job's
/// current owner.
pub struct RemediationHandler {
    store: Arc<dyn JobStore>,
}

impl RemediationHandler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Record the report, then re-arm the affected job as `UpdateDeployment`.
    ///
    /// Any report that parses is stored before it is validated or the job is
    /// looked at. When either fails, the stored report travels with the error.
    pub async fn handle_policy_incompliance(
        &self,
        body: &[u8],
    ) -> Result<Incompliance, RemediationFailure> {
        let mut report: Incompliance = serde_json::from_slice(body).map_err(|e| {
            RemediationFailure::before_persist(JobManagerError::invalid("body", e.to_string()))
        })?;
        report.stamp();

        let report = self
            .store
            .save_incompliance(&report)
            .await
            .map_err(RemediationFailure::before_persist)?;
        info!(
            incompliance_id = %report.id,
            policy = %report.policy_name,
            resource_id = %report.subject.resource_id,
            remediation = %report.remediation,
            "incompliance recorded"
        );

        match self.remediate(&report).await {
            Ok(job) => {
                info!(
                    job_id = %job.id,
                    owner_id = %job.owner_id,
                    sub_type = ?job.sub_type,
                    "job re-armed for remediation"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(incompliance_id = %report.id, error = %err, "remediation not applied");
                Err(RemediationFailure::after_persist(report, err))
            }
        }
    }

    async fn remediate(&self, report: &Incompliance) -> Result<Job, JobManagerError> {
        report.validate()?;
        let job = self
            .store
            .find_job_by_resource_uid(&report.subject.resource_id)
            .await?;
        let kind = report.remediation_kind();
        if kind.is_none() {
            warn!(remediation = %report.remediation, "unknown remediation kind, sub_type left unset");
        }
        self.store
            .modify_job(
                &job.id,
                Box::new(move |job: &mut Job| StateMachine::remediate(job, kind).map(|_| ())),
            )
            .await
    }
}
