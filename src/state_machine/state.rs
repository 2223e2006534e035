use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::{Job, RemediationType};
use crate::error::JobManagerError;

/// The four states of a deployment job.
///
/// Each job flows through: CREATED → PROGRESSING → {FINISHED, DEGRADED}.
/// Moving back to `Created` only happens through the explicit re-arm
/// operations on [`StateMachine`].
///
/// On the wire the state is an integer (`1..=4`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum JobState {
    #[default]
    Created,
    Progressing,
    Finished,
    Degraded,
}

impl JobState {
    /// Whether an orchestrator may report `next` for a job currently in `self`.
    ///
    /// Re-reporting the current state is allowed and acts as a heartbeat.
    pub fn can_advance_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Created, JobState::Progressing)
                | (JobState::Progressing, JobState::Finished)
                | (JobState::Progressing, JobState::Degraded)
        ) || self == next
    }
}

impl From<JobState> for u8 {
    fn from(state: JobState) -> u8 {
        match state {
            JobState::Created => 1,
            JobState::Progressing => 2,
            JobState::Finished => 3,
            JobState::Degraded => 4,
        }
    }
}

impl TryFrom<u8> for JobState {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(JobState::Created),
            2 => Ok(JobState::Progressing),
            3 => Ok(JobState::Finished),
            4 => Ok(JobState::Degraded),
            other => Err(format!("unknown job state {other}")),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Created => write!(f, "CREATED"),
            JobState::Progressing => write!(f, "PROGRESSING"),
            JobState::Finished => write!(f, "FINISHED"),
            JobState::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// What an orchestrator is asked to do with a job.
///
/// Wire codes continue after the state codes (`5..=8`), which is what
/// deployed orchestrators already send and expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum JobType {
    #[default]
    CreateDeployment,
    DeleteDeployment,
    UpdateDeployment,
    ReplaceDeployment,
}

impl From<JobType> for u8 {
    fn from(job_type: JobType) -> u8 {
        match job_type {
            JobType::CreateDeployment => 5,
            JobType::DeleteDeployment => 6,
            JobType::UpdateDeployment => 7,
            JobType::ReplaceDeployment => 8,
        }
    }
}

impl TryFrom<u8> for JobType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            5 => Ok(JobType::CreateDeployment),
            6 => Ok(JobType::DeleteDeployment),
            7 => Ok(JobType::UpdateDeployment),
            8 => Ok(JobType::ReplaceDeployment),
            other => Err(format!("unknown job type {other}")),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::CreateDeployment => write!(f, "CreateDeployment"),
            JobType::DeleteDeployment => write!(f, "DeleteDeployment"),
            JobType::UpdateDeployment => write!(f, "UpdateDeployment"),
            JobType::ReplaceDeployment => write!(f, "ReplaceDeployment"),
        }
    }
}

/// The result of applying a lifecycle operation to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Organic move along the lifecycle (or a same-state heartbeat).
    Advance { from: JobState, to: JobState },
    /// Explicit reset back to `Created` with the given job type.
    Rearm { from: JobState, job_type: JobType },
    /// A never-dispatched job was closed as `Finished` and released.
    Close,
}

/// Applies lifecycle operations to a `Job`.
///
/// Every operation checks its own precondition and leaves the job untouched
/// when it refuses.
pub struct StateMachine;

impl StateMachine {
    /// Claim a `Created` job for `owner_id` and move it to `Progressing`.
    pub fn promote(job: &mut Job, owner_id: &str) -> Result<Transition, JobManagerError> {
        if job.state != JobState::Created {
            return Err(JobManagerError::Conflict(format!(
                "job cannot be promoted: job {} is {}",
                job.id, job.state
            )));
        }
        job.owner_id = owner_id.to_string();
        job.state = JobState::Progressing;
        Ok(Transition::Advance {
            from: JobState::Created,
            to: JobState::Progressing,
        })
    }

    /// Orchestrator-reported progress.
    pub fn advance(job: &mut Job, next: JobState) -> Result<Transition, JobManagerError> {
        if !job.state.can_advance_to(next) {
            return Err(JobManagerError::Conflict(format!(
                "illegal transition for job {}: {} -> {next}",
                job.id, job.state
            )));
        }
        let from = job.state;
        job.state = next;
        Ok(Transition::Advance { from, to: next })
    }

    /// Re-arm a finished, owned job so its owner applies a remediation.
    ///
    /// Unknown remediation kinds leave `sub_type` unset.
    pub fn remediate(
        job: &mut Job,
        kind: Option<RemediationType>,
    ) -> Result<Transition, JobManagerError> {
        if job.is_unclaimed() {
            return Err(JobManagerError::Conflict(format!(
                "job {} has no owner and cannot be remediated",
                job.id
            )));
        }
        if job.state != JobState::Finished {
            return Err(JobManagerError::Conflict(format!(
                "job cannot be remediated: job {} is {}",
                job.id, job.state
            )));
        }
        let from = job.state;
        job.state = JobState::Created;
        job.job_type = JobType::UpdateDeployment;
        job.sub_type = kind;
        Ok(Transition::Rearm {
            from,
            job_type: JobType::UpdateDeployment,
        })
    }

    /// Reset a finished reallocation back to fresh, unclaimed creation work.
    pub fn reallocate(job: &mut Job) -> Result<Transition, JobManagerError> {
        let eligible = job.job_type == JobType::UpdateDeployment
            && job.sub_type == Some(RemediationType::Reallocation)
            && job.state == JobState::Finished;
        if !eligible {
            return Err(JobManagerError::Conflict(format!(
                "job {} is not a finished reallocation",
                job.id
            )));
        }
        let from = job.state;
        job.job_type = JobType::CreateDeployment;
        job.state = JobState::Created;
        job.owner_id.clear();
        job.sub_type = None;
        job.resource = None;
        Ok(Transition::Rearm {
            from,
            job_type: JobType::CreateDeployment,
        })
    }

    /// Group stop fan-out for one member.
    ///
    /// - `Created`: nothing was deployed, close it and release the owner.
    /// - anything else: re-arm as a teardown for the current owner.
    pub fn stop(job: &mut Job) -> Transition {
        match job.state {
            JobState::Created => {
                job.state = JobState::Finished;
                job.owner_id.clear();
                Transition::Close
            }
            from => {
                job.state = JobState::Created;
                job.job_type = JobType::DeleteDeployment;
                Transition::Rearm {
                    from,
                    job_type: JobType::DeleteDeployment,
                }
            }
        }
    }

    /// Group update fan-out: every member is redeployed, replacing in place
    /// when someone already owns it.
    pub fn reset_for_update(job: &mut Job) -> Transition {
        let from = job.state;
        let job_type = if job.is_unclaimed() {
            JobType::CreateDeployment
        } else {
            JobType::ReplaceDeployment
        };
        job.state = JobState::Created;
        job.job_type = job_type;
        Transition::Rearm { from, job_type }
    }

    /// Whether this member allows its group to be deleted.
    pub fn is_deletable(job: &Job) -> bool {
        job.job_type == JobType::DeleteDeployment
            && matches!(job.state, JobState::Finished | JobState::Created)
    }
}
