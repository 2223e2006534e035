use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::Job;
use super::state::{StateMachine, Transition};
use crate::error::{FieldError, JobManagerError};

/// An application's deployment intent: the jobs created from one descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGroup {
    #[serde(rename = "ID", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "appName", default)]
    pub name: String,
    #[serde(rename = "appDescription", default)]
    pub description: String,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl JobGroup {
    pub fn new(name: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            description,
            jobs: Vec::new(),
        }
    }

    /// Add a member, stamping it with this group's identity.
    pub fn attach(&mut self, mut job: Job) {
        job.group_id = self.id.clone();
        job.job_group_name = self.name.clone();
        job.job_group_description = self.description.clone();
        self.jobs.push(job);
    }

    /// Fails with a conflict naming the first member that blocks deletion.
    pub fn ensure_deletable(&self) -> Result<(), JobManagerError> {
        match self.jobs.iter().find(|j| !StateMachine::is_deletable(j)) {
            None => Ok(()),
            Some(job) => Err(JobManagerError::Conflict(format!(
                "job group {} cannot be deleted: job {} is {} in state {}",
                self.id, job.id, job.job_type, job.state
            ))),
        }
    }

    pub fn stop(&mut self) -> Vec<Transition> {
        self.jobs.iter_mut().map(StateMachine::stop).collect()
    }

    /// Apply a partial update.
    ///
    /// Name and description are overwritten. An incoming job whose id matches
    /// a member replaces that member's slot wholesale; incoming jobs with no
    /// matching member are ignored. Every member is then re-armed for
    /// redeployment.
    pub fn merge_update(&mut self, incoming: JobGroup) {
        self.name = incoming.name;
        self.description = incoming.description;

        let mut replacements: HashMap<String, Job> = incoming
            .jobs
            .into_iter()
            .map(|job| (job.id.clone(), job))
            .collect();
        for slot in &mut self.jobs {
            if let Some(replacement) = replacements.remove(&slot.id) {
                *slot = replacement;
            }
        }

        for job in &mut self.jobs {
            job.group_id = self.id.clone();
            StateMachine::reset_for_update(job);
        }
    }

    pub fn validate(&self) -> Result<(), JobManagerError> {
        let mut errors = Vec::new();
        if self.id.is_empty() {
            errors.push(FieldError::new("ID", "is required"));
        }
        for (i, job) in self.jobs.iter().enumerate() {
            if let Err(JobManagerError::Validation(job_errors)) = job.validate() {
                errors.extend(job_errors.into_iter().map(|e| FieldError {
                    field: format!("jobs[{i}].{}", e.field),
                    message: e.message,
                }));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(JobManagerError::Validation(errors))
        }
    }
}
