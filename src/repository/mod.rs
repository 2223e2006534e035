//! Persistence gateway consumed by the services.
//!
//! [`JobStore`] is the narrow contract the lifecycle code needs from storage:
//! whole-group atomic writes, job lookups, and the `modify_*` operations for
//! read-check-write transitions that must not interleave with other writers.

mod memory;

use async_trait::async_trait;

use crate::error::JobManagerError;
use crate::state_machine::{Incompliance, Job, JobGroup, Resource};

pub use memory::MemoryStore;

/// A transition applied to a stored job inside the store's write critical
/// section. Returning an error aborts the write.
pub type JobUpdate = Box<dyn FnOnce(&mut Job) -> Result<(), JobManagerError> + Send>;

/// Same as [`JobUpdate`] for a whole group and its members.
pub type GroupUpdate = Box<dyn FnOnce(&mut JobGroup) -> Result<(), JobManagerError> + Send>;

/// Precondition checked against the current group before it is removed.
pub type GroupGuard = Box<dyn FnOnce(&JobGroup) -> Result<(), JobManagerError> + Send>;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new group and all its members, or nothing.
    async fn save_group(&self, group: &JobGroup) -> Result<JobGroup, JobManagerError>;

    /// Load a group with its current members, transform it, and write the
    /// group and member set back, all in one critical section.
    async fn modify_group(&self, id: &str, update: GroupUpdate)
    -> Result<JobGroup, JobManagerError>;

    /// Remove member jobs, then the group, if `guard` accepts the group as it
    /// is at removal time. Returns the removed group.
    async fn delete_group(&self, id: &str, guard: GroupGuard) -> Result<JobGroup, JobManagerError>;

    async fn find_group(&self, id: &str) -> Result<JobGroup, JobManagerError>;

    async fn list_groups(&self) -> Result<Vec<JobGroup>, JobManagerError>;

    async fn find_job(&self, id: &str) -> Result<Job, JobManagerError>;

    async fn find_job_by_resource_uid(&self, resource_uid: &str) -> Result<Job, JobManagerError>;

    async fn list_jobs(&self) -> Result<Vec<Job>, JobManagerError>;

    async fn update_job(&self, job: &Job) -> Result<Job, JobManagerError>;

    async fn delete_job(&self, id: &str) -> Result<u64, JobManagerError>;

    /// Load, transform, and write back one job as a single conditional update.
    async fn modify_job(&self, id: &str, update: JobUpdate) -> Result<Job, JobManagerError>;

    /// Replace a job's resource record wholesale.
    async fn replace_resource(
        &self,
        job_id: &str,
        resource: Resource,
    ) -> Result<Resource, JobManagerError>;

    async fn save_incompliance(
        &self,
        incompliance: &Incompliance,
    ) -> Result<Incompliance, JobManagerError>;
}
