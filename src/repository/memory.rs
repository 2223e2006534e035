use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{GroupGuard, GroupUpdate, JobStore, JobUpdate};
use crate::error::JobManagerError;
use crate::state_machine::{Incompliance, Job, JobGroup, Resource};

#[derive(Debug, Clone)]
struct GroupRow {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    name: String,
    description: String,
    job_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct Tables {
    groups: Vec<GroupRow>,
    jobs: HashMap<String, Job>,
    incompliances: Vec<Incompliance>,
}

impl Tables {
    fn group_row(&self, id: &str) -> Result<&GroupRow, JobManagerError> {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .ok_or_else(|| JobManagerError::group_not_found(id))
    }

    fn assemble(&self, row: &GroupRow) -> JobGroup {
        JobGroup {
            id: row.id.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            name: row.name.clone(),
            description: row.description.clone(),
            jobs: row
                .job_ids
                .iter()
                .filter_map(|id| self.jobs.get(id).cloned())
                .collect(),
        }
    }

    // Writes one member row, keeping its original creation time if it exists.
    fn put_job(&mut self, mut job: Job, group_id: &str, now: DateTime<Utc>) -> String {
        job.group_id = group_id.to_string();
        job.created_at = self
            .jobs
            .get(&job.id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        job.updated_at = now;
        link_resource(&mut job);
        let id = job.id.clone();
        self.jobs.insert(id.clone(), job);
        id
    }
}

fn link_resource(job: &mut Job) {
    if let Some(resource) = job.resource.as_mut() {
        resource.job_id = job.id.clone();
        if resource.id.is_empty() {
            resource.id = Uuid::new_v4().to_string();
        }
    }
}

/// In-process [`JobStore`]. A single `RwLock` makes every multi-row write
/// all-or-nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save_group(&self, group: &JobGroup) -> Result<JobGroup, JobManagerError> {
        group.validate()?;
        let mut tables = self.tables.write().await;
        if tables.groups.iter().any(|g| g.id == group.id) {
            return Err(JobManagerError::Storage(format!(
                "job group {} already exists",
                group.id
            )));
        }
        if let Some(job) = group.jobs.iter().find(|j| tables.jobs.contains_key(&j.id)) {
            return Err(JobManagerError::Storage(format!("job {} already exists", job.id)));
        }

        let now = Utc::now();
        let job_ids = group
            .jobs
            .iter()
            .map(|job| tables.put_job(job.clone(), &group.id, now))
            .collect();
        let row = GroupRow {
            id: group.id.clone(),
            created_at: now,
            updated_at: now,
            name: group.name.clone(),
            description: group.description.clone(),
            job_ids,
        };
        let saved = tables.assemble(&row);
        tables.groups.push(row);
        debug!(group_id = %saved.id, jobs = saved.jobs.len(), "job group inserted");
        Ok(saved)
    }

    async fn modify_group(
        &self,
        id: &str,
        update: GroupUpdate,
    ) -> Result<JobGroup, JobManagerError> {
        let mut tables = self.tables.write().await;
        let previous = tables.group_row(id)?.clone();

        let mut group = tables.assemble(&previous);
        update(&mut group)?;
        group.validate()?;

        let now = Utc::now();
        let job_ids: Vec<String> = group
            .jobs
            .iter()
            .map(|job| tables.put_job(job.clone(), &previous.id, now))
            .collect();
        for stale in previous.job_ids.iter().filter(|id| !job_ids.contains(*id)) {
            tables.jobs.remove(stale);
        }

        let row = GroupRow {
            id: previous.id,
            created_at: previous.created_at,
            updated_at: now,
            name: group.name,
            description: group.description,
            job_ids,
        };
        let updated = tables.assemble(&row);
        if let Some(slot) = tables.groups.iter_mut().find(|g| g.id == row.id) {
            *slot = row;
        }
        debug!(group_id = %updated.id, "job group updated");
        Ok(updated)
    }

    async fn delete_group(&self, id: &str, guard: GroupGuard) -> Result<JobGroup, JobManagerError> {
        let mut tables = self.tables.write().await;
        let row = tables.group_row(id)?.clone();
        let snapshot = tables.assemble(&row);
        guard(&snapshot)?;

        for job_id in &row.job_ids {
            tables.jobs.remove(job_id);
        }
        tables.groups.retain(|g| g.id != id);
        debug!(group_id = %id, jobs = snapshot.jobs.len(), "job group deleted");
        Ok(snapshot)
    }

    async fn find_group(&self, id: &str) -> Result<JobGroup, JobManagerError> {
        let tables = self.tables.read().await;
        let row = tables.group_row(id)?;
        Ok(tables.assemble(row))
    }

    async fn list_groups(&self) -> Result<Vec<JobGroup>, JobManagerError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.iter().map(|row| tables.assemble(row)).collect())
    }

    async fn find_job(&self, id: &str) -> Result<Job, JobManagerError> {
        let tables = self.tables.read().await;
        tables
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| JobManagerError::job_not_found(id))
    }

    async fn find_job_by_resource_uid(&self, resource_uid: &str) -> Result<Job, JobManagerError> {
        let tables = self.tables.read().await;
        tables
            .jobs
            .values()
            .filter(|job| !resource_uid.is_empty() && job.resource_uid() == Some(resource_uid))
            .min_by_key(|job| job.created_at)
            .cloned()
            .ok_or_else(|| JobManagerError::NotFound(format!("job for resource {resource_uid}")))
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, JobManagerError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<Job> = tables.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn update_job(&self, job: &Job) -> Result<Job, JobManagerError> {
        job.validate()?;
        let mut tables = self.tables.write().await;
        let existing = tables
            .jobs
            .get(&job.id)
            .ok_or_else(|| JobManagerError::job_not_found(&job.id))?;

        let mut stored = job.clone();
        if stored.group_id.is_empty() {
            stored.group_id = existing.group_id.clone();
        }
        stored.created_at = existing.created_at;
        stored.updated_at = Utc::now();
        link_resource(&mut stored);
        tables.jobs.insert(stored.id.clone(), stored.clone());
        debug!(job_id = %stored.id, state = %stored.state, "job updated");
        Ok(stored)
    }

    async fn delete_job(&self, id: &str) -> Result<u64, JobManagerError> {
        let mut tables = self.tables.write().await;
        if tables.jobs.remove(id).is_none() {
            return Err(JobManagerError::job_not_found(id));
        }
        for group in &mut tables.groups {
            group.job_ids.retain(|job_id| job_id != id);
        }
        debug!(job_id = %id, "job deleted");
        Ok(1)
    }

    async fn modify_job(&self, id: &str, update: JobUpdate) -> Result<Job, JobManagerError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobManagerError::job_not_found(id))?;

        let mut candidate = slot.clone();
        update(&mut candidate)?;
        candidate.validate()?;
        candidate.updated_at = Utc::now();
        *slot = candidate.clone();
        Ok(candidate)
    }

    async fn replace_resource(
        &self,
        job_id: &str,
        mut resource: Resource,
    ) -> Result<Resource, JobManagerError> {
        resource.validate()?;
        let mut tables = self.tables.write().await;
        let job = tables
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobManagerError::job_not_found(job_id))?;

        if resource.id.is_empty() {
            resource.id = job
                .resource
                .as_ref()
                .map(|r| r.id.clone())
                .unwrap_or_default();
        }
        job.resource = Some(resource);
        job.updated_at = Utc::now();
        link_resource(job);
        job.resource
            .clone()
            .ok_or_else(|| JobManagerError::Storage(format!("resource of job {job_id} vanished")))
    }

    async fn save_incompliance(
        &self,
        incompliance: &Incompliance,
    ) -> Result<Incompliance, JobManagerError> {
        let mut tables = self.tables.write().await;
        if tables.incompliances.iter().any(|i| i.id == incompliance.id) {
            return Err(JobManagerError::Storage(format!(
                "incompliance {} already exists",
                incompliance.id
            )));
        }
        tables.incompliances.push(incompliance.clone());
        Ok(incompliance.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{
        Condition, ConditionStatus, JobState, JobType, StateMachine,
    };

    const OWNER: &str = "0b9c7f6e-3d44-4a8e-9d55-6a4c3f0e2b11";

    fn sample_group(members: usize) -> JobGroup {
        let mut group = JobGroup::new("shop".into(), String::new());
        for i in 0..members {
            let mut job = Job::new(JobType::CreateDeployment);
            let mut resource = Resource::awaiting(&format!("component-{i}"));
            resource.resource_uid = format!("R{i}");
            job.resource = Some(resource);
            group.attach(job);
        }
        group
    }

    #[tokio::test]
    async fn save_and_find_group_roundtrip() {
        let store = MemoryStore::new();
        let group = sample_group(2);
        store.save_group(&group).await.unwrap();

        let found = store.find_group(&group.id).await.unwrap();
        assert_eq!(found.jobs.len(), 2);
        assert_eq!(found.jobs[0].id, group.jobs[0].id);
        assert_eq!(found.jobs[0].group_id, group.id);
        let resource = found.jobs[0].resource.as_ref().unwrap();
        assert_eq!(resource.job_id, found.jobs[0].id);
    }

    #[tokio::test]
    async fn invalid_group_writes_nothing() {
        let store = MemoryStore::new();
        let mut group = sample_group(2);
        group.jobs[1].owner_id = "not-a-uuid".into();

        assert!(store.save_group(&group).await.is_err());
        assert!(store.list_jobs().await.unwrap().is_empty());
        assert!(store.find_group(&group.id).await.is_err());
    }

    #[tokio::test]
    async fn delete_group_removes_members() {
        let store = MemoryStore::new();
        let group = sample_group(2);
        store.save_group(&group).await.unwrap();

        let removed = store
            .delete_group(&group.id, Box::new(|_: &JobGroup| Ok::<_, JobManagerError>(())))
            .await
            .unwrap();
        assert_eq!(removed.jobs.len(), 2);
        assert!(store.list_jobs().await.unwrap().is_empty());
        assert!(matches!(
            store.find_group(&group.id).await,
            Err(JobManagerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_group_guard_sees_current_members() {
        let store = MemoryStore::new();
        let group = sample_group(1);
        store.save_group(&group).await.unwrap();
        let id = group.jobs[0].id.clone();
        store
            .modify_job(
                &id,
                Box::new(|job: &mut Job| StateMachine::promote(job, OWNER).map(|_| ())),
            )
            .await
            .unwrap();

        let err = store
            .delete_group(
                &group.id,
                Box::new(|group: &JobGroup| {
                    if group.jobs.iter().all(|j| j.state == JobState::Created) {
                        Ok(())
                    } else {
                        Err(JobManagerError::Conflict("busy".into()))
                    }
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobManagerError::Conflict(_)));
        assert_eq!(store.find_job(&id).await.unwrap().owner_id, OWNER);
    }

    #[tokio::test]
    async fn modify_group_drops_removed_members() {
        let store = MemoryStore::new();
        let group = sample_group(2);
        store.save_group(&group).await.unwrap();

        let updated = store
            .modify_group(
                &group.id,
                Box::new(|group: &mut JobGroup| {
                    group.jobs.truncate(1);
                    Ok::<_, JobManagerError>(())
                }),
            )
            .await
            .unwrap();
        assert_eq!(updated.jobs.len(), 1);
        assert_eq!(store.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn modify_group_refusal_writes_nothing() {
        let store = MemoryStore::new();
        let group = sample_group(2);
        store.save_group(&group).await.unwrap();

        let err = store
            .modify_group(
                &group.id,
                Box::new(|group: &mut JobGroup| {
                    group.name = "renamed".into();
                    group.jobs[0].owner_id = "not-a-uuid".into();
                    Ok::<_, JobManagerError>(())
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobManagerError::Validation(_)));
        let stored = store.find_group(&group.id).await.unwrap();
        assert_eq!(stored.name, "shop");
        assert!(stored.jobs[0].owner_id.is_empty());
    }

    #[tokio::test]
    async fn find_job_by_resource_uid() {
        let store = MemoryStore::new();
        let group = sample_group(2);
        store.save_group(&group).await.unwrap();

        let job = store.find_job_by_resource_uid("R1").await.unwrap();
        assert_eq!(job.id, group.jobs[1].id);
        assert!(store.find_job_by_resource_uid("missing").await.is_err());
        assert!(store.find_job_by_resource_uid("").await.is_err());
    }

    #[tokio::test]
    async fn modify_job_leaves_row_untouched_on_refusal() {
        let store = MemoryStore::new();
        let group = sample_group(1);
        store.save_group(&group).await.unwrap();
        let id = group.jobs[0].id.clone();

        let promoted = store
            .modify_job(
                &id,
                Box::new(|job: &mut Job| StateMachine::promote(job, OWNER).map(|_| ())),
            )
            .await
            .unwrap();
        assert_eq!(promoted.state, JobState::Progressing);

        let err = store
            .modify_job(
                &id,
                Box::new(|job: &mut Job| StateMachine::promote(job, OWNER).map(|_| ())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobManagerError::Conflict(_)));
        assert_eq!(store.find_job(&id).await.unwrap(), promoted);
    }

    #[tokio::test]
    async fn replace_resource_swaps_conditions() {
        let store = MemoryStore::new();
        let group = sample_group(1);
        store.save_group(&group).await.unwrap();
        let job_id = group.jobs[0].id.clone();
        let old_resource_id = group.jobs[0].resource.as_ref().unwrap().id.clone();

        let resource = Resource {
            resource_uid: "R0".into(),
            conditions: vec![Condition::new("Ready", ConditionStatus::True, "Up", "ok")],
            ..Resource::default()
        };
        let stored = store.replace_resource(&job_id, resource).await.unwrap();
        assert_eq!(stored.id, old_resource_id);
        assert_eq!(stored.job_id, job_id);
        assert_eq!(stored.conditions.len(), 1);
    }

    #[tokio::test]
    async fn update_job_keeps_group_membership() {
        let store = MemoryStore::new();
        let group = sample_group(1);
        store.save_group(&group).await.unwrap();

        let mut job = group.jobs[0].clone();
        job.group_id.clear();
        job.namespace = "edge".into();
        let stored = store.update_job(&job).await.unwrap();
        assert_eq!(stored.group_id, group.id);
        assert_eq!(store.find_group(&group.id).await.unwrap().jobs[0].namespace, "edge");
    }

    #[tokio::test]
    async fn incompliances_are_write_once() {
        let store = MemoryStore::new();
        let mut report: Incompliance =
            serde_json::from_str(r#"{"policyName": "cpu", "remediation": "scale-up"}"#).unwrap();
        report.stamp();
        store.save_incompliance(&report).await.unwrap();
        assert!(store.save_incompliance(&report).await.is_err());
    }
}
