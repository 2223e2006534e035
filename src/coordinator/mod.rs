//! Group-level lifecycle: building a job group from an application
//! descriptor and fanning group operations out over its member jobs.

mod descriptor;
mod manifest;
mod placement;

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::JobManagerError;
use crate::repository::JobStore;
use crate::state_machine::{Job, JobGroup, JobType, Resource, Transition};
use crate::upstream::Matchmaker;

pub use descriptor::{ApplicationDescriptor, Component, ManifestRef, Requirements};
pub use manifest::{ManifestRejection, canonicalize, manifest_name};
pub use placement::Placement;

pub struct GroupCoordinator {
    store: Arc<dyn JobStore>,
    matchmaker: Arc<dyn Matchmaker>,
}

impl GroupCoordinator {
    pub fn new(store: Arc<dyn JobStore>, matchmaker: Arc<dyn Matchmaker>) -> Self {
        Self { store, matchmaker }
    }

    /// Resolve a submitted descriptor through the matchmaker and persist the
    /// resulting group. Nothing is written unless every component places.
    pub async fn create_job_group(
        &self,
        document: &[u8],
        authorization: Option<&str>,
    ) -> Result<JobGroup, JobManagerError> {
        let mut descriptor = ApplicationDescriptor::parse(document)?;

        let resolution = self
            .matchmaker
            .matchmake(document, authorization)
            .await
            .inspect_err(|e| error!(error = %e, "matchmaking failed"))?;
        descriptor.merge(resolution);

        let group = assemble(&descriptor)?;
        let saved = self.store.save_group(&group).await?;
        info!(group_id = %saved.id, name = %saved.name, jobs = saved.jobs.len(), "job group created");
        Ok(saved)
    }

    /// Merge a partial group document into the stored group and re-arm every
    /// member for redeployment.
    pub async fn update_job_group(&self, body: &[u8]) -> Result<JobGroup, JobManagerError> {
        let incoming: JobGroup = serde_json::from_slice(body)
            .map_err(|e| JobManagerError::invalid("body", e.to_string()))?;
        if incoming.id.is_empty() {
            return Err(JobManagerError::invalid("ID", "is required"));
        }

        let id = incoming.id.clone();
        let updated = self
            .store
            .modify_group(
                &id,
                Box::new(move |group: &mut JobGroup| {
                    group.merge_update(incoming);
                    Ok(())
                }),
            )
            .await?;
        info!(group_id = %updated.id, jobs = updated.jobs.len(), "job group updated");
        Ok(updated)
    }

    /// Delete a group whose members are all settled teardowns. Returns the
    /// group as it was before deletion.
    pub async fn delete_job_group_by_id(&self, id: &str) -> Result<JobGroup, JobManagerError> {
        if id.is_empty() {
            return Err(JobManagerError::invalid("group_uuid", "is required"));
        }
        let removed = self
            .store
            .delete_group(id, Box::new(|group: &JobGroup| group.ensure_deletable()))
            .await
            .inspect_err(|err| {
                if matches!(err, JobManagerError::Conflict(_)) {
                    warn!(group_id = id, error = %err, "job group deletion refused");
                }
            })?;
        info!(group_id = id, jobs = removed.jobs.len(), "job group deleted");
        Ok(removed)
    }

    /// Undeploy: close never-dispatched members and send the rest back to
    /// their owners as teardown work.
    pub async fn stop_job_group_by_id(&self, id: &str) -> Result<JobGroup, JobManagerError> {
        if id.is_empty() {
            return Err(JobManagerError::invalid("group_uuid", "is required"));
        }
        let updated = self
            .store
            .modify_group(
                id,
                Box::new(|group: &mut JobGroup| {
                    let transitions = group.stop();
                    let closed = transitions
                        .iter()
                        .filter(|t| matches!(t, Transition::Close))
                        .count();
                    debug!(
                        group_id = %group.id,
                        closed,
                        teardown = transitions.len() - closed,
                        "job group stop fan-out"
                    );
                    Ok(())
                }),
            )
            .await?;
        info!(group_id = id, jobs = updated.jobs.len(), "job group stopped");
        Ok(updated)
    }

    pub async fn find_job_group(&self, id: &str) -> Result<JobGroup, JobManagerError> {
        self.store.find_group(id).await
    }

    pub async fn list_job_groups(&self) -> Result<Vec<JobGroup>, JobManagerError> {
        self.store.list_groups().await
    }
}

/// Build the in-memory group for a resolved descriptor: one fresh creation
/// job per component.
pub fn assemble(descriptor: &ApplicationDescriptor) -> Result<JobGroup, JobManagerError> {
    let name = if descriptor.name.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        descriptor.name.clone()
    };
    let mut group = JobGroup::new(name, descriptor.description.clone());

    for component in &descriptor.components {
        let target = Placement::decode(&component.targets).into_target(&component.name)?;

        let mut job = Job::new(JobType::CreateDeployment);
        job.namespace = descriptor.name.clone();
        job.resource = Some(Resource::awaiting(&component.name));
        job.place(target);
        job.manifests = descriptor.manifests_for(component);
        if job.manifests.is_empty() {
            warn!(component = %component.name, "component has no deployable manifests");
        }
        group.attach(job);
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::error::UpstreamError;
    use crate::lease::LeaseManager;
    use crate::repository::MemoryStore;
    use crate::state_machine::{JobState, OrchestratorType};
    use crate::upstream::MatchmakerResponse;

    const OWNER: &str = "0b9c7f6e-3d44-4a8e-9d55-6a4c3f0e2b11";

    const DESCRIPTOR: &str = r#"
name: shop
description: web shop
components:
  - name: producer
    type: manifest
    manifests:
      - name: producer
  - name: consumer
    type: manifest
    manifests:
      - name: consumer
manifests:
  - apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: producer
  - apiVersion: apps/v1
    kind: StatefulSet
    metadata:
      name: consumer
"#;

    struct MockMatchmaker {
        response: Result<serde_json::Value, u16>,
        calls: Mutex<Vec<Option<String>>>,
    }

    impl MockMatchmaker {
        fn ok(response: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(response),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                response: Err(status),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Matchmaker for MockMatchmaker {
        async fn matchmake(
            &self,
            _descriptor: &[u8],
            authorization: Option<&str>,
        ) -> Result<MatchmakerResponse, UpstreamError> {
            self.calls
                .lock()
                .unwrap()
                .push(authorization.map(str::to_string));
            match &self.response {
                Ok(value) => Ok(serde_json::from_value(value.clone()).unwrap()),
                Err(status) => Err(UpstreamError::Status {
                    service: "matchmaker",
                    status: *status,
                    message: "mock".into(),
                }),
            }
        }
    }

    fn placed(targets: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "components": [
                {"name": "producer", "manifests": [{"name": "producer"}], "targets": targets},
                {"name": "consumer", "manifests": [{"name": "consumer"}],
                 "targets": {"cluster_name": "raspis", "orchestrator": "nuvla"}}
            ]
        })
    }

    fn coordinator(
        matchmaker: Arc<MockMatchmaker>,
    ) -> (GroupCoordinator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (GroupCoordinator::new(store.clone(), matchmaker), store)
    }

    async fn stored_group(job_states: &[(JobType, JobState)]) -> (GroupCoordinator, Arc<MemoryStore>, JobGroup) {
        let (coordinator, store) = coordinator(MockMatchmaker::ok(serde_json::json!({})));
        let mut group = JobGroup::new("shop".into(), String::new());
        for &(job_type, state) in job_states {
            let mut job = Job::new(job_type);
            job.state = state;
            if state != JobState::Created {
                job.owner_id = OWNER.into();
            }
            group.attach(job);
        }
        let group = store.save_group(&group).await.unwrap();
        (coordinator, store, group)
    }

    #[tokio::test]
    async fn create_builds_one_job_per_component() {
        let matchmaker = MockMatchmaker::ok(placed(serde_json::json!({
            "cluster_name": "raspis",
            "node_name": "k3s-master",
            "orchestrator": "ocm"
        })));
        let (coordinator, store) = coordinator(matchmaker.clone());

        let group = coordinator
            .create_job_group(DESCRIPTOR.as_bytes(), Some("Bearer abc"))
            .await
            .unwrap();
        assert_eq!(group.name, "shop");
        assert_eq!(group.jobs.len(), 2);

        let producer = &group.jobs[0];
        assert_eq!(producer.job_type, JobType::CreateDeployment);
        assert_eq!(producer.state, JobState::Created);
        assert!(producer.owner_id.is_empty());
        assert_eq!(producer.namespace, "shop");
        assert_eq!(producer.orchestrator, Some(OrchestratorType::Ocm));
        assert_eq!(producer.target.node_name, "k3s-master");
        assert_eq!(producer.manifests.len(), 1);
        assert!(producer.manifests[0].yaml_string.contains("kind: Deployment"));
        let resource = producer.resource.as_ref().unwrap();
        assert_eq!(resource.resource_name, "producer");
        assert_eq!(resource.conditions.len(), 2);

        assert_eq!(group.jobs[1].orchestrator, Some(OrchestratorType::Nuvla));
        assert_eq!(store.list_jobs().await.unwrap().len(), 2);
        assert_eq!(
            matchmaker.calls.lock().unwrap().as_slice(),
            &[Some("Bearer abc".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_placement_leaves_job_unrouted() {
        let (coordinator, _) = coordinator(MockMatchmaker::ok(placed(serde_json::json!([]))));
        let group = coordinator
            .create_job_group(DESCRIPTOR.as_bytes(), None)
            .await
            .unwrap();
        assert!(group.jobs[0].target.is_empty());
        assert!(group.jobs[0].orchestrator.is_none());
    }

    #[tokio::test]
    async fn invalid_placement_persists_nothing() {
        let (coordinator, store) = coordinator(MockMatchmaker::ok(placed(
            serde_json::json!([{"cluster_name": "a"}]),
        )));
        let err = coordinator
            .create_job_group(DESCRIPTOR.as_bytes(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobManagerError::Integrity(_)));
        assert!(store.list_jobs().await.unwrap().is_empty());
        assert!(store.list_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn matchmaker_failure_is_upstream() {
        let (coordinator, store) = coordinator(MockMatchmaker::failing(500));
        let err = coordinator
            .create_job_group(DESCRIPTOR.as_bytes(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobManagerError::Upstream(_)));
        assert!(store.list_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_descriptor_never_reaches_matchmaker() {
        let matchmaker = MockMatchmaker::ok(placed(serde_json::json!([])));
        let (coordinator, _) = coordinator(matchmaker.clone());
        let err = coordinator
            .create_job_group(b"components: {", None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobManagerError::Validation(_)));
        assert!(matchmaker.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn nameless_descriptor_gets_generated_group_name() {
        let descriptor = ApplicationDescriptor::default();
        let group = assemble(&descriptor).unwrap();
        assert!(Uuid::parse_str(&group.name).is_ok());
        assert!(group.jobs.is_empty());
    }

    #[tokio::test]
    async fn stop_closes_created_and_tears_down_the_rest() {
        let (coordinator, store, group) = stored_group(&[
            (JobType::CreateDeployment, JobState::Created),
            (JobType::CreateDeployment, JobState::Progressing),
        ])
        .await;

        let stopped = coordinator.stop_job_group_by_id(&group.id).await.unwrap();
        assert_eq!(stopped.jobs[0].state, JobState::Finished);
        assert!(stopped.jobs[0].owner_id.is_empty());
        assert_eq!(stopped.jobs[1].state, JobState::Created);
        assert_eq!(stopped.jobs[1].job_type, JobType::DeleteDeployment);
        assert_eq!(stopped.jobs[1].owner_id, OWNER);

        let reloaded = store.find_group(&group.id).await.unwrap();
        assert_eq!(reloaded.jobs[1].job_type, JobType::DeleteDeployment);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_racing_promote_keeps_granted_lease() {
        for _ in 0..25 {
            let (coordinator, store, group) =
                stored_group(&[(JobType::CreateDeployment, JobState::Created)]).await;
            let coordinator = Arc::new(coordinator);
            let leases = LeaseManager::new(store.clone());
            let job_id = group.jobs[0].id.clone();

            let stop = {
                let coordinator = coordinator.clone();
                let group_id = group.id.clone();
                tokio::spawn(async move { coordinator.stop_job_group_by_id(&group_id).await })
            };
            let promoted = leases.promote(&job_id, OWNER).await;
            stop.await.unwrap().unwrap();

            let job = store.find_job(&job_id).await.unwrap();
            match promoted {
                // Claimed first: the stop turns the lease into teardown work for its owner.
                Ok(_) => {
                    assert_eq!(job.owner_id, OWNER);
                    assert_eq!(job.state, JobState::Created);
                    assert_eq!(job.job_type, JobType::DeleteDeployment);
                }
                Err(err) => {
                    assert!(matches!(err, JobManagerError::Conflict(_)));
                    assert_eq!(job.state, JobState::Finished);
                    assert!(job.owner_id.is_empty());
                }
            }
        }
    }

    #[tokio::test]
    async fn delete_sees_member_claimed_after_stop() {
        let (coordinator, store, group) = stored_group(&[
            (JobType::DeleteDeployment, JobState::Created),
            (JobType::DeleteDeployment, JobState::Finished),
        ])
        .await;
        LeaseManager::new(store.clone())
            .promote(&group.jobs[0].id, OWNER)
            .await
            .unwrap();

        let err = coordinator.delete_job_group_by_id(&group.id).await.unwrap_err();
        assert!(matches!(err, JobManagerError::Conflict(_)));
        assert_eq!(store.list_jobs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_refuses_while_any_member_blocks() {
        let (coordinator, store, group) = stored_group(&[
            (JobType::DeleteDeployment, JobState::Finished),
            (JobType::CreateDeployment, JobState::Finished),
        ])
        .await;

        let err = coordinator.delete_job_group_by_id(&group.id).await.unwrap_err();
        assert!(matches!(err, JobManagerError::Conflict(_)));
        assert_eq!(store.find_group(&group.id).await.unwrap().jobs.len(), 2);
    }

    #[tokio::test]
    async fn delete_returns_snapshot_and_cascades() {
        let (coordinator, store, group) = stored_group(&[
            (JobType::DeleteDeployment, JobState::Finished),
            (JobType::DeleteDeployment, JobState::Created),
        ])
        .await;

        let snapshot = coordinator.delete_job_group_by_id(&group.id).await.unwrap();
        assert_eq!(snapshot.jobs.len(), 2);
        assert!(matches!(
            coordinator.find_job_group(&group.id).await,
            Err(JobManagerError::NotFound(_))
        ));
        assert!(store.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_group_is_not_found() {
        let (coordinator, _) = coordinator(MockMatchmaker::ok(serde_json::json!({})));
        let err = coordinator
            .delete_job_group_by_id("5d1c7b0e-8f2a-4c3d-9e4f-0a1b2c3d4e5f")
            .await
            .unwrap_err();
        assert!(matches!(err, JobManagerError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_replaces_matching_slots_and_rearms() {
        let (coordinator, _, group) = stored_group(&[
            (JobType::CreateDeployment, JobState::Finished),
            (JobType::CreateDeployment, JobState::Created),
        ])
        .await;

        let mut replacement = group.jobs[1].clone();
        replacement.namespace = "edge".into();
        replacement.manifests.clear();
        let body = serde_json::json!({
            "ID": group.id,
            "appName": "shop-v2",
            "appDescription": "renamed",
            "jobs": [replacement, {"ID": "5d1c7b0e-8f2a-4c3d-9e4f-0a1b2c3d4e5f"}]
        });

        let updated = coordinator
            .update_job_group(body.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(updated.name, "shop-v2");
        assert_eq!(updated.description, "renamed");
        assert_eq!(updated.jobs.len(), 2);
        assert_eq!(updated.jobs[0].job_type, JobType::ReplaceDeployment);
        assert_eq!(updated.jobs[0].state, JobState::Created);
        assert_eq!(updated.jobs[1].namespace, "edge");
        assert_eq!(updated.jobs[1].job_type, JobType::CreateDeployment);
    }

    #[tokio::test]
    async fn update_requires_existing_group() {
        let (coordinator, _) = coordinator(MockMatchmaker::ok(serde_json::json!({})));
        let err = coordinator
            .update_job_group(br#"{"ID": "5d1c7b0e-8f2a-4c3d-9e4f-0a1b2c3d4e5f"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, JobManagerError::NotFound(_)));

        let err = coordinator.update_job_group(br#"{"appName": "x"}"#).await.unwrap_err();
        assert!(matches!(err, JobManagerError::Validation(_)));
    }
}
