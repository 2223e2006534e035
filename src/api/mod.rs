//! HTTP surface of the job manager.

mod errors;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};

use crate::config::JobManagerConfig;
use crate::coordinator::GroupCoordinator;
use crate::dispatch::DispatchSelector;
use crate::jobs::JobService;
use crate::lease::LeaseManager;
use crate::remediation::RemediationHandler;
use crate::repository::JobStore;
use crate::resource_status::ResourceStatusService;
use crate::upstream::{Matchmaker, PolicyNotifier};

pub use errors::{ApiError, ErrorBody};

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    pub dispatch: Arc<DispatchSelector>,
    pub leases: Arc<LeaseManager>,
    pub coordinator: Arc<GroupCoordinator>,
    pub remediation: Arc<RemediationHandler>,
    pub resources: Arc<ResourceStatusService>,
    pub notifier: Option<Arc<dyn PolicyNotifier>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        matchmaker: Arc<dyn Matchmaker>,
        notifier: Option<Arc<dyn PolicyNotifier>>,
        config: &JobManagerConfig,
    ) -> Self {
        Self {
            jobs: Arc::new(JobService::new(store.clone())),
            dispatch: Arc::new(DispatchSelector::with_window(
                store.clone(),
                config.staleness_window(),
            )),
            leases: Arc::new(LeaseManager::new(store.clone())),
            coordinator: Arc::new(GroupCoordinator::new(store.clone(), matchmaker)),
            remediation: Arc::new(RemediationHandler::new(store.clone())),
            resources: Arc::new(ResourceStatusService::new(store)),
            notifier,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/jobmanager", get(handlers::home))
        .route("/jobmanager/healthz", get(handlers::healthz))
        .route(
            "/jobmanager/jobs",
            get(handlers::list_jobs).put(handlers::update_job),
        )
        .route(
            "/jobmanager/jobs/executable/:orchestrator/:owner_id",
            get(handlers::executable_jobs),
        )
        .route(
            "/jobmanager/jobs/promote/:job_uuid",
            patch(handlers::promote_job),
        )
        .route(
            "/jobmanager/jobs/:job_uuid",
            get(handlers::get_job).delete(handlers::delete_job),
        )
        .route(
            "/jobmanager/groups",
            post(handlers::create_group)
                .get(handlers::list_groups)
                .put(handlers::update_group),
        )
        .route(
            "/jobmanager/groups/undeploy/:group_uuid",
            put(handlers::stop_group),
        )
        .route(
            "/jobmanager/groups/:group_uuid",
            get(handlers::get_group).delete(handlers::delete_group),
        )
        .route(
            "/jobmanager/policies/incompliance",
            post(handlers::create_incompliance),
        )
        .route(
            "/jobmanager/resources/status",
            put(handlers::update_resource_status),
        )
        .route(
            "/jobmanager/resources/status/:job_uuid",
            get(handlers::resource_status),
        )
        .with_state(state)
}
