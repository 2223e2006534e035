use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::AppState;
use super::errors::ApiError;
use crate::state_machine::{Condition, Incompliance, Job, JobGroup, OrchestratorType, Resource};
use crate::upstream::Notification;

#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    #[serde(default)]
    pub owner_id: String,
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn home() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Job Manager API" }))
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(state.jobs.list_jobs().await?))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_uuid): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.jobs.find_job(&job_uuid).await?))
}

pub async fn update_job(State(state): State<AppState>, body: Bytes) -> Result<Json<Job>, ApiError> {
    let job = state.jobs.update_job(&body).await.map_err(ApiError::from_input)?;
    Ok(Json(job))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_uuid): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.jobs.delete_job(&job_uuid).await?;
    Ok(Json(json!({ "deleted": removed })))
}

pub async fn executable_jobs(
    State(state): State<AppState>,
    Path((orchestrator, owner_id)): Path<(String, String)>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let orchestrator: OrchestratorType = orchestrator.parse().map_err(ApiError::bad_request)?;
    let jobs = state
        .dispatch
        .find_jobs_to_execute(orchestrator, &owner_id)
        .await?;
    Ok(Json(jobs))
}

pub async fn promote_job(
    State(state): State<AppState>,
    Path(job_uuid): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: PromoteRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid promote body: {e}")))?;
    state
        .leases
        .promote(&job_uuid, &request.owner_id)
        .await
        .map_err(ApiError::from_input)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let token = authorization(&headers);
    let group = state
        .coordinator
        .create_job_group(&body, token.as_deref())
        .await?;
    notify_policy_manager(&state, &group, &body, token);
    Ok((StatusCode::CREATED, Json(group)))
}

// Fire and forget; a failed notification never fails the creation.
fn notify_policy_manager(state: &AppState, group: &JobGroup, document: &[u8], token: Option<String>) {
    let Some(notifier) = state.notifier.clone() else {
        warn!(group_id = %group.id, "policy manager not configured, skipping notification");
        return;
    };
    let notification =
        Notification::for_group(&group.id, &String::from_utf8_lossy(document));
    tokio::spawn(async move {
        match notifier.notify(&notification, token.as_deref()).await {
            Ok(()) => info!(group_id = %notification.app_instance, "policy manager notified"),
            Err(e) => warn!(
                group_id = %notification.app_instance,
                error = %e,
                "policy manager notification failed"
            ),
        }
    });
}

pub async fn list_groups(State(state): State<AppState>) -> Result<Json<Vec<JobGroup>>, ApiError> {
    Ok(Json(state.coordinator.list_job_groups().await?))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_uuid): Path<String>,
) -> Result<Json<JobGroup>, ApiError> {
    Ok(Json(state.coordinator.find_job_group(&group_uuid).await?))
}

pub async fn update_group(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JobGroup>, ApiError> {
    Ok(Json(state.coordinator.update_job_group(&body).await?))
}

pub async fn stop_group(
    State(state): State<AppState>,
    Path(group_uuid): Path<String>,
) -> Result<Json<JobGroup>, ApiError> {
    Ok(Json(state.coordinator.stop_job_group_by_id(&group_uuid).await?))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_uuid): Path<String>,
) -> Result<Json<JobGroup>, ApiError> {
    Ok(Json(state.coordinator.delete_job_group_by_id(&group_uuid).await?))
}

pub async fn create_incompliance(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Incompliance>, ApiError> {
    Ok(Json(state.remediation.handle_policy_incompliance(&body).await?))
}

pub async fn update_resource_status(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Resource>, ApiError> {
    let resource = state
        .resources
        .update_resource_state(&body)
        .await
        .map_err(ApiError::from_input)?;
    Ok(Json(resource))
}

pub async fn resource_status(
    State(state): State<AppState>,
    Path(job_uuid): Path<String>,
) -> Result<Json<Vec<Condition>>, ApiError> {
    Ok(Json(state.resources.conditions(&job_uuid).await?))
}
