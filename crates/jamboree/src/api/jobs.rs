//! Job status, asset listing, and cancellation endpoints.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

use setlist::{ApiKey, Job, JobStatus, JobType};

use crate::api::error::ApiError;
use crate::state::AppState;

/// Public view of a job row: internal fields (dedupe key, worker, raw
/// params) stay hidden.
fn view(job: &Job) -> serde_json::Value {
    json!({
        "id": job.id,
        "type": job.job_type,
        "status": job.status,
        "progress": job.progress,
        "message": job.status_message,
        "result": job.result,
        "error": job.error,
        "createdAt": to_rfc3339(Some(job.created_at)),
        "updatedAt": to_rfc3339(Some(job.updated_at)),
        "completedAt": to_rfc3339(job.completed_at),
    })
}

fn to_rfc3339(ms: Option<i64>) -> Option<String> {
    ms.and_then(DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// Fetch a job the caller is allowed to see. Other tenants' jobs read as
/// missing.
fn fetch_owned(state: &AppState, api_key: &ApiKey, id: &str) -> Result<Job, ApiError> {
    let job = state.store.get_job(id)?.ok_or(ApiError::NotFound("job"))?;
    match &job.api_key_id {
        Some(owner) if owner != &api_key.id => Err(ApiError::NotFound("job")),
        _ => Ok(job),
    }
}

pub async fn get_job(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = fetch_owned(&state, &api_key, &id)?;
    Ok(Json(view(&job)))
}

/// Assets of a job; a pipeline aggregates its children's.
pub async fn list_assets(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = fetch_owned(&state, &api_key, &id)?;

    let mut assets = state.store.list_assets_for_job(&job.id)?;
    if job.job_type == JobType::Pipeline {
        for child in state.store.list_children(&job.id)? {
            assets.extend(state.store.list_assets_for_job(&child.id)?);
        }
    }

    let body: Vec<serde_json::Value> = assets
        .iter()
        .map(|a| {
            json!({
                "id": a.id,
                "jobId": a.job_id,
                "kind": a.kind,
                "mime": a.mime,
                "url": a.url,
                "durationSec": a.duration_sec,
                "sizeBytes": a.size_bytes,
                "createdAt": to_rfc3339(Some(a.created_at)),
            })
        })
        .collect();

    Ok(Json(json!({ "jobId": job.id, "assets": body })))
}

/// Cancel a job; a pipeline's queued children go with it.
pub async fn cancel(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = fetch_owned(&state, &api_key, &id)?;

    let cancelled = state.store.cancel(&job.id, Utc::now())?;
    if cancelled && job.job_type == JobType::Pipeline {
        for child in state.store.list_children(&job.id)? {
            if child.status == JobStatus::Queued {
                state.store.cancel(&child.id, Utc::now())?;
            }
        }
    }

    let refreshed = state
        .store
        .get_job(&job.id)?
        .ok_or(ApiError::NotFound("job"))?;
    Ok(Json(json!({
        "id": refreshed.id,
        "status": refreshed.status,
        "cancelled": cancelled,
    })))
}
