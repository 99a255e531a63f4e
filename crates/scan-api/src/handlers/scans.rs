//! Scan submission and lifecycle handlers (§4.4/§4.9): `Submit`,
//! `Query`, `Stream`, `Cancel`, and the read side of a completed scan's
//! result, all scoped by the caller's [`Principal`].

use async_stream::stream;
use axum::{
    extract::{Extension, Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use scan_core::database::{JobFilter, PersistenceGateway};
use scan_core::model::ScanRequest;
use scan_core::{JobId, Principal, RegionTag, ScanType};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ApiError;
use crate::state::AppState;

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_scan))
        .route("/", get(list_scans))
        .route("/:id", get(get_scan))
        .route("/:id/cancel", post(cancel_scan))
        .route("/:id/events", get(stream_scan_events))
        .route("/:id/result", get(get_scan_result))
}

#[derive(Debug, Deserialize)]
pub struct SubmitScanRequest {
    pub scan_type: String,
    pub target_region: String,
    pub target: serde_json::Value,
    #[serde(default)]
    pub options: serde_json::Value,
    pub hardware_fingerprint: Option<String>,
}

/// `POST /scans`: `Submit(request) -> job_id` (§4.4).
async fn submit_scan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<SubmitScanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scan_type = ScanType::from_str(&payload.scan_type).map_err(ApiError::from)?;

    let request = ScanRequest {
        request_id: JobId::new(),
        tenant_id: principal.tenant_id,
        principal: principal.clone(),
        scan_type,
        target_region: RegionTag::from(payload.target_region.as_str()),
        target: payload.target,
        options: payload.options,
        submitted_at: chrono::Utc::now(),
        deadline: None,
    };

    let job_id = state
        .orchestrator
        .submit(request, payload.hardware_fingerprint)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(json!({ "job_id": job_id.0 })))
}

#[derive(Debug, Deserialize)]
pub struct ListScansParams {
    pub scan_type: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u64,
}

/// `GET /scans`: tenant-scoped job listing, a thin read over the persistence
/// gateway for pagination/filtering beyond the single-job `Query` op.
async fn list_scans(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListScansParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = JobFilter {
        scan_type: params.scan_type.as_deref().and_then(|s| ScanType::from_str(s).ok()),
        state: params.state.as_deref().and_then(parse_job_state),
        limit: params.limit,
        offset: params.offset,
    };

    let page = state
        .gateway
        .query_jobs(principal.tenant_id, filter)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(json!({
        "jobs": page.items,
        "next_offset": page.next_offset,
    })))
}

fn parse_job_state(s: &str) -> Option<scan_core::model::ScanJobState> {
    use scan_core::model::ScanJobState::*;
    match s {
        "Queued" => Some(Queued),
        "Admitted" => Some(Admitted),
        "Running" => Some(Running),
        "Succeeded" => Some(Succeeded),
        "Failed" => Some(Failed),
        "Cancelled" => Some(Cancelled),
        "TimedOut" => Some(TimedOut),
        _ => None,
    }
}

/// `GET /scans/:id`: `Query(job_id)` (§4.4).
async fn get_scan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(job_id): Path<uuid::Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_id = JobId(job_id);
    match state.orchestrator.query(job_id) {
        Some(job) if job.tenant_id == principal.tenant_id => Ok(Json(json!({ "job": job }))),
        _ => Err(ApiError::from(scan_core::Error::not_found(format!("scan {job_id} not found")))),
    }
}

/// `POST /scans/:id/cancel`: `Cancel(job_id)`, idempotent (§4.4).
async fn cancel_scan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(job_id): Path<uuid::Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_id = JobId(job_id);
    state
        .orchestrator
        .cancel(principal.tenant_id, job_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(json!({ "cancelled": true })))
}

/// `GET /scans/:id/events`: `Stream(job_id)` as Server-Sent Events, live
/// only while the job remains in the active job table (§4.4).
async fn stream_scan_events(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(job_id): Path<uuid::Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job_id = JobId(job_id);
    match state.orchestrator.query(job_id) {
        Some(job) if job.tenant_id == principal.tenant_id => {}
        _ => {
            return Err(ApiError::from(scan_core::Error::not_found(format!(
                "scan {job_id} not found"
            ))))
        }
    }

    let mut receiver = state
        .orchestrator
        .stream(job_id)
        .ok_or_else(|| ApiError::from(scan_core::Error::not_found(format!("scan {job_id} has no active stream"))))?;

    let event_stream = stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                    yield Ok(Event::default().data(payload));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    };

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// `GET /scans/:id/result`: the canonical [`ScanResult`] for a terminal job
/// (§4.6), read from the persistence gateway rather than the in-memory
/// lifecycle table since `query` only keeps active jobs.
async fn get_scan_result(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(job_id): Path<uuid::Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_id = JobId(job_id);
    match state
        .gateway
        .query_scan_result(principal.tenant_id, job_id)
        .await
        .map_err(ApiError::from)?
    {
        Some(result) => Ok(Json(json!({ "result": result }))),
        None => Err(ApiError::from(scan_core::Error::not_found(format!(
            "no result yet for scan {job_id}"
        )))),
    }
}
