//! Tenant-level read views: compliance history/forecast (§4.7) and current
//! license usage against quota (§4.5).

use axum::{
    extract::{Extension, Path, Query, State},
    routing::get,
    Json, Router,
};
use scan_core::database::TimeRange;
use scan_core::{Principal, TenantId};
use scan_orchestrator::period_key;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

pub fn tenant_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/history", get(get_history))
        .route("/:id/forecast", get(get_forecast))
        .route("/:id/usage", get(get_usage))
}

fn ensure_self(principal: &Principal, requested: uuid::Uuid) -> Result<TenantId, ApiError> {
    if principal.tenant_id.0 != requested {
        return Err(ApiError::from(scan_core::Error::validation(
            "a tenant may only read its own compliance and usage data",
        )));
    }
    Ok(principal.tenant_id)
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
}

/// `GET /tenants/:id/history?from=..&to=..`: compliance score trend (§4.7).
async fn get_history(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(tenant_id): Path<uuid::Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenant_id = ensure_self(&principal, tenant_id)?;

    let range = TimeRange {
        from: params.from,
        to: params.to,
    };

    let points = state.score_engine.get_history(tenant_id, range).await.map_err(ApiError::from)?;

    Ok(Json(json!({ "history": points })))
}

/// `GET /tenants/:id/forecast`: the regression input behind the 90-day
/// compliance forecast (§4.7); the caller's dashboard renders the line, this
/// only supplies the points, mean, slope, and variance it needs.
async fn get_forecast(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(tenant_id): Path<uuid::Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenant_id = ensure_self(&principal, tenant_id)?;

    let forecast = state
        .score_engine
        .forecast_input(tenant_id, chrono::Utc::now())
        .await
        .map_err(ApiError::from)?;

    Ok(Json(json!({
        "daily_points": forecast.daily_points,
        "mean": forecast.mean,
        "slope": forecast.slope,
        "variance": forecast.variance,
    })))
}

/// `GET /tenants/:id/usage`: current counters against every `scans_per_*`
/// quota the active license declares, for the caller's current period
/// (§4.5). Read-only: does not touch the reservation path.
async fn get_usage(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(tenant_id): Path<uuid::Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenant_id = ensure_self(&principal, tenant_id)?;

    let license = state
        .license_provider
        .active_license(tenant_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::from(scan_core::Error::not_found(format!("no active license for tenant {tenant_id}"))))?;

    let now = chrono::Utc::now();
    let mut usage = serde_json::Map::new();

    for (kind, limit) in &license.quotas {
        if !kind.starts_with("scans_per") {
            continue;
        }

        let key = period_key(kind, now);
        let used = state.quotas.used(tenant_id, &key, kind).await.map_err(ApiError::from)?;

        usage.insert(
            kind.clone(),
            json!({
                "used": used,
                "limit": limit,
                "period": key,
            }),
        );
    }

    Ok(Json(json!({
        "tenant_id": tenant_id,
        "tier": license.tier,
        "max_concurrent_users": license.max_concurrent_users,
        "quotas": usage,
    })))
}
