//! Liveness (`/health`) and readiness (`/ready`) endpoints for load
//! balancers and orchestrators. Readiness additionally exercises the
//! persistence gateway and the Redis connection the queue/quota/session
//! subsystems share.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use scan_core::database::PersistenceGateway;
use serde_json::json;
use tracing::error;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = Object)),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "scan-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Service is ready", body = Object),
        (status = 503, description = "Service is not ready", body = Object)
    ),
    tag = "health"
)]
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let gateway_healthy = match state.gateway.check_health().await {
        Ok(()) => true,
        Err(err) => {
            error!("persistence gateway health check failed: {}", err);
            false
        }
    };

    let redis_healthy = {
        let mut conn = state.redis.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => true,
            Err(err) => {
                error!("redis health check failed: {}", err);
                false
            }
        }
    };

    let is_ready = gateway_healthy && redis_healthy;
    let status = if is_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "ready": is_ready,
            "checks": {
                "persistence": gateway_healthy,
                "redis": redis_healthy,
            }
        })),
    )
}
