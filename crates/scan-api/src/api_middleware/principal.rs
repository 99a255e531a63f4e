//! Principal extraction middleware (§4.9): the auth collaborator is
//! out of scope for this core, so it is trusted to have already
//! authenticated the caller and to forward the result as an `X-Principal`
//! header carrying `{"tenant_id", "user_id", "roles"}` JSON. This is the one
//! place that trust boundary is crossed; everything downstream reads
//! [`Principal`] from request extensions and never re-derives it.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use scan_core::Principal;
use serde_json::json;
use tracing::warn;

pub const PRINCIPAL_HEADER: &str = "x-principal";

pub async fn principal_middleware(mut request: Request, next: Next) -> Response {
    match extract_principal(&request) {
        Some(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        None => {
            warn!("request missing a valid X-Principal header");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": {
                        "message": "missing or malformed X-Principal header"
                    }
                })),
            )
                .into_response()
        }
    }
}

fn extract_principal(request: &Request) -> Option<Principal> {
    let header_value = request.headers().get(PRINCIPAL_HEADER)?;
    let header_str = header_value.to_str().ok()?;
    serde_json::from_str::<Principal>(header_str).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, routing::get, Router};
    use scan_core::{TenantId, UserId};
    use tower::ServiceExt;

    fn sample_header() -> String {
        let principal = Principal {
            tenant_id: TenantId(uuid::Uuid::new_v4()),
            user_id: UserId(uuid::Uuid::new_v4()),
            roles: vec!["member".to_string()],
        };
        serde_json::to_string(&principal).unwrap()
    }

    #[tokio::test]
    async fn valid_principal_header_is_attached_to_request() {
        let app = Router::new()
            .route("/", get(|| async { "OK" }))
            .layer(axum::middleware::from_fn(principal_middleware));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(PRINCIPAL_HEADER, sample_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_principal_header_is_rejected() {
        let app = Router::new()
            .route("/", get(|| async { "OK" }))
            .layer(axum::middleware::from_fn(principal_middleware));

        let response = app
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
