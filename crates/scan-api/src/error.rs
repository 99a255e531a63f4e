use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scan_core::Error;
use serde_json::json;
use std::env;
use tracing::{error, warn};

/// API error wrapper that sanitizes responses according to deployment
/// environment while still logging full detail for operators.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    request_id: Option<String>,
    environment: String,
}

impl ApiError {
    pub fn new(error: Error) -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self {
            error,
            request_id: None,
            environment,
        }
    }

    pub fn new_with_environment(error: Error, environment: String) -> Self {
        Self {
            error,
            request_id: None,
            environment,
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Rejections the orchestrator raises against a license or quota are
    /// never authentication failures, but they are still worth a security
    /// audit trail when they repeat for the same tenant.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self.error.code,
            scan_core::ErrorCode::ScanRejectedLicense
                | scan_core::ErrorCode::ScanRejectedQuota
                | scan_core::ErrorCode::ScanRejectedConcurrency
                | scan_core::ErrorCode::HardwareBindingMismatch
                | scan_core::ErrorCode::CrossTenantQueryViolation
                | scan_core::ErrorCode::RateLimitExceeded
        )
    }

    fn log_error(&self) {
        let status_code = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match status_code.as_u16() {
            500..=599 => {
                error!(
                    error_code = %self.error.code,
                    error_id = %self.error.context.error_id,
                    request_id = ?self.request_id,
                    severity = ?self.error.severity,
                    "Internal server error: {}",
                    self.error
                );
            }
            400..=499 => {
                if self.is_security_relevant() {
                    warn!(target: "security_audit",
                        error_code = %self.error.code,
                        error_id = %self.error.context.error_id,
                        request_id = ?self.request_id,
                        tenant_id = ?self.error.context.tenant_id,
                        "Security-relevant client error: {}",
                        self.error
                    );
                } else {
                    tracing::debug!(
                        error_code = %self.error.code,
                        request_id = ?self.request_id,
                        "Client error: {}",
                        self.error
                    );
                }
            }
            _ => {
                tracing::info!(
                    error_code = %self.error.code,
                    request_id = ?self.request_id,
                    "Informational response: {}",
                    self.error
                );
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        self.log_error();

        let error_response = self.error.to_api_response_with_environment(&self.environment);
        let mut response_json = error_response;
        if let Some(request_id) = &self.request_id {
            if let Some(error_obj) = response_json.get_mut("error") {
                error_obj["request_id"] = json!(request_id);
            }
        }

        if self.environment == "production" && status_code.is_server_error() {
            response_json = json!({
                "error": {
                    "code": self.error.code,
                    "message": "An internal error occurred. Please try again later.",
                    "error_id": self.error.context.error_id,
                    "request_id": self.request_id,
                    "timestamp": self.error.context.timestamp
                }
            });
        }

        (status_code, Json(response_json)).into_response()
    }
}
