use super::{
    event::{AuditEvent, EventType},
    traits::AuditBackend,
};
use crate::error::{Error, ErrorCode, ErrorMetrics, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// High-level audit logger that provides convenient methods for logging scan
/// lifecycle and license/quota events.
#[derive(Clone)]
pub struct AuditLogger {
    backend: Arc<dyn AuditBackend>,
    error_metrics: Arc<ErrorMetrics>,
    context: Arc<RwLock<AuditContext>>,
}

/// Context that persists across audit operations in a request/job scope.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
    pub request_id: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditLogger {
    pub fn new(backend: Arc<dyn AuditBackend>, error_metrics: Arc<ErrorMetrics>) -> Self {
        Self {
            backend,
            error_metrics,
            context: Arc::new(RwLock::new(AuditContext::default())),
        }
    }

    /// Set the audit context for subsequent operations
    pub async fn set_context(&self, context: AuditContext) {
        let mut ctx = self.context.write().await;
        *ctx = context;
    }

    /// Update specific context fields
    pub async fn update_context<F>(&self, updater: F)
    where
        F: FnOnce(&mut AuditContext),
    {
        let mut ctx = self.context.write().await;
        updater(&mut *ctx);
    }

    /// Log a generic audit event
    pub async fn log_event(&self, mut event: AuditEvent) -> Result<()> {
        {
            let ctx = self.context.read().await;

            if event.actor_id.is_none() {
                event.actor_id = ctx.actor_id.clone();
            }
            if event.tenant_id.is_none() {
                event.tenant_id = ctx.tenant_id.clone();
            }
            if event.request_id.is_none() {
                event.request_id = ctx.request_id.clone();
            }
            if event.source_ip.is_none() {
                event.source_ip = ctx.source_ip.clone();
            }
            if event.user_agent.is_none() {
                event.user_agent = ctx.user_agent.clone();
            }
        }

        match event.severity {
            crate::audit::event::EventSeverity::Info => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    actor_id = ?event.actor_id,
                    resource = ?event.resource_type,
                    description = %event.description,
                    "Audit event"
                );
            }
            crate::audit::event::EventSeverity::Warning => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    actor_id = ?event.actor_id,
                    resource = ?event.resource_type,
                    description = %event.description,
                    "Audit event (warning)"
                );
            }
            crate::audit::event::EventSeverity::Critical => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    actor_id = ?event.actor_id,
                    resource = ?event.resource_type,
                    description = %event.description,
                    metadata = ?event.metadata,
                    "Critical audit event"
                );
            }
        }

        match self.backend.store_event(&event).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let audit_error = Error::new(
                    ErrorCode::StorageError,
                    format!("Failed to store audit event: {}", e),
                );
                self.error_metrics.record_error(&audit_error).await;

                error!(
                    event_id = %event.id,
                    error = %e,
                    "Failed to store audit event - this is a critical issue"
                );

                Err(e)
            }
        }
    }

    /// §7: "Rejected" kind — surfaced synchronously, no ScanJob created.
    pub async fn log_scan_rejected(
        &self,
        tenant_id: &str,
        scan_type: &str,
        reason: EventType,
        detail: &str,
    ) -> Result<()> {
        let event = AuditEvent::builder(reason, format!("scan submission rejected: {}", detail))
            .tenant_id(tenant_id)
            .metadata("scan_type", serde_json::Value::String(scan_type.to_string()))
            .outcome(super::event::EventOutcome::Failure)
            .tag("admission")
            .build();

        self.log_event(event).await
    }

    /// §4.4 admission: job created and enqueued.
    pub async fn log_scan_admitted(&self, tenant_id: &str, job_id: &str, scan_type: &str) -> Result<()> {
        let event = AuditEvent::builder(
            EventType::ScanAdmitted,
            format!("scan {} ({}) admitted", job_id, scan_type),
        )
        .tenant_id(tenant_id)
        .resource("scan_job", job_id)
        .metadata("scan_type", serde_json::Value::String(scan_type.to_string()))
        .build();

        self.log_event(event).await
    }

    /// §4.4 state machine transition.
    pub async fn log_scan_state_changed(
        &self,
        tenant_id: &str,
        job_id: &str,
        from_state: &str,
        to_state: &str,
    ) -> Result<()> {
        let event = AuditEvent::builder(
            EventType::ScanStateChanged,
            format!("scan {} transitioned {} -> {}", job_id, from_state, to_state),
        )
        .tenant_id(tenant_id)
        .resource("scan_job", job_id)
        .previous_values(serde_json::Value::String(from_state.to_string()))
        .new_values(serde_json::Value::String(to_state.to_string()))
        .build();

        self.log_event(event).await
    }

    /// §4.5 quota lifecycle (reserve/commit/release).
    pub async fn log_quota_event(
        &self,
        tenant_id: &str,
        event_type: EventType,
        quota_kind: &str,
        amount: i64,
    ) -> Result<()> {
        let event = AuditEvent::builder(
            event_type,
            format!("quota {} for tenant {}: amount={}", quota_kind, tenant_id, amount),
        )
        .tenant_id(tenant_id)
        .metadata("quota_kind", serde_json::Value::String(quota_kind.to_string()))
        .metadata("amount", serde_json::Value::from(amount))
        .build();

        self.log_event(event).await
    }

    /// §4.1 registry hot-reload outcome.
    pub async fn log_registry_reload(&self, accepted: bool, detail: &str) -> Result<()> {
        let (event_type, outcome) = if accepted {
            (EventType::RegistryReloaded, super::event::EventOutcome::Success)
        } else {
            (EventType::RegistryReloadRejected, super::event::EventOutcome::Failure)
        };

        let event = AuditEvent::builder(event_type, detail)
            .severity(if accepted {
                crate::audit::event::EventSeverity::Info
            } else {
                crate::audit::event::EventSeverity::Warning
            })
            .outcome(outcome)
            .build();

        self.log_event(event).await
    }

    /// §4.9 webhook delivery outcome.
    pub async fn log_webhook_delivery(&self, job_id: &str, delivered: bool, detail: &str) -> Result<()> {
        let (event_type, outcome) = if delivered {
            (EventType::WebhookDelivered, super::event::EventOutcome::Success)
        } else {
            (EventType::WebhookFailed, super::event::EventOutcome::Failure)
        };

        let event = AuditEvent::builder(event_type, detail)
            .resource("scan_job", job_id)
            .outcome(outcome)
            .build();

        self.log_event(event).await
    }

    /// Log system events
    pub async fn log_system_event(
        &self,
        event_type: EventType,
        description: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut event = AuditEvent::builder(event_type, description);

        if let Some(meta) = metadata {
            event = event.metadata("system_metadata", meta);
        }

        self.log_event(event.build()).await
    }
}

impl AuditContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
