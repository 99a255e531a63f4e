//! Webhook delivery: a fire-and-forget notification fired on every terminal
//! job transition. Delivery is modeled as a trait so the transport (HTTP
//! POST, a message bus, ...) stays swappable; the default implementation
//! only logs, which is what test and reference deployments use.

use async_trait::async_trait;
use scan_core::audit::{AuditEvent, AuditLogger, EventType};
use scan_core::model::{ScanJobState, ScanResult};
use scan_core::TenantId;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn notify_terminal(&self, tenant_id: TenantId, state: ScanJobState, result: Option<&ScanResult>);
}

/// Default sink: logs the delivery attempt and records it to the audit
/// trail. A real HTTP delivery implementation would retry with backoff and
/// sign the payload; this scanning platform ships only the observable shape
/// of that contract.
pub struct LoggingWebhookSink {
    audit: Arc<AuditLogger>,
}

impl LoggingWebhookSink {
    pub fn new(audit: Arc<AuditLogger>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl WebhookSink for LoggingWebhookSink {
    async fn notify_terminal(&self, tenant_id: TenantId, state: ScanJobState, result: Option<&ScanResult>) {
        info!(%tenant_id, ?state, "webhook: terminal scan transition");

        let event_type = if result.is_some() {
            EventType::WebhookDelivered
        } else {
            EventType::WebhookFailed
        };

        let event = AuditEvent::builder(event_type, format!("scan terminal transition to {state:?}"))
            .tenant_id(tenant_id.to_string())
            .build();

        if let Err(err) = self.audit.log_event(event).await {
            warn!(error = %err, "failed to record webhook delivery audit event");
        }
    }
}
