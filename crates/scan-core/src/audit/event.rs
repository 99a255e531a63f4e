use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Severity levels for audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Warning,
    Critical,
}

/// Event types for the scanning platform's audit trail (§3's
/// AuditEvent entity, §4.4's admission/lifecycle transitions, §4.5's
/// license/quota rejections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Admission (§7: "Rejected" kind, audited as action=submit,outcome=rejected)
    ScanSubmitted,
    ScanAdmitted,
    ScanRejectedLicense,
    ScanRejectedQuota,
    ScanRejectedConcurrency,
    ScanRejectedUnknownType,

    // Lifecycle (§4.4 state machine)
    ScanStateChanged,
    ScanCancelled,
    ScanTimedOut,
    ScanCompleted,
    ScanFailed,

    // License & quota (§4.5)
    QuotaReserved,
    QuotaCommitted,
    QuotaReleased,

    // Registry (§4.1)
    RegistryReloaded,
    RegistryReloadRejected,

    // External interfaces (§4.9)
    WebhookDelivered,
    WebhookFailed,

    // System
    SystemStartup,
    SystemShutdown,
    ConfigurationChanged,

    /// Business-specific extension point.
    Custom(String),
}

/// Core audit event structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this event
    pub id: String,
    /// Event type
    pub event_type: EventType,
    /// Event severity
    pub severity: EventSeverity,
    /// Timestamp when event occurred
    pub timestamp: DateTime<Utc>,
    /// User ID who performed the action (if applicable)
    pub actor_id: Option<String>,
    /// Tenant/Organization context
    pub tenant_id: Option<String>,
    /// Request ID for correlation
    pub request_id: Option<String>,
    /// Resource being acted upon (e.g. "scan_job")
    pub resource_type: Option<String>,
    /// ID of the resource (e.g. job_id)
    pub resource_id: Option<String>,
    /// Source IP address
    pub source_ip: Option<String>,
    /// User agent
    pub user_agent: Option<String>,
    /// Human-readable description
    pub description: String,
    /// Structured metadata
    pub metadata: HashMap<String, serde_json::Value>,
    /// Previous values (for state transitions)
    pub previous_values: Option<serde_json::Value>,
    /// New values (for state transitions)
    pub new_values: Option<serde_json::Value>,
    /// Operation outcome
    pub outcome: EventOutcome,
    /// Additional tags for filtering
    pub tags: Vec<String>,
}

/// Event outcome enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Success,
    Failure,
    Partial,
    Unknown,
}

impl std::fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventOutcome::Success => write!(f, "success"),
            EventOutcome::Failure => write!(f, "failure"),
            EventOutcome::Partial => write!(f, "partial"),
            EventOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// Builder for creating audit events
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    pub fn new(event_type: EventType, description: impl Into<String>) -> Self {
        Self {
            event: AuditEvent {
                id: Uuid::new_v4().to_string(),
                event_type,
                severity: EventSeverity::Info,
                timestamp: Utc::now(),
                actor_id: None,
                tenant_id: None,
                request_id: None,
                resource_type: None,
                resource_id: None,
                source_ip: None,
                user_agent: None,
                description: description.into(),
                metadata: HashMap::new(),
                previous_values: None,
                new_values: None,
                outcome: EventOutcome::Success,
                tags: Vec::new(),
            },
        }
    }

    pub fn severity(mut self, severity: EventSeverity) -> Self {
        self.event.severity = severity;
        self
    }

    pub fn actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.event.actor_id = Some(actor_id.into());
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.event.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.event.request_id = Some(request_id.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.event.resource_type = Some(resource_type.into());
        self.event.resource_id = Some(resource_id.into());
        self
    }

    pub fn source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.event.source_ip = Some(source_ip.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.event.user_agent = Some(user_agent.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.event.metadata.insert(key.into(), value);
        self
    }

    pub fn previous_values(mut self, values: serde_json::Value) -> Self {
        self.event.previous_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: serde_json::Value) -> Self {
        self.event.new_values = Some(values);
        self
    }

    pub fn outcome(mut self, outcome: EventOutcome) -> Self {
        self.event.outcome = outcome;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.event.tags.push(tag.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.event.tags.extend(tags);
        self
    }

    pub fn build(self) -> AuditEvent {
        self.event
    }
}

impl AuditEvent {
    /// Create a new builder
    pub fn builder(event_type: EventType, description: impl Into<String>) -> AuditEventBuilder {
        AuditEventBuilder::new(event_type, description)
    }

    /// Check if event should be alerted
    pub fn should_alert(&self) -> bool {
        matches!(self.severity, EventSeverity::Critical)
            || matches!(self.outcome, EventOutcome::Failure)
            || matches!(
                self.event_type,
                EventType::ScanFailed | EventType::RegistryReloadRejected | EventType::WebhookFailed
            )
    }

    /// Get event category for grouping
    pub fn category(&self) -> &'static str {
        match &self.event_type {
            EventType::ScanSubmitted
            | EventType::ScanAdmitted
            | EventType::ScanRejectedLicense
            | EventType::ScanRejectedQuota
            | EventType::ScanRejectedConcurrency
            | EventType::ScanRejectedUnknownType => "admission",

            EventType::ScanStateChanged
            | EventType::ScanCancelled
            | EventType::ScanTimedOut
            | EventType::ScanCompleted
            | EventType::ScanFailed => "lifecycle",

            EventType::QuotaReserved | EventType::QuotaCommitted | EventType::QuotaReleased => {
                "license"
            }

            EventType::RegistryReloaded | EventType::RegistryReloadRejected => "registry",

            EventType::WebhookDelivered | EventType::WebhookFailed => "integration",

            EventType::SystemStartup | EventType::SystemShutdown | EventType::ConfigurationChanged => {
                "system"
            }

            EventType::Custom(_) => "custom",
        }
    }

    /// Convert to a loggable format
    pub fn to_log_format(&self) -> String {
        format!(
            "[{}] {} by {} on {}: {}",
            self.severity,
            self.event_type,
            self.actor_id.as_deref().unwrap_or("system"),
            self.resource_type.as_deref().unwrap_or("unknown"),
            self.description
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Custom(name) => write!(f, "CUSTOM_{}", name.to_uppercase()),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_events_categorize_as_admission() {
        let event = AuditEvent::builder(EventType::ScanRejectedQuota, "tenant over quota").build();
        assert_eq!(event.category(), "admission");
    }

    #[test]
    fn registry_reload_rejection_should_alert() {
        let event = AuditEvent::builder(EventType::RegistryReloadRejected, "duplicate rule_id").build();
        assert!(event.should_alert());
    }
}
