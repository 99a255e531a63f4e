//! Shared domain entities (§3), owned by scan-core so that both
//! scan-orchestrator and scan-engine can depend on a single definition
//! without depending on each other.

use crate::{JobId, RegionTag, Severity, TenantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tenant's active license. One active row per tenant; created/updated by
/// an admin path external to this crate, read-only here (§3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub tenant_id: TenantId,
    pub tier: String,
    pub allowed_scanners: Vec<crate::ScanType>,
    pub allowed_regions: Vec<RegionTag>,
    pub feature_flags: Vec<String>,
    /// Quota period name ("scans_per_day", "scans_per_month", ...) to limit.
    pub quotas: HashMap<String, i64>,
    pub max_concurrent_users: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Present only for standalone licenses bound to a single device.
    pub hardware_binding: Option<String>,
}

impl License {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at <= self.valid_until
    }

    pub fn permits_scanner(&self, scan_type: crate::ScanType) -> bool {
        self.allowed_scanners.contains(&scan_type)
    }

    pub fn permits_region(&self, region: &RegionTag) -> bool {
        self.allowed_regions.contains(region)
    }
}

/// Calendar-aligned usage counter. Monotonic non-decreasing within a period
/// (§3 invariant); reset only on boundary rollover by computing a new `period_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub tenant_id: TenantId,
    pub period_key: String,
    pub scan_type: Option<crate::ScanType>,
    pub used: i64,
}

/// An incoming scan submission before admission (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub request_id: JobId,
    pub tenant_id: TenantId,
    pub principal: crate::Principal,
    pub scan_type: crate::ScanType,
    /// Declared jurisdiction of the scan target, checked against
    /// `license.allowed_regions` at admission (§4.5).
    pub target_region: RegionTag,
    /// Scanner-specific target: URL, blob handle, DSN, artifact reference, ...
    pub target: serde_json::Value,
    pub options: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Lifecycle state of a ScanJob (§4.4). Terminal states are immutable once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ScanJobState {
    Queued,
    Admitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl ScanJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanJobState::Succeeded
                | ScanJobState::Failed
                | ScanJobState::Cancelled
                | ScanJobState::TimedOut
        )
    }

    /// Whether a transition from `self` to `next` is a legal edge in the
    /// state machine `Queued -> Admitted -> Running -> {Succeeded|Failed|Cancelled|TimedOut}`.
    pub fn can_transition_to(&self, next: ScanJobState) -> bool {
        use ScanJobState::*;
        match (self, next) {
            (Queued, Admitted) => true,
            (Queued, Cancelled) => true,
            (Admitted, Running) => true,
            (Admitted, Cancelled) => true,
            (Running, Succeeded | Failed | Cancelled | TimedOut) => true,
            _ => false,
        }
    }
}

/// A scan in flight or at rest (§3). `job_id` equals the originating request's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub job_id: JobId,
    pub tenant_id: TenantId,
    pub scan_type: crate::ScanType,
    pub state: ScanJobState,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress_pct: f32,
    pub partial_findings_count: u64,
}

impl ScanJob {
    pub fn new(request: &ScanRequest) -> Self {
        Self {
            job_id: request.request_id,
            tenant_id: request.tenant_id,
            scan_type: request.scan_type,
            state: ScanJobState::Queued,
            worker_id: None,
            started_at: None,
            finished_at: None,
            progress_pct: 0.0,
            partial_findings_count: 0,
        }
    }
}

/// A single detection emitted by a scanner and normalized by the aggregator (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: uuid::Uuid,
    pub job_id: JobId,
    pub finding_type: String,
    pub category: String,
    pub severity: Severity,
    pub location: String,
    pub evidence_excerpt: String,
    pub confidence: f64,
    pub rule_id: String,
    pub region_tags: Vec<RegionTag>,
    pub pii_kind: Option<String>,
}

/// Per-job summary, one per terminal job (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub job_id: JobId,
    pub scan_type: crate::ScanType,
    pub files_scanned: u64,
    pub units_scanned: u64,
    pub findings_total: u64,
    pub by_severity: HashMap<Severity, u64>,
    pub by_category: HashMap<String, u64>,
    /// `pii_kind -> count`, computed by the aggregator (§4.6 item 3).
    pub pii_totals: HashMap<String, u64>,
    pub compliance_score: f64,
    pub duration_ms: u64,
    pub tenant_id: TenantId,
    pub completed_at: DateTime<Utc>,
    /// True when the job did not reach Succeeded but partial findings exist.
    pub partial: bool,
}

/// Append-only per-tenant compliance trajectory point (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceHistoryPoint {
    pub tenant_id: TenantId,
    pub at: DateTime<Utc>,
    pub overall_score: f64,
    pub component_scores: HashMap<String, f64>,
    pub source_job_id: JobId,
}

/// A unit of the `Stream(job_id)` sequence (§4.4): everything a collaborator
/// watching a job needs without re-polling `Query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    StateChanged {
        job_id: JobId,
        from: ScanJobState,
        to: ScanJobState,
        at: DateTime<Utc>,
    },
    Progress {
        job_id: JobId,
        progress_pct: f32,
        at: DateTime<Utc>,
    },
    FindingEmitted {
        job_id: JobId,
        finding: Finding,
    },
    Terminal {
        job_id: JobId,
        state: ScanJobState,
        at: DateTime<Utc>,
    },
}

/// Request-scoped context threaded through admission, scheduling, and
/// scanner execution (§4 REDESIGN FLAGS: no shared mutable globals).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: JobId,
    pub principal: crate::Principal,
    pub deadline: Option<DateTime<Utc>>,
}

impl RequestContext {
    pub fn new(request_id: JobId, principal: crate::Principal, deadline: Option<DateTime<Utc>>) -> Self {
        Self {
            request_id,
            principal,
            deadline,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.principal.tenant_id
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ScanRequest {
        ScanRequest {
            request_id: JobId::new(),
            tenant_id: TenantId(uuid::Uuid::new_v4()),
            principal: crate::Principal {
                tenant_id: TenantId(uuid::Uuid::new_v4()),
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec!["member".to_string()],
            },
            scan_type: crate::ScanType::Website,
            target_region: RegionTag::from("NL"),
            target: serde_json::json!({"url": "https://example.com"}),
            options: serde_json::json!({}),
            submitted_at: Utc::now(),
            deadline: None,
        }
    }

    #[test]
    fn job_state_machine_rejects_illegal_transitions() {
        assert!(ScanJobState::Queued.can_transition_to(ScanJobState::Admitted));
        assert!(ScanJobState::Admitted.can_transition_to(ScanJobState::Running));
        assert!(ScanJobState::Running.can_transition_to(ScanJobState::Succeeded));
        assert!(!ScanJobState::Queued.can_transition_to(ScanJobState::Running));
        assert!(!ScanJobState::Succeeded.can_transition_to(ScanJobState::Running));
    }

    #[test]
    fn queued_jobs_can_be_cancelled_directly() {
        assert!(ScanJobState::Queued.can_transition_to(ScanJobState::Cancelled));
    }

    #[test]
    fn new_scan_job_starts_queued_with_zero_progress() {
        let request = sample_request();
        let job = ScanJob::new(&request);
        assert_eq!(job.state, ScanJobState::Queued);
        assert_eq!(job.progress_pct, 0.0);
        assert_eq!(job.job_id, request.request_id);
    }

    #[test]
    fn terminal_states_are_recognized() {
        assert!(ScanJobState::Succeeded.is_terminal());
        assert!(ScanJobState::TimedOut.is_terminal());
        assert!(!ScanJobState::Running.is_terminal());
    }
}
