//! # Persistence Gateway (C8)
//!
//! Abstracts all durable storage behind a narrow interface. Every read takes
//! a `tenant_id` and the gateway transparently adds it to the underlying
//! query; a caller-supplied `tenant_id` that does not match the row's owner
//! is a programming error, surfaced as
//! [`ErrorCode::CrossTenantQueryViolation`](crate::error::ErrorCode::CrossTenantQueryViolation),
//! never as a partial or filtered result.
//!
//! [`PostgresGateway`] is the production implementation, backed by a single
//! connection pool (no schema-per-tenant: every table carries a `tenant_id`
//! column and every statement binds it). [`InMemoryGateway`] is a test double
//! used by the orchestrator and aggregator test suites.

use crate::{
    audit::{AuditBackend, AuditEvent, DatabaseAuditRepository},
    error::{Error, Result},
    model::{ComplianceHistoryPoint, Finding, License, ScanJob, ScanJobState, ScanResult},
    TenantId,
};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// A page of results plus a cursor for fetching the next page.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_offset: Option<u64>,
}

/// Filters accepted by `query_jobs`. All fields are optional narrowings on
/// top of the mandatory tenant scope.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub scan_type: Option<crate::ScanType>,
    pub state: Option<ScanJobState>,
    pub limit: u32,
    pub offset: u64,
}

/// An inclusive timestamp range for `query_history`.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
}

/// The operation set every storage engine behind the gateway must satisfy
/// (§4.8). Any durable key-value, relational, or document store works; only
/// the tenant-scoping and transactional-commit invariants are load-bearing.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn save_job(&self, job: &ScanJob) -> Result<()>;

    async fn update_job_state(
        &self,
        job_id: crate::JobId,
        new_state: ScanJobState,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()>;

    /// Idempotent per `(job_id, finding_id)`; re-appending a known finding is a no-op.
    async fn append_findings(&self, job_id: crate::JobId, findings: &[Finding]) -> Result<()>;

    /// Insert-or-replace by `job_id`.
    async fn save_scan_result(&self, result: &ScanResult) -> Result<()>;

    async fn append_history(&self, point: &ComplianceHistoryPoint) -> Result<()>;

    async fn append_audit(&self, event: &AuditEvent) -> Result<()>;

    async fn query_jobs(&self, tenant_id: TenantId, filter: JobFilter) -> Result<Page<ScanJob>>;

    async fn query_findings(&self, tenant_id: TenantId, job_id: crate::JobId, limit: u32, offset: u64) -> Result<Page<Finding>>;

    /// The canonical result for a terminal job, or `None` if the job has not
    /// produced one yet (still running, or never admitted).
    async fn query_scan_result(&self, tenant_id: TenantId, job_id: crate::JobId) -> Result<Option<ScanResult>>;

    async fn query_history(&self, tenant_id: TenantId, range: TimeRange) -> Result<Vec<ComplianceHistoryPoint>>;

    /// The tenant's active license row, written only by the external admin
    /// path (§3). `None` if the tenant has never been licensed.
    async fn get_license(&self, tenant_id: TenantId) -> Result<Option<crate::model::License>>;

    /// Persists a terminal job's final state, findings, and `ScanResult` as
    /// one unit: either all three land or none do. `history_point` is
    /// `None` for terminal states the compliance score engine never scores
    /// (Failed, Cancelled, TimedOut).
    async fn finalize_scan(
        &self,
        job_id: crate::JobId,
        new_state: ScanJobState,
        at: chrono::DateTime<chrono::Utc>,
        findings: &[Finding],
        result: &ScanResult,
        history_point: Option<&ComplianceHistoryPoint>,
    ) -> Result<()>;

    async fn check_health(&self) -> Result<()>;
}

/// Verifies a caller-supplied tenant against a row's owning tenant; a
/// mismatch is the "Internal invariant violation" kind from §7 — fail-fast,
/// generic to the caller, full detail only to the audit/operator log.
fn assert_tenant_scope(expected: TenantId, actual: TenantId) -> Result<()> {
    if expected != actual {
        return Err(Error::new(
            crate::error::ErrorCode::CrossTenantQueryViolation,
            format!(
                "query scoped to tenant {} touched a row owned by tenant {}",
                expected, actual
            ),
        ));
    }
    Ok(())
}

/// PostgreSQL-backed gateway. A single pool serves every tenant; isolation is
/// enforced by binding `tenant_id` on every statement rather than by
/// schema-per-tenant connection routing.
#[derive(Clone)]
pub struct PostgresGateway {
    pool: PgPool,
    audit: Arc<DatabaseAuditRepository>,
}

impl PostgresGateway {
    pub async fn new(config: &crate::config::DatabaseConfig) -> Result<Self> {
        info!("initializing persistence gateway pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        let pool = Arc::new(pool);
        let audit = Arc::new(DatabaseAuditRepository::new(pool.clone()));

        Ok(Self {
            pool: (*pool).clone(),
            audit,
        })
    }

    /// The audit-event backend sharing this gateway's connection pool, for
    /// wiring into an [`crate::audit::AuditLogger`] without opening a second pool.
    pub fn audit_backend(&self) -> Arc<DatabaseAuditRepository> {
        self.audit.clone()
    }

    /// Creates the tables owned directly by this gateway. The `audit_events`
    /// table is owned and created by [`DatabaseAuditRepository::initialize`].
    pub async fn initialize_schema(&self) -> Result<()> {
        let setup_sql = include_str!("../sql/scan_platform_schema.sql");
        let statements: Vec<&str> = setup_sql
            .split(';')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        self.audit.initialize().await
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    async fn save_job(&self, job: &ScanJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO scan_jobs (job_id, tenant_id, scan_type, state, worker_id, started_at, finished_at, progress_pct, partial_findings_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (job_id) DO UPDATE SET
                state = EXCLUDED.state,
                worker_id = EXCLUDED.worker_id,
                started_at = EXCLUDED.started_at,
                finished_at = EXCLUDED.finished_at,
                progress_pct = EXCLUDED.progress_pct,
                partial_findings_count = EXCLUDED.partial_findings_count",
        )
        .bind(job.job_id.0)
        .bind(job.tenant_id.0)
        .bind(job.scan_type.as_str())
        .bind(format!("{:?}", job.state))
        .bind(&job.worker_id)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.progress_pct)
        .bind(job.partial_findings_count as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_job_state(
        &self,
        job_id: crate::JobId,
        new_state: ScanJobState,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let finished_at = new_state.is_terminal().then_some(at);

        sqlx::query(
            "UPDATE scan_jobs SET state = $1, finished_at = COALESCE($2, finished_at) WHERE job_id = $3",
        )
        .bind(format!("{:?}", new_state))
        .bind(finished_at)
        .bind(job_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_findings(&self, job_id: crate::JobId, findings: &[Finding]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for finding in findings {
            sqlx::query(
                "INSERT INTO findings (finding_id, job_id, finding_type, category, severity, location, evidence_excerpt, confidence, rule_id, region_tags, pii_kind)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (finding_id) DO NOTHING",
            )
            .bind(finding.finding_id)
            .bind(job_id.0)
            .bind(&finding.finding_type)
            .bind(&finding.category)
            .bind(format!("{:?}", finding.severity))
            .bind(&finding.location)
            .bind(&finding.evidence_excerpt)
            .bind(finding.confidence)
            .bind(&finding.rule_id)
            .bind(
                finding
                    .region_tags
                    .iter()
                    .map(|t| t.0.clone())
                    .collect::<Vec<_>>(),
            )
            .bind(&finding.pii_kind)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_scan_result(&self, result: &ScanResult) -> Result<()> {
        let by_severity = serde_json::to_value(&result.by_severity)?;
        let by_category = serde_json::to_value(&result.by_category)?;
        let pii_totals = serde_json::to_value(&result.pii_totals)?;

        sqlx::query(
            "INSERT INTO scan_results (job_id, tenant_id, scan_type, files_scanned, units_scanned, findings_total, by_severity, by_category, pii_totals, compliance_score, duration_ms, completed_at, partial)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (job_id) DO UPDATE SET
                files_scanned = EXCLUDED.files_scanned,
                units_scanned = EXCLUDED.units_scanned,
                findings_total = EXCLUDED.findings_total,
                by_severity = EXCLUDED.by_severity,
                by_category = EXCLUDED.by_category,
                pii_totals = EXCLUDED.pii_totals,
                compliance_score = EXCLUDED.compliance_score,
                duration_ms = EXCLUDED.duration_ms,
                completed_at = EXCLUDED.completed_at,
                partial = EXCLUDED.partial",
        )
        .bind(result.job_id.0)
        .bind(result.tenant_id.0)
        .bind(result.scan_type.as_str())
        .bind(result.files_scanned as i64)
        .bind(result.units_scanned as i64)
        .bind(result.findings_total as i64)
        .bind(by_severity)
        .bind(by_category)
        .bind(pii_totals)
        .bind(result.compliance_score)
        .bind(result.duration_ms as i64)
        .bind(result.completed_at)
        .bind(result.partial)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_history(&self, point: &ComplianceHistoryPoint) -> Result<()> {
        let component_scores = serde_json::to_value(&point.component_scores)?;

        sqlx::query(
            "INSERT INTO compliance_history (tenant_id, at, overall_score, component_scores, source_job_id)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(point.tenant_id.0)
        .bind(point.at)
        .bind(point.overall_score)
        .bind(component_scores)
        .bind(point.source_job_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        self.audit.store_event(event).await
    }

    async fn query_jobs(&self, tenant_id: TenantId, filter: JobFilter) -> Result<Page<ScanJob>> {
        let limit = if filter.limit == 0 { 50 } else { filter.limit };

        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT job_id, tenant_id, scan_type, state, worker_id, started_at, finished_at, progress_pct, partial_findings_count
             FROM scan_jobs
             WHERE tenant_id = $1
               AND ($2::text IS NULL OR scan_type = $2)
               AND ($3::text IS NULL OR state = $3)
             ORDER BY started_at DESC NULLS LAST
             LIMIT $4 OFFSET $5",
        )
        .bind(tenant_id.0)
        .bind(filter.scan_type.map(|s| s.as_str().to_string()))
        .bind(filter.state.map(|s| format!("{:?}", s)))
        .bind(limit as i64)
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| row.into_scan_job(tenant_id))
            .collect::<Result<Vec<_>>>()?;

        let next_offset = if items.len() as u32 == limit {
            Some(filter.offset + limit as u64)
        } else {
            None
        };

        Ok(Page { items, next_offset })
    }

    async fn query_findings(&self, tenant_id: TenantId, job_id: crate::JobId, limit: u32, offset: u64) -> Result<Page<Finding>> {
        let owner: Option<(uuid::Uuid,)> = sqlx::query_as("SELECT tenant_id FROM scan_jobs WHERE job_id = $1")
            .bind(job_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match owner {
            Some((owner_tenant,)) => assert_tenant_scope(tenant_id, TenantId(owner_tenant))?,
            None => return Ok(Page { items: Vec::new(), next_offset: None }),
        }

        let limit = if limit == 0 { 100 } else { limit };

        let rows = sqlx::query_as::<_, FindingRow>(
            "SELECT finding_id, job_id, finding_type, category, severity, location, evidence_excerpt, confidence, rule_id, region_tags, pii_kind
             FROM findings
             WHERE job_id = $1
             ORDER BY finding_id
             LIMIT $2 OFFSET $3",
        )
        .bind(job_id.0)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.into_iter().map(|row| row.into_finding()).collect::<Result<Vec<_>>>()?;
        let next_offset = if items.len() as u32 == limit {
            Some(offset + limit as u64)
        } else {
            None
        };

        Ok(Page { items, next_offset })
    }

    async fn query_scan_result(&self, tenant_id: TenantId, job_id: crate::JobId) -> Result<Option<ScanResult>> {
        let row = sqlx::query_as::<_, ScanResultRow>(
            "SELECT job_id, tenant_id, scan_type, files_scanned, units_scanned, findings_total, by_severity, by_category, pii_totals, compliance_score, duration_ms, completed_at, partial
             FROM scan_results
             WHERE job_id = $1",
        )
        .bind(job_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_scan_result(tenant_id)).transpose()
    }

    async fn query_history(&self, tenant_id: TenantId, range: TimeRange) -> Result<Vec<ComplianceHistoryPoint>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT tenant_id, at, overall_score, component_scores, source_job_id
             FROM compliance_history
             WHERE tenant_id = $1 AND at BETWEEN $2 AND $3
             ORDER BY at ASC",
        )
        .bind(tenant_id.0)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| row.into_point(tenant_id)).collect()
    }

    async fn get_license(&self, tenant_id: TenantId) -> Result<Option<License>> {
        let row = sqlx::query_as::<_, LicenseRow>(
            "SELECT tenant_id, tier, allowed_scanners, allowed_regions, feature_flags, quotas, max_concurrent_users, valid_from, valid_until, hardware_binding
             FROM licenses
             WHERE tenant_id = $1",
        )
        .bind(tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LicenseRow::into_license).transpose()
    }

    async fn finalize_scan(
        &self,
        job_id: crate::JobId,
        new_state: ScanJobState,
        at: chrono::DateTime<chrono::Utc>,
        findings: &[Finding],
        result: &ScanResult,
        history_point: Option<&ComplianceHistoryPoint>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let finished_at = new_state.is_terminal().then_some(at);

        sqlx::query(
            "UPDATE scan_jobs SET state = $1, finished_at = COALESCE($2, finished_at) WHERE job_id = $3",
        )
        .bind(format!("{:?}", new_state))
        .bind(finished_at)
        .bind(job_id.0)
        .execute(&mut *tx)
        .await?;

        for finding in findings {
            sqlx::query(
                "INSERT INTO findings (finding_id, job_id, finding_type, category, severity, location, evidence_excerpt, confidence, rule_id, region_tags, pii_kind)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (finding_id) DO NOTHING",
            )
            .bind(finding.finding_id)
            .bind(job_id.0)
            .bind(&finding.finding_type)
            .bind(&finding.category)
            .bind(format!("{:?}", finding.severity))
            .bind(&finding.location)
            .bind(&finding.evidence_excerpt)
            .bind(finding.confidence)
            .bind(&finding.rule_id)
            .bind(finding.region_tags.iter().map(|t| t.0.clone()).collect::<Vec<_>>())
            .bind(&finding.pii_kind)
            .execute(&mut *tx)
            .await?;
        }

        let by_severity = serde_json::to_value(&result.by_severity)?;
        let by_category = serde_json::to_value(&result.by_category)?;
        let pii_totals = serde_json::to_value(&result.pii_totals)?;

        sqlx::query(
            "INSERT INTO scan_results (job_id, tenant_id, scan_type, files_scanned, units_scanned, findings_total, by_severity, by_category, pii_totals, compliance_score, duration_ms, completed_at, partial)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (job_id) DO UPDATE SET
                files_scanned = EXCLUDED.files_scanned,
                units_scanned = EXCLUDED.units_scanned,
                findings_total = EXCLUDED.findings_total,
                by_severity = EXCLUDED.by_severity,
                by_category = EXCLUDED.by_category,
                pii_totals = EXCLUDED.pii_totals,
                compliance_score = EXCLUDED.compliance_score,
                duration_ms = EXCLUDED.duration_ms,
                completed_at = EXCLUDED.completed_at,
                partial = EXCLUDED.partial",
        )
        .bind(result.job_id.0)
        .bind(result.tenant_id.0)
        .bind(result.scan_type.as_str())
        .bind(result.files_scanned as i64)
        .bind(result.units_scanned as i64)
        .bind(result.findings_total as i64)
        .bind(by_severity)
        .bind(by_category)
        .bind(pii_totals)
        .bind(result.compliance_score)
        .bind(result.duration_ms as i64)
        .bind(result.completed_at)
        .bind(result.partial)
        .execute(&mut *tx)
        .await?;

        if let Some(point) = history_point {
            let component_scores = serde_json::to_value(&point.component_scores)?;
            sqlx::query(
                "INSERT INTO compliance_history (tenant_id, at, overall_score, component_scores, source_job_id)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(point.tenant_id.0)
            .bind(point.at)
            .bind(point.overall_score)
            .bind(component_scores)
            .bind(point.source_job_id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    scan_type: String,
    state: String,
    worker_id: Option<String>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    progress_pct: f32,
    partial_findings_count: i64,
}

impl JobRow {
    fn into_scan_job(self, expected_tenant: TenantId) -> Result<ScanJob> {
        let row_tenant = TenantId(self.tenant_id);
        assert_tenant_scope(expected_tenant, row_tenant)?;

        Ok(ScanJob {
            job_id: crate::JobId(self.job_id),
            tenant_id: row_tenant,
            scan_type: self.scan_type.parse()?,
            state: parse_job_state(&self.state)?,
            worker_id: self.worker_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            progress_pct: self.progress_pct,
            partial_findings_count: self.partial_findings_count as u64,
        })
    }
}

fn parse_job_state(s: &str) -> Result<ScanJobState> {
    match s {
        "Queued" => Ok(ScanJobState::Queued),
        "Admitted" => Ok(ScanJobState::Admitted),
        "Running" => Ok(ScanJobState::Running),
        "Succeeded" => Ok(ScanJobState::Succeeded),
        "Failed" => Ok(ScanJobState::Failed),
        "Cancelled" => Ok(ScanJobState::Cancelled),
        "TimedOut" => Ok(ScanJobState::TimedOut),
        other => Err(Error::internal(format!("unrecognized job state in storage: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct FindingRow {
    finding_id: uuid::Uuid,
    job_id: uuid::Uuid,
    finding_type: String,
    category: String,
    severity: String,
    location: String,
    evidence_excerpt: String,
    confidence: f64,
    rule_id: String,
    region_tags: Vec<String>,
    pii_kind: Option<String>,
}

impl FindingRow {
    fn into_finding(self) -> Result<Finding> {
        Ok(Finding {
            finding_id: self.finding_id,
            job_id: crate::JobId(self.job_id),
            finding_type: self.finding_type,
            category: self.category,
            severity: parse_severity(&self.severity)?,
            location: self.location,
            evidence_excerpt: self.evidence_excerpt,
            confidence: self.confidence,
            rule_id: self.rule_id,
            region_tags: self.region_tags.into_iter().map(|t| crate::RegionTag(t)).collect(),
            pii_kind: self.pii_kind,
        })
    }
}

fn parse_severity(s: &str) -> Result<crate::Severity> {
    match s {
        "Info" => Ok(crate::Severity::Info),
        "Low" => Ok(crate::Severity::Low),
        "Medium" => Ok(crate::Severity::Medium),
        "High" => Ok(crate::Severity::High),
        "Critical" => Ok(crate::Severity::Critical),
        other => Err(Error::internal(format!("unrecognized severity in storage: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct ScanResultRow {
    job_id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    scan_type: String,
    files_scanned: i64,
    units_scanned: i64,
    findings_total: i64,
    by_severity: serde_json::Value,
    by_category: serde_json::Value,
    pii_totals: serde_json::Value,
    compliance_score: f64,
    duration_ms: i64,
    completed_at: chrono::DateTime<chrono::Utc>,
    partial: bool,
}

impl ScanResultRow {
    fn into_scan_result(self, expected_tenant: TenantId) -> Result<ScanResult> {
        let row_tenant = TenantId(self.tenant_id);
        assert_tenant_scope(expected_tenant, row_tenant)?;

        Ok(ScanResult {
            job_id: crate::JobId(self.job_id),
            tenant_id: row_tenant,
            scan_type: self.scan_type.parse()?,
            files_scanned: self.files_scanned as u64,
            units_scanned: self.units_scanned as u64,
            findings_total: self.findings_total as u64,
            by_severity: serde_json::from_value(self.by_severity)?,
            by_category: serde_json::from_value(self.by_category)?,
            pii_totals: serde_json::from_value(self.pii_totals)?,
            compliance_score: self.compliance_score,
            duration_ms: self.duration_ms as u64,
            completed_at: self.completed_at,
            partial: self.partial,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LicenseRow {
    tenant_id: uuid::Uuid,
    tier: String,
    allowed_scanners: Vec<String>,
    allowed_regions: Vec<String>,
    feature_flags: Vec<String>,
    quotas: serde_json::Value,
    max_concurrent_users: i32,
    valid_from: chrono::DateTime<chrono::Utc>,
    valid_until: chrono::DateTime<chrono::Utc>,
    hardware_binding: Option<String>,
}

impl LicenseRow {
    fn into_license(self) -> Result<License> {
        let allowed_scanners = self
            .allowed_scanners
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<_>>>()?;

        Ok(License {
            tenant_id: TenantId(self.tenant_id),
            tier: self.tier,
            allowed_scanners,
            allowed_regions: self.allowed_regions.into_iter().map(crate::RegionTag).collect(),
            feature_flags: self.feature_flags,
            quotas: serde_json::from_value(self.quotas)?,
            max_concurrent_users: self.max_concurrent_users as u32,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            hardware_binding: self.hardware_binding,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    tenant_id: uuid::Uuid,
    at: chrono::DateTime<chrono::Utc>,
    overall_score: f64,
    component_scores: serde_json::Value,
    source_job_id: uuid::Uuid,
}

impl HistoryRow {
    fn into_point(self, expected_tenant: TenantId) -> Result<ComplianceHistoryPoint> {
        let row_tenant = TenantId(self.tenant_id);
        assert_tenant_scope(expected_tenant, row_tenant)?;

        Ok(ComplianceHistoryPoint {
            tenant_id: row_tenant,
            at: self.at,
            overall_score: self.overall_score,
            component_scores: serde_json::from_value(self.component_scores)?,
            source_job_id: crate::JobId(self.source_job_id),
        })
    }
}

/// In-process test double. Mirrors the Postgres gateway's invariants
/// (tenant scoping, idempotent finding append) without a real database.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    jobs: Arc<RwLock<HashMap<crate::JobId, ScanJob>>>,
    findings: Arc<RwLock<HashMap<crate::JobId, Vec<Finding>>>>,
    results: Arc<RwLock<HashMap<crate::JobId, ScanResult>>>,
    history: Arc<RwLock<Vec<ComplianceHistoryPoint>>>,
    audit: Arc<RwLock<Vec<AuditEvent>>>,
    licenses: Arc<RwLock<HashMap<TenantId, License>>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces a tenant's license. Test-only: production licenses
    /// are written by the external admin path (§3), never by the gateway's
    /// own API.
    pub async fn put_license(&self, license: License) {
        self.licenses.write().await.insert(license.tenant_id, license);
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn save_job(&self, job: &ScanJob) -> Result<()> {
        self.jobs.write().await.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn update_job_state(
        &self,
        job_id: crate::JobId,
        new_state: ScanJobState,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            job.state = new_state;
            if new_state.is_terminal() {
                job.finished_at = Some(at);
            }
        }
        Ok(())
    }

    async fn append_findings(&self, job_id: crate::JobId, findings: &[Finding]) -> Result<()> {
        let mut all = self.findings.write().await;
        let existing = all.entry(job_id).or_default();
        let seen: std::collections::HashSet<uuid::Uuid> = existing.iter().map(|f| f.finding_id).collect();

        for finding in findings {
            if !seen.contains(&finding.finding_id) {
                existing.push(finding.clone());
            }
        }

        Ok(())
    }

    async fn save_scan_result(&self, result: &ScanResult) -> Result<()> {
        self.results.write().await.insert(result.job_id, result.clone());
        Ok(())
    }

    async fn append_history(&self, point: &ComplianceHistoryPoint) -> Result<()> {
        self.history.write().await.push(point.clone());
        Ok(())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        self.audit.write().await.push(event.clone());
        Ok(())
    }

    async fn query_jobs(&self, tenant_id: TenantId, filter: JobFilter) -> Result<Page<ScanJob>> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<ScanJob> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .filter(|j| filter.scan_type.map_or(true, |t| t == j.scan_type))
            .filter(|j| filter.state.map_or(true, |s| s == j.state))
            .cloned()
            .collect();

        matched.sort_by_key(|j| std::cmp::Reverse(j.started_at));

        let limit = if filter.limit == 0 { 50 } else { filter.limit as usize };
        let offset = filter.offset as usize;
        let items: Vec<ScanJob> = matched.into_iter().skip(offset).take(limit).collect();
        let next_offset = if items.len() == limit {
            Some(filter.offset + limit as u64)
        } else {
            None
        };

        Ok(Page { items, next_offset })
    }

    async fn query_findings(&self, tenant_id: TenantId, job_id: crate::JobId, limit: u32, offset: u64) -> Result<Page<Finding>> {
        match self.jobs.read().await.get(&job_id) {
            Some(job) => assert_tenant_scope(tenant_id, job.tenant_id)?,
            None => return Ok(Page { items: Vec::new(), next_offset: None }),
        }

        let all = self.findings.read().await;
        let found = all.get(&job_id).cloned().unwrap_or_default();
        let limit = if limit == 0 { 100 } else { limit as usize };
        let items: Vec<Finding> = found.into_iter().skip(offset as usize).take(limit).collect();
        let next_offset = if items.len() == limit {
            Some(offset + limit as u64)
        } else {
            None
        };

        Ok(Page { items, next_offset })
    }

    async fn query_scan_result(&self, tenant_id: TenantId, job_id: crate::JobId) -> Result<Option<ScanResult>> {
        let results = self.results.read().await;
        match results.get(&job_id) {
            Some(result) => {
                assert_tenant_scope(tenant_id, result.tenant_id)?;
                Ok(Some(result.clone()))
            }
            None => Ok(None),
        }
    }

    async fn query_history(&self, tenant_id: TenantId, range: TimeRange) -> Result<Vec<ComplianceHistoryPoint>> {
        let history = self.history.read().await;
        Ok(history
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.at >= range.from && p.at <= range.to)
            .cloned()
            .collect())
    }

    async fn get_license(&self, tenant_id: TenantId) -> Result<Option<License>> {
        Ok(self.licenses.read().await.get(&tenant_id).cloned())
    }

    async fn finalize_scan(
        &self,
        job_id: crate::JobId,
        new_state: ScanJobState,
        at: chrono::DateTime<chrono::Utc>,
        findings: &[Finding],
        result: &ScanResult,
        history_point: Option<&ComplianceHistoryPoint>,
    ) -> Result<()> {
        self.update_job_state(job_id, new_state, at).await?;
        self.append_findings(job_id, findings).await?;
        self.save_scan_result(result).await?;
        if let Some(point) = history_point {
            self.append_history(point).await?;
        }
        Ok(())
    }

    async fn check_health(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobId, ScanType};

    fn sample_job(tenant_id: TenantId) -> ScanJob {
        ScanJob {
            job_id: JobId::new(),
            tenant_id,
            scan_type: ScanType::Website,
            state: ScanJobState::Queued,
            worker_id: None,
            started_at: None,
            finished_at: None,
            progress_pct: 0.0,
            partial_findings_count: 0,
        }
    }

    #[tokio::test]
    async fn in_memory_gateway_only_returns_the_requesting_tenants_jobs() {
        let gateway = InMemoryGateway::new();
        let tenant_a = TenantId(uuid::Uuid::new_v4());
        let tenant_b = TenantId(uuid::Uuid::new_v4());

        gateway.save_job(&sample_job(tenant_a)).await.unwrap();
        gateway.save_job(&sample_job(tenant_b)).await.unwrap();

        let page = gateway
            .query_jobs(tenant_a, JobFilter::default())
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].tenant_id, tenant_a);
    }

    #[tokio::test]
    async fn append_findings_is_idempotent_per_finding_id() {
        let gateway = InMemoryGateway::new();
        let tenant_id = TenantId(uuid::Uuid::new_v4());
        let job_id = JobId::new();
        let mut job = sample_job(tenant_id);
        job.job_id = job_id;
        gateway.save_job(&job).await.unwrap();

        let finding = Finding {
            finding_id: uuid::Uuid::new_v4(),
            job_id,
            finding_type: "pii".to_string(),
            category: "data_minimisation".to_string(),
            severity: crate::Severity::Medium,
            location: "page=1".to_string(),
            evidence_excerpt: "***-**-1234".to_string(),
            confidence: 0.9,
            rule_id: "nl-bsn".to_string(),
            region_tags: vec![],
            pii_kind: Some("bsn".to_string()),
        };

        gateway.append_findings(job_id, &[finding.clone()]).await.unwrap();
        gateway.append_findings(job_id, &[finding]).await.unwrap();

        let page = gateway.query_findings(tenant_id, job_id, 100, 0).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn cross_tenant_mismatch_is_an_internal_error() {
        let tenant_a = TenantId(uuid::Uuid::new_v4());
        let tenant_b = TenantId(uuid::Uuid::new_v4());
        let result = assert_tenant_scope(tenant_a, tenant_b);
        assert!(result.is_err());
    }
}
