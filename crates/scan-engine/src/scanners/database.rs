//! Database scanner (§4.3): accepts a DSN + read-only credentials
//! and a schema catalog the collaborator has already discovered, samples
//! rows per table under the selected scan-mode budget, and runs the
//! tabular analyzer. FAST/SMART/DEEP differ only in sample size.

use super::{empty_result, Scanner};
use crate::detect::tabular::{classify_table, SampledRow, ScanMode};
use crate::registry::PatternRegistry;
use async_trait::async_trait;
use scan_core::model::{ScanJob, ScanRequest};
use scan_orchestrator::cancellation::CancellationToken;
use scan_orchestrator::executor::{ScanFailure, ScanOutcome};
use scan_orchestrator::lifecycle::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// One table already sampled by the collaborator's database adapter, up to
/// `ScanMode::row_budget()` rows — this crate never opens a DB connection
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampledTable {
    pub table_name: String,
    pub rows: Vec<SampledRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseScanTarget {
    pub dsn_label: String,
    pub mode: ScanMode,
    pub tables: Vec<SampledTable>,
}

pub struct DatabaseScanner {
    registry: Arc<PatternRegistry>,
}

impl DatabaseScanner {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Scanner for DatabaseScanner {
    fn scan_type(&self) -> scan_core::ScanType {
        scan_core::ScanType::Database
    }

    fn is_retry_safe(&self) -> bool {
        // A transient connection drop mid-scan is safe to retry; the
        // scanner holds no state across invocations (§4.4).
        true
    }

    fn default_deadline(&self) -> StdDuration {
        StdDuration::from_secs(30 * 60)
    }

    async fn run(
        &self,
        job: &ScanJob,
        request: &ScanRequest,
        cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<ScanOutcome, ScanFailure> {
        let target: DatabaseScanTarget =
            serde_json::from_value(request.target.clone()).map_err(|err| ScanFailure {
                message: format!("malformed database scan target: {err}"),
                retry_safe: false,
                partial_findings: vec![],
            })?;

        let region_set = vec![request.target_region.clone()];
        let budget = target.mode.row_budget();
        let mut findings = Vec::new();
        let mut by_category: HashMap<String, u64> = HashMap::new();
        let total = target.tables.len().max(1);
        let mut tables_scanned = 0u64;
        let mut rows_sampled = 0u64;

        for (i, table) in target.tables.iter().enumerate() {
            if cancellation.is_cancelled() {
                let mut result = empty_result(job, scan_core::ScanType::Database);
                result.files_scanned = tables_scanned;
                result.units_scanned = rows_sampled;
                result.findings_total = findings.len() as u64;
                result.by_category = by_category;
                result.partial = true;
                return Ok(ScanOutcome { findings, result });
            }

            let sampled_rows: Vec<SampledRow> = table.rows.iter().take(budget).cloned().collect();
            rows_sampled += sampled_rows.len() as u64;

            let (table_findings, classifications) =
                classify_table(&self.registry, job.job_id, &table.table_name, &sampled_rows, &region_set);
            for column in &classifications {
                if let Some(kind) = &column.majority_pii_kind {
                    *by_category.entry(kind.clone()).or_insert(0) += 1;
                }
            }
            findings.extend(table_findings);
            tables_scanned += 1;
            progress.report((i as f32 + 1.0) / total as f32 * 100.0);
        }

        let mut result = empty_result(job, scan_core::ScanType::Database);
        result.files_scanned = tables_scanned;
        result.units_scanned = rows_sampled;
        result.findings_total = findings.len() as u64;
        result.by_category = by_category;
        Ok(ScanOutcome { findings, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{model::ScanRequest, Principal, RegionTag, ScanType, TenantId, UserId};

    struct NoopProgress;
    impl ProgressReporter for NoopProgress {
        fn report(&self, _progress_pct: f32) {}
    }

    fn row(email: &str) -> SampledRow {
        let mut row = HashMap::new();
        row.insert("email".to_string(), email.to_string());
        row
    }

    #[tokio::test]
    async fn fast_mode_caps_rows_sampled_at_its_budget() {
        let registry = Arc::new(PatternRegistry::with_defaults());
        let scanner = DatabaseScanner::new(registry);
        let rows: Vec<SampledRow> = (0..150).map(|i| row(&format!("user{i}@example.com"))).collect();
        let target = DatabaseScanTarget {
            dsn_label: "prod-ro".to_string(),
            mode: ScanMode::Fast,
            tables: vec![SampledTable { table_name: "users".to_string(), rows }],
        };
        let request = ScanRequest {
            request_id: scan_core::JobId::new(),
            tenant_id: TenantId(uuid::Uuid::new_v4()),
            principal: Principal {
                tenant_id: TenantId(uuid::Uuid::new_v4()),
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec![],
            },
            scan_type: ScanType::Database,
            target_region: RegionTag::from("NL"),
            target: serde_json::to_value(target).unwrap(),
            options: serde_json::json!({}),
            submitted_at: chrono::Utc::now(),
            deadline: None,
        };
        let job = ScanJob::new(&request);
        let outcome = scanner
            .run(&job, &request, CancellationToken::default(), Arc::new(NoopProgress))
            .await
            .unwrap();
        assert_eq!(outcome.result.units_scanned, 100);
    }
}
