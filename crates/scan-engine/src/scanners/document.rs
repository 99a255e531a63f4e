//! Document/Blob scanner (§4.3): PDF/DOCX/TXT/CSV. Each page or
//! section becomes its own `location` (e.g. `page=3`); text extraction
//! itself is the collaborator's job (scan-api hands over already-extracted
//! per-unit text), this scanner only runs detection over it.

use super::{empty_result, Scanner};
use crate::detect::text::scan_text;
use crate::registry::PatternRegistry;
use async_trait::async_trait;
use scan_core::model::{ScanJob, ScanRequest};
use scan_orchestrator::cancellation::CancellationToken;
use scan_orchestrator::executor::{ScanFailure, ScanOutcome};
use scan_orchestrator::lifecycle::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUnit {
    /// e.g. `"page=3"` for a PDF page, `"section=Introduction"` for DOCX.
    pub unit_label: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentScanTarget {
    pub document_kind: String,
    pub units: Vec<DocumentUnit>,
}

pub struct DocumentScanner {
    registry: Arc<PatternRegistry>,
}

impl DocumentScanner {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Scanner for DocumentScanner {
    fn scan_type(&self) -> scan_core::ScanType {
        scan_core::ScanType::Document
    }

    fn default_deadline(&self) -> StdDuration {
        StdDuration::from_secs(10 * 60)
    }

    async fn run(
        &self,
        job: &ScanJob,
        request: &ScanRequest,
        cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<ScanOutcome, ScanFailure> {
        let target: DocumentScanTarget =
            serde_json::from_value(request.target.clone()).map_err(|err| ScanFailure {
                message: format!("malformed document scan target: {err}"),
                retry_safe: false,
                partial_findings: vec![],
            })?;

        let region_set = vec![request.target_region.clone()];
        let mut findings = Vec::new();
        let mut lines_analyzed = 0u64;
        let total = target.units.len().max(1);
        let mut units_scanned = 0u64;

        for (i, unit) in target.units.iter().enumerate() {
            if cancellation.is_cancelled() {
                let mut result = empty_result(job, scan_core::ScanType::Document);
                result.units_scanned = units_scanned;
                result.findings_total = findings.len() as u64;
                result.partial = true;
                return Ok(ScanOutcome { findings, result });
            }

            lines_analyzed += unit.text.lines().count() as u64;
            findings.extend(scan_text(&self.registry, job.job_id, &unit.unit_label, &unit.text, &region_set));
            units_scanned += 1;
            progress.report((i as f32 + 1.0) / total as f32 * 100.0);
        }

        let mut result = empty_result(job, scan_core::ScanType::Document);
        result.units_scanned = units_scanned;
        result.files_scanned = 1;
        result.findings_total = findings.len() as u64;
        let _ = lines_analyzed;
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

    #[tokio::test]
    async fn scans_each_unit_with_its_own_location() {
        let registry = Arc::new(PatternRegistry::with_defaults());
        let scanner = DocumentScanner::new(registry);
        let target = DocumentScanTarget {
            document_kind: "pdf".to_string(),
            units: vec![
                DocumentUnit { unit_label: "page=1".to_string(), text: "no pii here".to_string() },
                DocumentUnit { unit_label: "page=2".to_string(), text: "contact a@b.com".to_string() },
            ],
        };
        let request = ScanRequest {
            request_id: scan_core::JobId::new(),
            tenant_id: TenantId(uuid::Uuid::new_v4()),
            principal: Principal {
                tenant_id: TenantId(uuid::Uuid::new_v4()),
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec![],
            },
            scan_type: ScanType::Document,
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
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].location, "page=2");
        assert_eq!(outcome.result.units_scanned, 2);
    }
}
