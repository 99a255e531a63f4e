//! Code scanner (§4.3): enumerates a local tree up to a size cap,
//! skips binaries by extension, runs the text scanner, and reports
//! code-specific PII findings (secrets, keys, Dutch BSN literals are just
//! entries in the pattern set, not a separate code path).

use super::{empty_result, Scanner};
use crate::detect::text::scan_text;
use crate::registry::PatternRegistry;
use async_trait::async_trait;
use scan_core::model::{Finding, ScanJob, ScanRequest};
use scan_core::RegionTag;
use scan_orchestrator::cancellation::CancellationToken;
use scan_orchestrator::executor::{ScanFailure, ScanOutcome};
use scan_orchestrator::lifecycle::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Files above this size are skipped rather than read in full, to bound
/// memory use on a large checkout (§4.3: "up to a size cap").
pub const MAX_FILE_SIZE_BYTES: u64 = 8 * 1024 * 1024;

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "pdf", "zip", "tar", "gz", "7z", "exe", "dll", "so",
    "dylib", "woff", "woff2", "ttf", "class", "jar", "wasm",
];

/// One file handed over by the collaborator's tree/VCS clone, already read
/// into memory by the caller (the orchestrator never touches the
/// filesystem itself; scan-api's collaborator adapter does).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFile {
    pub path: String,
    pub size_bytes: u64,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeScanTarget {
    pub files: Vec<CodeFile>,
}

fn looks_binary(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .map(|ext| BINARY_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct CodeScanner {
    registry: Arc<PatternRegistry>,
}

impl CodeScanner {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Scanner for CodeScanner {
    fn scan_type(&self) -> scan_core::ScanType {
        scan_core::ScanType::Code
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
        let target: CodeScanTarget = serde_json::from_value(request.target.clone()).map_err(|err| ScanFailure {
            message: format!("malformed code scan target: {err}"),
            retry_safe: false,
            partial_findings: vec![],
        })?;

        let region_set = vec![request.target_region.clone()];
        let mut findings: Vec<Finding> = Vec::new();
        let mut files_scanned = 0u64;
        let mut lines_analyzed = 0u64;
        let total = target.files.len().max(1);

        for (i, file) in target.files.iter().enumerate() {
            if cancellation.is_cancelled() {
                return Ok(partial_outcome(job, findings, files_scanned, lines_analyzed));
            }
            if looks_binary(&file.path) || file.size_bytes > MAX_FILE_SIZE_BYTES {
                continue;
            }

            let (text, _diagnostics) = crate::detect::text::normalize_to_text(&file.contents);
            lines_analyzed += text.lines().count() as u64;
            findings.extend(scan_text(&self.registry, job.job_id, &file.path, &text, &region_set));
            files_scanned += 1;

            progress.report((i as f32 + 1.0) / total as f32 * 100.0);
        }

        Ok(ScanOutcome {
            result: {
                let mut result = empty_result(job, scan_core::ScanType::Code);
                result.files_scanned = files_scanned;
                result.units_scanned = files_scanned;
                result.findings_total = findings.len() as u64;
                result
            },
            findings,
        })
    }
}

fn partial_outcome(job: &ScanJob, findings: Vec<Finding>, files_scanned: u64, lines_analyzed: u64) -> ScanOutcome {
    let mut result = empty_result(job, scan_core::ScanType::Code);
    result.files_scanned = files_scanned;
    result.units_scanned = lines_analyzed;
    result.findings_total = findings.len() as u64;
    result.partial = true;
    ScanOutcome { findings, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{model::ScanRequest, Principal, ScanType, TenantId, UserId};
    use scan_orchestrator::lifecycle::ProgressReporter;

    struct NoopProgress;
    impl ProgressReporter for NoopProgress {
        fn report(&self, _progress_pct: f32) {}
    }

    fn sample_request(target: CodeScanTarget) -> ScanRequest {
        ScanRequest {
            request_id: scan_core::JobId::new(),
            tenant_id: TenantId(uuid::Uuid::new_v4()),
            principal: Principal {
                tenant_id: TenantId(uuid::Uuid::new_v4()),
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec![],
            },
            scan_type: ScanType::Code,
            target_region: RegionTag::from("NL"),
            target: serde_json::to_value(target).unwrap(),
            options: serde_json::json!({}),
            submitted_at: chrono::Utc::now(),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn skips_binary_files_and_scans_text_files() {
        let registry = Arc::new(PatternRegistry::with_defaults());
        let scanner = CodeScanner::new(registry);
        let target = CodeScanTarget {
            files: vec![
                CodeFile { path: "logo.png".to_string(), size_bytes: 10, contents: vec![0, 1, 2] },
                CodeFile {
                    path: "src/lib.rs".to_string(),
                    size_bytes: 30,
                    contents: b"let email = \"a@b.com\";".to_vec(),
                },
            ],
        };
        let request = sample_request(target);
        let job = ScanJob::new(&request);
        let cancellation = CancellationToken::default();
        let outcome = scanner
            .run(&job, &request, cancellation, Arc::new(NoopProgress))
            .await
            .unwrap();
        assert_eq!(outcome.result.files_scanned, 1);
        assert_eq!(outcome.findings.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_yields_partial_result() {
        let registry = Arc::new(PatternRegistry::with_defaults());
        let scanner = CodeScanner::new(registry);
        let target = CodeScanTarget {
            files: vec![CodeFile { path: "a.rs".to_string(), size_bytes: 3, contents: b"ok".to_vec() }],
        };
        let request = sample_request(target);
        let job = ScanJob::new(&request);
        let cancellation = CancellationToken::default();
        cancellation.cancel();
        let outcome = scanner
            .run(&job, &request, cancellation, Arc::new(NoopProgress))
            .await
            .unwrap();
        assert!(outcome.result.partial);
    }
}
