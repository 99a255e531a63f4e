//! Scanner implementations (C3, §4.3): one module per scan type,
//! mirroring the teacher's one-module-per-domain layout. Every scanner
//! implements the shared [`Scanner`] trait; [`EngineExecutor`] is the single
//! `scan_orchestrator::executor::ScanExecutor` the orchestrator drives,
//! dispatching to the right [`Scanner`] by `request.scan_type` (§9:
//! "closed enum + registry of implementations").

pub mod ai_model;
pub mod api;
pub mod code;
pub mod database;
pub mod document;
pub mod dpia;
pub mod image;
pub mod website;

use crate::aggregate::{aggregate, dedupe_and_reassign_severity, ScanUnitCounts};
use crate::registry::PatternRegistry;
use crate::score::ComplianceScoreEngine;
use async_trait::async_trait;
use scan_core::model::ScanJob;
use scan_core::model::ScanRequest;
use scan_core::ScanType;
use scan_orchestrator::cancellation::CancellationToken;
use scan_orchestrator::executor::{ScanExecutor, ScanFailure, ScanOutcome};
use scan_orchestrator::lifecycle::ProgressReporter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::warn;

/// Implemented once per scan type. `run` never panics (§4.3):
/// a recoverable failure is surfaced as `Ok(ScanOutcome)` with
/// `result.partial = true`, not an `Err`; only an unrecoverable setup
/// error (malformed target, missing credentials) returns `Err`.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn scan_type(&self) -> ScanType;

    /// Whether the orchestrator may retry a transient failure from this
    /// scanner (§4.4: "only if the scanner declares itself
    /// retry-safe"). Rule-engine/detection errors are never retry-safe.
    fn is_retry_safe(&self) -> bool {
        false
    }

    fn default_deadline(&self) -> StdDuration;

    async fn run(
        &self,
        job: &ScanJob,
        request: &ScanRequest,
        cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<ScanOutcome, ScanFailure>;
}

/// The orchestrator's single `ScanExecutor`: looks up the scanner for
/// `request.scan_type`, runs it, and canonicalizes its raw outcome through
/// the Results Aggregator (C6) and Compliance Score Engine (C7) before
/// handing it back — every scan type's `ScanOutcome` goes through the same
/// dedup, severity-reassignment, and scoring pass regardless of what the
/// individual scanner reported. Built once at startup from
/// `default_scanners`, so this crate never registers a scanner per job.
pub struct EngineExecutor {
    scanners: HashMap<ScanType, Arc<dyn Scanner>>,
    registry: Arc<PatternRegistry>,
    score_engine: Arc<ComplianceScoreEngine>,
}

impl EngineExecutor {
    pub fn new(
        scanners: HashMap<ScanType, Arc<dyn Scanner>>,
        registry: Arc<PatternRegistry>,
        score_engine: Arc<ComplianceScoreEngine>,
    ) -> Self {
        Self { scanners, registry, score_engine }
    }

    pub fn with_defaults(registry: Arc<PatternRegistry>, score_engine: Arc<ComplianceScoreEngine>) -> Self {
        Self::new(default_scanners(registry.clone()), registry, score_engine)
    }

    /// Re-runs dedup/severity-reassignment over the scanner's raw findings,
    /// rebuilds `ScanResult` through the aggregator, and scores it — the
    /// scanner's own `partial` determination is preserved since at this
    /// point the job is still `Running`, not yet the terminal state the
    /// aggregator's own partial computation assumes.
    fn canonicalize(&self, job: &ScanJob, outcome: ScanOutcome) -> ScanOutcome {
        let was_partial = outcome.result.partial;
        let counts = ScanUnitCounts {
            files_or_pages_or_units: outcome.result.files_scanned,
            lines_analyzed: outcome.result.units_scanned,
        };

        let findings = dedupe_and_reassign_severity(&self.registry, outcome.findings);
        let mut result = aggregate(
            &self.registry,
            job,
            findings.clone(),
            counts,
            outcome.result.duration_ms,
            outcome.result.completed_at,
        );
        result.partial = was_partial;

        let principle_scores = self.score_engine.principle_scores(&findings);
        result.compliance_score = self.score_engine.overall_score(&principle_scores);

        ScanOutcome { findings, result }
    }
}

#[async_trait]
impl ScanExecutor for EngineExecutor {
    async fn execute(
        &self,
        job: &ScanJob,
        request: &ScanRequest,
        cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<ScanOutcome, ScanFailure> {
        let scanner = match self.scanners.get(&request.scan_type) {
            Some(scanner) => scanner,
            None => {
                warn!(scan_type = %request.scan_type, "no scanner registered for this scan type");
                return Err(ScanFailure {
                    message: format!("no scanner registered for {}", request.scan_type),
                    retry_safe: false,
                    partial_findings: vec![],
                });
            }
        };

        let outcome = scanner.run(job, request, cancellation, progress).await?;
        Ok(self.canonicalize(job, outcome))
    }
}

/// Builds one scanner instance per `ScanType`, each holding the same shared
/// registry `Arc` (§4.3: "stateless across invocations; all state
/// lives in ctx, the passed request, and the registry snapshot").
pub fn default_scanners(registry: Arc<PatternRegistry>) -> HashMap<ScanType, Arc<dyn Scanner>> {
    let mut scanners: HashMap<ScanType, Arc<dyn Scanner>> = HashMap::new();
    scanners.insert(ScanType::Code, Arc::new(code::CodeScanner::new(registry.clone())));
    scanners.insert(ScanType::Document, Arc::new(document::DocumentScanner::new(registry.clone())));
    scanners.insert(ScanType::Image, Arc::new(image::ImageScanner::new(registry.clone())));
    scanners.insert(ScanType::Database, Arc::new(database::DatabaseScanner::new(registry.clone())));
    scanners.insert(ScanType::Api, Arc::new(api::ApiScanner::new(registry.clone())));
    scanners.insert(ScanType::Website, Arc::new(website::WebsiteScanner::new(registry.clone())));
    scanners.insert(ScanType::AiModel, Arc::new(ai_model::AiModelScanner::new(registry.clone())));
    scanners.insert(ScanType::Dpia, Arc::new(dpia::DpiaScanner::new()));
    scanners
}

/// Shared helper: an empty, freshly-timestamped [`ScanOutcome`] base that
/// each scanner fills in. Kept here so every scanner stamps `job_id` and
/// `tenant_id` identically.
pub(crate) fn empty_result(job: &ScanJob, scan_type: ScanType) -> scan_core::model::ScanResult {
    scan_core::model::ScanResult {
        job_id: job.job_id,
        scan_type,
        files_scanned: 0,
        units_scanned: 0,
        findings_total: 0,
        by_severity: HashMap::new(),
        by_category: HashMap::new(),
        pii_totals: HashMap::new(),
        compliance_score: 100.0,
        duration_ms: 0,
        tenant_id: job.tenant_id,
        completed_at: chrono::Utc::now(),
        partial: false,
    }
}
