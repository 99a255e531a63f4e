//! DPIA scanner (§4.3): a questionnaire state machine, not a
//! content scan. Exactly 5 categories x 5 questions = 25 items, each
//! answer in {0=No, 1=Partial, 2=Yes}.
//!
//! Open question: the worked example (§8 S2) does not reconcile
//! with a literal reading of "per-category score = sum of answers, scaled
//! to 0-10" (a category's 5 answers already sum to at most 10, so no
//! further scaling applies) — this scanner implements that literal,
//! deterministic reading rather than the example's numbers. See DESIGN.md.

use super::{empty_result, Scanner};
use async_trait::async_trait;
use scan_core::model::{Finding, ScanJob, ScanRequest};
use scan_core::Severity;
use scan_orchestrator::cancellation::CancellationToken;
use scan_orchestrator::executor::{ScanFailure, ScanOutcome};
use scan_orchestrator::lifecycle::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// The 5 fixed categories of the questionnaire (§4.3, §8 S2).
pub const CATEGORIES: [&str; 5] = [
    "data_category",
    "processing_activity",
    "rights_impact",
    "transfer_sharing",
    "security_measures",
];

/// Categories whose High rating alone forces `dpia_required = true`
/// (§4.3).
const FORCING_CATEGORIES: [&str; 3] = ["data_category", "processing_activity", "rights_impact"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

fn classify(score: u8) -> RiskLevel {
    if score >= 7 {
        RiskLevel::High
    } else if score >= 4 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpiaScanTarget {
    /// `category name -> [answer; 5]`, each answer in {0, 1, 2}.
    pub answers: HashMap<String, [u8; 5]>,
}

/// rule_id -> recommendation text, keyed on `"{category}.{risk_level}"`.
fn recommendation_for(category: &str, risk: RiskLevel) -> Option<&'static str> {
    match (category, risk) {
        ("data_category", RiskLevel::High) => {
            Some("Conduct a full Data Protection Impact Assessment per GDPR Art. 35 before processing begins.")
        }
        ("data_category", RiskLevel::Medium) => Some("Document the legal basis for each special category of data processed."),
        ("processing_activity", RiskLevel::High) => Some("Restrict automated decision-making scope and add a human-review step (GDPR Art. 22)."),
        ("processing_activity", RiskLevel::Medium) => Some("Review processing purposes against the original collection notice."),
        ("rights_impact", RiskLevel::High) => Some("Establish a data-subject rights request procedure with a defined SLA."),
        ("rights_impact", RiskLevel::Medium) => Some("Audit the existing access/erasure request workflow for completeness."),
        ("transfer_sharing", RiskLevel::High) => Some("Put Standard Contractual Clauses or an adequacy decision in place before any transfer."),
        ("transfer_sharing", RiskLevel::Medium) => Some("Map all third-party data recipients and their transfer mechanisms."),
        ("security_measures", RiskLevel::High) => Some("Commission an independent security audit and close any findings before go-live."),
        ("security_measures", RiskLevel::Medium) => Some("Review encryption-at-rest and access-control coverage for the affected systems."),
        (_, RiskLevel::Low) => None,
        _ => None,
    }
}

pub struct DpiaScanner;

impl DpiaScanner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DpiaScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scanner for DpiaScanner {
    fn scan_type(&self) -> scan_core::ScanType {
        scan_core::ScanType::Dpia
    }

    fn default_deadline(&self) -> StdDuration {
        StdDuration::from_secs(60)
    }

    async fn run(
        &self,
        job: &ScanJob,
        request: &ScanRequest,
        _cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<ScanOutcome, ScanFailure> {
        let target: DpiaScanTarget = serde_json::from_value(request.target.clone()).map_err(|err| ScanFailure {
            message: format!("malformed dpia scan target: {err}"),
            retry_safe: false,
            partial_findings: vec![],
        })?;

        for category in CATEGORIES {
            if !target.answers.contains_key(category) {
                return Err(ScanFailure {
                    message: format!("dpia questionnaire is missing category '{category}'"),
                    retry_safe: false,
                    partial_findings: vec![],
                });
            }
        }

        let mut findings = Vec::new();
        let mut by_category: HashMap<String, u64> = HashMap::new();
        let mut category_scores: HashMap<String, u8> = HashMap::new();
        let mut dpia_required = false;

        for (i, category) in CATEGORIES.iter().enumerate() {
            let answers = target.answers[*category];
            if answers.iter().any(|a| *a > 2) {
                return Err(ScanFailure {
                    message: format!("category '{category}' has an answer outside {{0,1,2}}"),
                    retry_safe: false,
                    partial_findings: vec![],
                });
            }

            let score: u8 = answers.iter().sum();
            let risk = classify(score);
            if risk == RiskLevel::High && FORCING_CATEGORIES.contains(category) {
                dpia_required = true;
            }

            category_scores.insert(category.to_string(), score);
            by_category.insert(category.to_string(), score as u64);

            findings.push(Finding {
                finding_id: uuid::Uuid::new_v4(),
                job_id: job.job_id,
                finding_type: "dpia_category_assessment".to_string(),
                category: category.to_string(),
                severity: severity_for(risk),
                location: format!("category={category}"),
                evidence_excerpt: format!("score {score}/10 ({risk:?})"),
                confidence: 1.0,
                rule_id: format!("dpia.{category}"),
                region_tags: vec![request.target_region.clone()],
                pii_kind: None,
            });

            if let Some(recommendation) = recommendation_for(category, risk) {
                findings.push(Finding {
                    finding_id: uuid::Uuid::new_v4(),
                    job_id: job.job_id,
                    finding_type: "dpia_recommendation".to_string(),
                    category: category.to_string(),
                    severity: severity_for(risk),
                    location: format!("category={category}"),
                    evidence_excerpt: recommendation.to_string(),
                    confidence: 1.0,
                    rule_id: format!("dpia.{category}.recommendation"),
                    region_tags: vec![request.target_region.clone()],
                    pii_kind: None,
                });
            }

            progress.report((i as f32 + 1.0) / CATEGORIES.len() as f32 * 100.0);
        }

        let overall_percentage =
            category_scores.values().map(|s| *s as f64).sum::<f64>() / (CATEGORIES.len() as f64 * 10.0) * 100.0;

        if dpia_required {
            by_category.insert("dpia_required".to_string(), 1);
        }

        let mut result = empty_result(job, scan_core::ScanType::Dpia);
        result.units_scanned = CATEGORIES.len() as u64;
        result.findings_total = findings.len() as u64;
        result.by_category = by_category;
        result.compliance_score = overall_percentage;
        Ok(ScanOutcome { findings, result })
    }
}

fn severity_for(risk: RiskLevel) -> Severity {
    match risk {
        RiskLevel::High => Severity::High,
        RiskLevel::Medium => Severity::Medium,
        RiskLevel::Low => Severity::Info,
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

    fn request(answers: HashMap<String, [u8; 5]>) -> ScanRequest {
        ScanRequest {
            request_id: scan_core::JobId::new(),
            tenant_id: TenantId(uuid::Uuid::new_v4()),
            principal: Principal {
                tenant_id: TenantId(uuid::Uuid::new_v4()),
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec![],
            },
            scan_type: ScanType::Dpia,
            target_region: RegionTag::from("NL"),
            target: serde_json::to_value(DpiaScanTarget { answers }).unwrap(),
            options: serde_json::json!({}),
            submitted_at: chrono::Utc::now(),
            deadline: None,
        }
    }

    fn all_zero_answers() -> HashMap<String, [u8; 5]> {
        CATEGORIES.iter().map(|c| (c.to_string(), [0, 0, 0, 0, 0])).collect()
    }

    #[tokio::test]
    async fn high_score_in_forcing_category_requires_dpia() {
        let mut answers = all_zero_answers();
        answers.insert("data_category".to_string(), [2, 2, 2, 1, 0]);
        let scanner = DpiaScanner::new();
        let request = request(answers);
        let job = ScanJob::new(&request);
        let outcome = scanner
            .run(&job, &request, CancellationToken::default(), Arc::new(NoopProgress))
            .await
            .unwrap();
        assert_eq!(outcome.result.by_category.get("dpia_required"), Some(&1));
        assert!(outcome.findings.iter().any(|f| f.finding_type == "dpia_recommendation"));
    }

    #[tokio::test]
    async fn high_score_in_non_forcing_category_does_not_require_dpia() {
        let mut answers = all_zero_answers();
        answers.insert("security_measures".to_string(), [2, 2, 2, 1, 0]);
        let scanner = DpiaScanner::new();
        let request = request(answers);
        let job = ScanJob::new(&request);
        let outcome = scanner
            .run(&job, &request, CancellationToken::default(), Arc::new(NoopProgress))
            .await
            .unwrap();
        assert!(outcome.result.by_category.get("dpia_required").is_none());
    }

    #[tokio::test]
    async fn missing_category_is_rejected() {
        let mut answers = all_zero_answers();
        answers.remove("security_measures");
        let scanner = DpiaScanner::new();
        let request = request(answers);
        let job = ScanJob::new(&request);
        let result = scanner.run(&job, &request, CancellationToken::default(), Arc::new(NoopProgress)).await;
        assert!(result.is_err());
    }

    /// Spec's T10: the same 25 answers must classify and score identically
    /// on every run; nothing in the scanner may depend on map iteration
    /// order, wall-clock time, or randomness.
    #[tokio::test]
    async fn same_answers_yield_the_same_classification_and_percentage_every_run() {
        let mut answers = all_zero_answers();
        answers.insert("data_category".to_string(), [2, 1, 2, 0, 1]);
        answers.insert("processing_activity".to_string(), [1, 1, 1, 1, 0]);
        answers.insert("rights_impact".to_string(), [0, 0, 1, 1, 1]);
        answers.insert("transfer_sharing".to_string(), [2, 2, 0, 0, 0]);
        answers.insert("security_measures".to_string(), [1, 0, 0, 0, 0]);

        let scanner = DpiaScanner::new();
        let mut scores = Vec::new();
        let mut required_flags = Vec::new();
        let mut category_tags = Vec::new();

        for _ in 0..5 {
            let request = request(answers.clone());
            let job = ScanJob::new(&request);
            let outcome = scanner
                .run(&job, &request, CancellationToken::default(), Arc::new(NoopProgress))
                .await
                .unwrap();

            scores.push(outcome.result.compliance_score);
            required_flags.push(outcome.result.by_category.get("dpia_required").copied());

            let mut per_category: Vec<(String, u64)> = outcome
                .result
                .by_category
                .iter()
                .filter(|(k, _)| *k != "dpia_required")
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            per_category.sort_by(|a, b| a.0.cmp(&b.0));
            category_tags.push(per_category);
        }

        assert!(scores.windows(2).all(|w| w[0] == w[1]));
        assert!(required_flags.windows(2).all(|w| w[0] == w[1]));
        assert!(category_tags.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn all_zero_answers_yield_zero_percent_and_no_dpia_requirement() {
        let scanner = DpiaScanner::new();
        let request = request(all_zero_answers());
        let job = ScanJob::new(&request);
        let outcome = scanner
            .run(&job, &request, CancellationToken::default(), Arc::new(NoopProgress))
            .await
            .unwrap();
        assert_eq!(outcome.result.compliance_score, 0.0);
        assert!(outcome.result.by_category.get("dpia_required").is_none());
    }
}
