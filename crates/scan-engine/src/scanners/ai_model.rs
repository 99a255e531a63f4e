//! AI model scanner (§4.3): inspects model artifact metadata plus
//! accompanying documentation text, classifies the system into an EU AI
//! Act risk category, and emits findings for missing documentation items
//! and bias-assessment placeholders. Never runs the model itself.

use super::{empty_result, Scanner};
use crate::detect::model_artifact::inspect;
use crate::detect::text::scan_text;
use crate::registry::PatternRegistry;
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

/// EU AI Act risk categories (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiActRiskCategory {
    Prohibited,
    High,
    Limited,
    Gpai,
    Minimal,
}

/// Textual markers the classifier looks for in the system's documentation
/// (case-insensitive substring match), in priority order: the first
/// matching category wins.
const PROHIBITED_MARKERS: &[&str] = &["social scoring", "subliminal manipulation", "real-time biometric"];
const HIGH_RISK_MARKERS: &[&str] =
    &["biometric identification", "critical infrastructure", "employment decision", "law enforcement", "credit scoring"];
const GPAI_MARKERS: &[&str] = &["general purpose", "foundation model", "general-purpose ai"];
const LIMITED_RISK_MARKERS: &[&str] = &["chatbot", "emotion recognition", "deepfake", "generates synthetic"];

const REQUIRED_DOC_SECTIONS: &[&str] = &["intended purpose", "risk management", "data governance", "human oversight"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiModelScanTarget {
    pub artifact_metadata: serde_json::Value,
    pub documentation_text: String,
    #[serde(default)]
    pub declared_bias_evaluation: bool,
}

fn classify_risk(documentation_text: &str) -> AiActRiskCategory {
    let lower = documentation_text.to_lowercase();
    if PROHIBITED_MARKERS.iter().any(|m| lower.contains(m)) {
        AiActRiskCategory::Prohibited
    } else if HIGH_RISK_MARKERS.iter().any(|m| lower.contains(m)) {
        AiActRiskCategory::High
    } else if GPAI_MARKERS.iter().any(|m| lower.contains(m)) {
        AiActRiskCategory::Gpai
    } else if LIMITED_RISK_MARKERS.iter().any(|m| lower.contains(m)) {
        AiActRiskCategory::Limited
    } else {
        AiActRiskCategory::Minimal
    }
}

pub struct AiModelScanner {
    registry: Arc<PatternRegistry>,
}

impl AiModelScanner {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Scanner for AiModelScanner {
    fn scan_type(&self) -> scan_core::ScanType {
        scan_core::ScanType::AiModel
    }

    fn default_deadline(&self) -> StdDuration {
        StdDuration::from_secs(10 * 60)
    }

    async fn run(
        &self,
        job: &ScanJob,
        request: &ScanRequest,
        _cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<ScanOutcome, ScanFailure> {
        let target: AiModelScanTarget =
            serde_json::from_value(request.target.clone()).map_err(|err| ScanFailure {
                message: format!("malformed ai model scan target: {err}"),
                retry_safe: false,
                partial_findings: vec![],
            })?;

        let region_set = vec![request.target_region.clone()];
        let summary = inspect(&target.artifact_metadata);
        let risk_category = classify_risk(&target.documentation_text);
        progress.report(30.0);

        let document_markers: Vec<String> = REQUIRED_DOC_SECTIONS
            .iter()
            .filter(|section| target.documentation_text.to_lowercase().contains(*section))
            .map(|section| section.to_string())
            .collect();

        let mut findings: Vec<Finding> = Vec::new();
        for section in REQUIRED_DOC_SECTIONS {
            if !document_markers.iter().any(|m| m == section) {
                findings.push(documentation_gap_finding(job.job_id, section, &region_set));
            }
        }

        if !target.declared_bias_evaluation {
            findings.push(Finding {
                finding_id: uuid::Uuid::new_v4(),
                job_id: job.job_id,
                finding_type: "bias_evaluation_missing".to_string(),
                category: "ai_governance".to_string(),
                severity: Severity::Medium,
                location: "documentation".to_string(),
                evidence_excerpt: String::new(),
                confidence: 1.0,
                rule_id: "ai_model.bias_evaluation_declared".to_string(),
                region_tags: region_set.clone(),
                pii_kind: None,
            });
        }

        findings.extend(scan_text(
            &self.registry,
            job.job_id,
            "documentation",
            &target.documentation_text,
            &region_set,
        ));
        progress.report(90.0);

        let mut by_category = HashMap::new();
        by_category.insert(format!("risk_category:{risk_category:?}"), 1u64);
        if summary.has_embedding_layer {
            by_category.insert("has_embedding_layer".to_string(), 1);
        }

        let mut result = empty_result(job, scan_core::ScanType::AiModel);
        result.units_scanned = 1;
        result.findings_total = findings.len() as u64;
        result.by_category = by_category;
        Ok(ScanOutcome { findings, result })
    }
}

fn documentation_gap_finding(job_id: scan_core::JobId, section: &str, region_tags: &[scan_core::RegionTag]) -> Finding {
    Finding {
        finding_id: uuid::Uuid::new_v4(),
        job_id,
        finding_type: "documentation_gap".to_string(),
        category: "ai_governance".to_string(),
        severity: Severity::Medium,
        location: "documentation".to_string(),
        evidence_excerpt: format!("missing section: {section}"),
        confidence: 1.0,
        rule_id: format!("ai_model.missing_{}", section.replace(' ', "_")),
        region_tags: region_tags.to_vec(),
        pii_kind: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_high_risk_documentation() {
        assert_eq!(classify_risk("Used for employment decision automation"), AiActRiskCategory::High);
    }

    #[test]
    fn classifies_minimal_risk_when_no_markers_present() {
        assert_eq!(classify_risk("a simple recommendation widget"), AiActRiskCategory::Minimal);
    }

    #[test]
    fn prohibited_marker_takes_priority_over_high_risk() {
        assert_eq!(
            classify_risk("social scoring system used in employment decision contexts"),
            AiActRiskCategory::Prohibited
        );
    }
}
