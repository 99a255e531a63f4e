//! Results Aggregator (C6, §4.6): turns a scanner's raw findings
//! into the canonical `ScanResult` every scan type reports through the
//! same contract, grounded on the roll-up style of the teacher's
//! `customer/analytics_engine.rs`.

use crate::registry::PatternRegistry;
use scan_core::model::{Finding, ScanJob, ScanJobState, ScanResult};
use scan_core::Severity;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// SHA-256 of the normalized excerpt, truncated to 16 bytes, hex encoded
/// (an ambient addition to §4.2: "evidence hash for dedup").
pub fn evidence_hash(excerpt: &str) -> String {
    let digest = Sha256::digest(excerpt.as_bytes());
    hex_encode(&digest[..16])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Deduplicates by `(rule_id, location, evidence_hash)`, re-assigns
/// severity from the registry when that `pii_kind`/`rule_id` has a known
/// base severity (registry wins over the scanner's advisory severity),
/// and returns the deduplicated, severity-corrected finding list
/// (§4.6 items 1-2).
pub fn dedupe_and_reassign_severity(registry: &PatternRegistry, findings: Vec<Finding>) -> Vec<Finding> {
    let snapshot = registry.snapshot();
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut deduped = Vec::with_capacity(findings.len());

    for mut finding in findings {
        let hash = evidence_hash(&finding.evidence_excerpt);
        let key = (finding.rule_id.clone(), finding.location.clone(), hash);
        if !seen.insert(key) {
            continue;
        }

        if let Some(pattern) = snapshot.patterns.iter().find(|p| p.rule_id == finding.rule_id) {
            finding.severity = pattern.default_severity;
        }

        deduped.push(finding);
    }

    deduped
}

/// Per-scan-type unit counters already computed by the scanner; the
/// aggregator only canonicalizes them into `ScanResult`'s unified
/// contract (§4.6 item 4), it never re-derives them from findings.
#[derive(Debug, Clone, Default)]
pub struct ScanUnitCounts {
    pub files_or_pages_or_units: u64,
    pub lines_analyzed: u64,
}

/// Builds the canonical `ScanResult` from a terminal job, its deduplicated
/// findings, and the scan-type-specific unit counts the scanner reported.
pub fn aggregate(
    registry: &PatternRegistry,
    job: &ScanJob,
    findings: Vec<Finding>,
    counts: ScanUnitCounts,
    duration_ms: u64,
    completed_at: chrono::DateTime<chrono::Utc>,
) -> ScanResult {
    let findings = dedupe_and_reassign_severity(registry, findings);

    let mut by_severity: HashMap<Severity, u64> = HashMap::new();
    let mut by_category: HashMap<String, u64> = HashMap::new();
    let mut pii_totals: HashMap<String, u64> = HashMap::new();

    for finding in &findings {
        *by_severity.entry(finding.severity).or_insert(0) += 1;
        *by_category.entry(finding.category.clone()).or_insert(0) += 1;
        if let Some(pii_kind) = &finding.pii_kind {
            *pii_totals.entry(pii_kind.clone()).or_insert(0) += 1;
        }
    }

    let critical_findings = by_severity.get(&Severity::Critical).copied().unwrap_or(0);
    by_category.insert("critical_findings".to_string(), critical_findings);

    ScanResult {
        job_id: job.job_id,
        scan_type: job.scan_type,
        files_scanned: counts.files_or_pages_or_units.max(1),
        units_scanned: counts.lines_analyzed,
        findings_total: findings.len() as u64,
        by_severity,
        by_category,
        pii_totals,
        compliance_score: 100.0,
        duration_ms,
        tenant_id: job.tenant_id,
        completed_at,
        partial: job.state != ScanJobState::Succeeded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::model::ScanRequest;
    use scan_core::{JobId, Principal, RegionTag, ScanType, TenantId, UserId};

    fn sample_finding(rule_id: &str, location: &str, excerpt: &str) -> Finding {
        Finding {
            finding_id: uuid::Uuid::new_v4(),
            job_id: JobId::new(),
            finding_type: "pii_detected".to_string(),
            category: "email".to_string(),
            severity: Severity::Info,
            location: location.to_string(),
            evidence_excerpt: excerpt.to_string(),
            confidence: 0.9,
            rule_id: rule_id.to_string(),
            region_tags: vec![RegionTag::from("NL")],
            pii_kind: Some("email".to_string()),
        }
    }

    fn sample_job() -> ScanJob {
        let request = ScanRequest {
            request_id: JobId::new(),
            tenant_id: TenantId(uuid::Uuid::new_v4()),
            principal: Principal {
                tenant_id: TenantId(uuid::Uuid::new_v4()),
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec![],
            },
            scan_type: ScanType::Code,
            target_region: RegionTag::from("NL"),
            target: serde_json::json!({}),
            options: serde_json::json!({}),
            submitted_at: chrono::Utc::now(),
            deadline: None,
        };
        let mut job = ScanJob::new(&request);
        job.state = ScanJobState::Succeeded;
        job
    }

    #[test]
    fn exact_duplicate_findings_are_deduplicated() {
        let registry = PatternRegistry::with_defaults();
        let findings = vec![
            sample_finding("email.v1", "file.rs", "a@b.com"),
            sample_finding("email.v1", "file.rs", "a@b.com"),
        ];
        let deduped = dedupe_and_reassign_severity(&registry, findings);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn registry_severity_overrides_scanner_declared_severity() {
        let registry = PatternRegistry::with_defaults();
        let findings = vec![sample_finding("email.v1", "file.rs", "a@b.com")];
        let deduped = dedupe_and_reassign_severity(&registry, findings);
        assert_eq!(deduped[0].severity, Severity::Info);
    }

    #[test]
    fn aggregate_computes_pii_totals_and_critical_count() {
        let registry = PatternRegistry::with_defaults();
        let job = sample_job();
        let mut critical_finding = sample_finding("iban.v1", "file.rs", "NL91ABNA0417164300");
        critical_finding.severity = Severity::Critical;
        critical_finding.pii_kind = Some("iban".to_string());
        let findings = vec![sample_finding("email.v1", "file.rs", "a@b.com"), critical_finding];

        let result = aggregate(
            &registry,
            &job,
            findings,
            ScanUnitCounts { files_or_pages_or_units: 3, lines_analyzed: 50 },
            1200,
            chrono::Utc::now(),
        );

        assert_eq!(result.files_scanned, 3);
        assert_eq!(result.findings_total, 2);
        assert_eq!(result.by_category.get("critical_findings"), Some(&1));
        assert!(!result.partial);
    }

    #[test]
    fn non_succeeded_job_is_flagged_partial() {
        let registry = PatternRegistry::with_defaults();
        let mut job = sample_job();
        job.state = ScanJobState::Failed;
        let result = aggregate(&registry, &job, vec![], ScanUnitCounts::default(), 10, chrono::Utc::now());
        assert!(result.partial);
    }
}
