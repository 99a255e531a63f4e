//! Compliance Score Engine (C7): turns one scan's
//! deduplicated findings into per-principle and overall compliance scores,
//! appends the tenant's trajectory, and exposes a forecast-input view over
//! persisted history. Grounded on the roll-up-then-store shape of the
//! teacher's `inventory/analytics.rs`, adapted to a principle-weighted score
//! instead of a stock-health index.

use crate::registry::weights::PRINCIPLES;
use crate::registry::PatternRegistry;
use chrono::{DateTime, Duration, Utc};
use scan_core::database::{PersistenceGateway, TimeRange};
use scan_core::error::Result;
use scan_core::model::{ComplianceHistoryPoint, Finding, ScanJob};
use scan_core::TenantId;
use std::collections::HashMap;
use std::sync::Arc;

/// Cap on the magnitude of a single principle's per-scan deduction
/// (capped at 100 deductions per principle per scan).
const MAX_PENALTY_PER_PRINCIPLE: f64 = 100.0;

/// Principle bucket a rule-violation finding (no `pii_kind`) falls into: a
/// region rule violation — missing reject-all, pre-ticked consent, tracker
/// loaded before consent — is definitionally a lawful-basis problem.
const RULE_VIOLATION_PRINCIPLE: &str = "lawfulness";

/// Last N days of history the forecast-input view considers.
pub const FORECAST_WINDOW_DAYS: i64 = 90;

/// C7's public surface: scoring a finalized result, appending it to the
/// tenant's trajectory, and reading that trajectory back.
pub struct ComplianceScoreEngine {
    registry: Arc<PatternRegistry>,
    gateway: Arc<dyn PersistenceGateway>,
}

impl ComplianceScoreEngine {
    pub fn new(registry: Arc<PatternRegistry>, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { registry, gateway }
    }

    /// Per-principle scores for one scan's deduplicated findings: each
    /// finding's severity contributes a base penalty to its principle
    /// bucket, scaled by the originating region rule's `penalty_multiplier`
    /// when `finding.rule_id` names one.
    pub fn principle_scores(&self, findings: &[Finding]) -> HashMap<String, f64> {
        let snapshot = self.registry.snapshot();
        let weights = &snapshot.severity_weights;

        let mut penalties: HashMap<String, f64> =
            PRINCIPLES.iter().map(|p| (p.to_string(), 0.0)).collect();

        for finding in findings {
            let principle = match &finding.pii_kind {
                Some(kind) => weights.principle_for(kind).to_string(),
                None => RULE_VIOLATION_PRINCIPLE.to_string(),
            };
            let multiplier = self
                .registry
                .rule_penalty_multiplier(&finding.rule_id)
                .unwrap_or(1.0);
            let penalty = weights.penalty_for(finding.severity) * multiplier;
            *penalties.entry(principle).or_insert(0.0) += penalty;
        }

        penalties
            .into_iter()
            .map(|(principle, total_penalty)| {
                let capped = total_penalty.max(-MAX_PENALTY_PER_PRINCIPLE);
                (principle, (100.0 + capped).clamp(0.0, 100.0))
            })
            .collect()
    }

    /// Weighted mean across principles; weights come from the registry's
    /// severity/weight table and default to uniform. Clamped to `[0, 100]`.
    pub fn overall_score(&self, principle_scores: &HashMap<String, f64>) -> f64 {
        let snapshot = self.registry.snapshot();
        let weights = &snapshot.severity_weights;

        let (weighted_sum, weight_total) = principle_scores.iter().fold(
            (0.0, 0.0),
            |(sum, total), (principle, score)| {
                let weight = weights.weight_for(principle);
                (sum + score * weight, total + weight)
            },
        );

        if weight_total <= 0.0 {
            return 100.0;
        }
        (weighted_sum / weight_total).clamp(0.0, 100.0)
    }

    /// Builds the trajectory point for one terminal scan, pure and
    /// unpersisted: only from a Succeeded or partially-successful job, never
    /// from a Failed job with no findings (enforced by the caller choosing
    /// not to call this for that case).
    pub fn build_history_point(
        &self,
        job: &ScanJob,
        findings: &[Finding],
        at: DateTime<Utc>,
    ) -> ComplianceHistoryPoint {
        let component_scores = self.principle_scores(findings);
        let overall_score = self.overall_score(&component_scores);

        ComplianceHistoryPoint {
            tenant_id: job.tenant_id,
            at,
            overall_score,
            component_scores,
            source_job_id: job.job_id,
        }
    }

    /// Builds the trajectory point for one terminal scan and appends it.
    /// Most production jobs append their history point as part of the
    /// atomic completion write instead (see
    /// `PersistenceGateway::finalize_scan`); this remains for callers that
    /// want the point scored and persisted in a single step.
    pub async fn record_result(
        &self,
        job: &ScanJob,
        findings: &[Finding],
        at: DateTime<Utc>,
    ) -> Result<ComplianceHistoryPoint> {
        let point = self.build_history_point(job, findings, at);
        self.gateway.append_history(&point).await?;
        Ok(point)
    }

    /// `get_history(tenant, range)`: delegates to the persistence gateway,
    /// which clones its tenant's history under a short read lock and hands
    /// back an owned snapshot — safe to call concurrently with an in-flight
    /// `record_result` for the same tenant.
    pub async fn get_history(
        &self,
        tenant_id: TenantId,
        range: TimeRange,
    ) -> Result<Vec<ComplianceHistoryPoint>> {
        self.gateway.query_history(tenant_id, range).await
    }

    /// The forecast-input view: last [`FORECAST_WINDOW_DAYS`] days of
    /// history, downsampled to one mean-per-day point, plus summary
    /// statistics over that downsampled sequence. Never predicts a future
    /// point itself; the predictor is an out-of-scope collaborator.
    pub async fn forecast_input(&self, tenant_id: TenantId, now: DateTime<Utc>) -> Result<ForecastInput> {
        let range = TimeRange {
            from: now - Duration::days(FORECAST_WINDOW_DAYS),
            to: now,
        };
        let history = self.get_history(tenant_id, range).await?;
        Ok(downsample_by_day(&history))
    }
}

#[async_trait::async_trait]
impl scan_orchestrator::executor::ComplianceScorer for ComplianceScoreEngine {
    async fn score(
        &self,
        job: &ScanJob,
        findings: &[Finding],
        at: DateTime<Utc>,
    ) -> scan_core::error::Result<ComplianceHistoryPoint> {
        Ok(self.build_history_point(job, findings, at))
    }
}

/// One mean-per-day point (`day_index` relative to the earliest point in the
/// window) plus the summary statistics C7 exposes to the predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastInput {
    pub daily_points: Vec<(i64, f64)>,
    pub mean: f64,
    pub slope: f64,
    pub variance: f64,
}

fn downsample_by_day(history: &[ComplianceHistoryPoint]) -> ForecastInput {
    if history.is_empty() {
        return ForecastInput {
            daily_points: vec![],
            mean: 0.0,
            slope: 0.0,
            variance: 0.0,
        };
    }

    let window_start = history.iter().map(|p| p.at).min().expect("non-empty history");
    let mut by_day: HashMap<i64, Vec<f64>> = HashMap::new();
    for point in history {
        let day = (point.at - window_start).num_days();
        by_day.entry(day).or_default().push(point.overall_score);
    }

    let mut daily_points: Vec<(i64, f64)> = by_day
        .into_iter()
        .map(|(day, scores)| (day, scores.iter().sum::<f64>() / scores.len() as f64))
        .collect();
    daily_points.sort_by_key(|(day, _)| *day);

    let n = daily_points.len() as f64;
    let mean = daily_points.iter().map(|(_, score)| *score).sum::<f64>() / n;

    // Ordinary least squares slope over (day_index, mean_score) pairs.
    let mean_day = daily_points.iter().map(|(day, _)| *day as f64).sum::<f64>() / n;
    let (numerator, denominator) = daily_points.iter().fold((0.0, 0.0), |(num, den), (day, score)| {
        let dx = *day as f64 - mean_day;
        (num + dx * (score - mean), den + dx * dx)
    });
    let slope = if denominator.abs() > f64::EPSILON {
        numerator / denominator
    } else {
        0.0
    };

    let variance = daily_points.iter().map(|(_, score)| (score - mean).powi(2)).sum::<f64>() / n;

    ForecastInput {
        daily_points,
        mean,
        slope,
        variance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::model::ScanRequest;
    use scan_core::{JobId, Principal, RegionTag, ScanType, Severity, TenantId, UserId};

    fn sample_job(tenant_id: TenantId) -> ScanJob {
        let request = ScanRequest {
            request_id: JobId::new(),
            tenant_id,
            principal: Principal {
                tenant_id,
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec![],
            },
            scan_type: ScanType::Code,
            target_region: RegionTag::from("NL"),
            target: serde_json::json!({}),
            options: serde_json::json!({}),
            submitted_at: Utc::now(),
            deadline: None,
        };
        ScanJob::new(&request)
    }

    fn pii_finding(job_id: JobId, pii_kind: &str, severity: Severity) -> Finding {
        Finding {
            finding_id: uuid::Uuid::new_v4(),
            job_id,
            finding_type: "pii_detected".to_string(),
            category: pii_kind.to_string(),
            severity,
            location: "file.rs".to_string(),
            evidence_excerpt: "x".to_string(),
            confidence: 0.9,
            rule_id: format!("pii.{pii_kind}"),
            region_tags: vec![RegionTag::from("NL")],
            pii_kind: Some(pii_kind.to_string()),
        }
    }

    fn rule_violation_finding(job_id: JobId, rule_id: &str, severity: Severity) -> Finding {
        Finding {
            finding_id: uuid::Uuid::new_v4(),
            job_id,
            finding_type: "rule_violation".to_string(),
            category: "consent".to_string(),
            severity,
            location: "https://example.com".to_string(),
            evidence_excerpt: "".to_string(),
            confidence: 1.0,
            rule_id: rule_id.to_string(),
            region_tags: vec![RegionTag::from("NL")],
            pii_kind: None,
        }
    }

    fn engine() -> ComplianceScoreEngine {
        let registry = Arc::new(PatternRegistry::with_defaults());
        let gateway = Arc::new(scan_core::InMemoryGateway::new());
        ComplianceScoreEngine::new(registry, gateway)
    }

    #[tokio::test]
    async fn clean_scan_scores_every_principle_at_100() {
        let engine = engine();
        let scores = engine.principle_scores(&[]);
        assert_eq!(scores.len(), PRINCIPLES.len());
        assert!(scores.values().all(|&s| s == 100.0));
        assert_eq!(engine.overall_score(&scores), 100.0);
    }

    #[tokio::test]
    async fn critical_pii_finding_deducts_from_its_principle_bucket() {
        let engine = engine();
        let job_id = JobId::new();
        let findings = vec![pii_finding(job_id, "dutch_bsn", Severity::Critical)];
        let scores = engine.principle_scores(&findings);
        assert_eq!(scores["data_minimisation"], 75.0);
        assert_eq!(scores["lawfulness"], 100.0);
    }

    #[tokio::test]
    async fn region_rule_violation_multiplier_is_applied() {
        let engine = engine();
        let job_id = JobId::new();
        // "nl.reject_all_required" is High severity (-10) at NL multiplier 1.2.
        let findings = vec![rule_violation_finding(job_id, "nl.reject_all_required", Severity::High)];
        let scores = engine.principle_scores(&findings);
        assert_eq!(scores[RULE_VIOLATION_PRINCIPLE], 88.0);
    }

    #[tokio::test]
    async fn principle_penalty_is_capped_at_100_per_scan() {
        let engine = engine();
        let job_id = JobId::new();
        let findings: Vec<Finding> = (0..10)
            .map(|_| pii_finding(job_id, "dutch_bsn", Severity::Critical))
            .collect();
        let scores = engine.principle_scores(&findings);
        assert_eq!(scores["data_minimisation"], 0.0);
    }

    #[tokio::test]
    async fn record_and_fetch_history_round_trips() {
        let engine = engine();
        let tenant_id = TenantId(uuid::Uuid::new_v4());
        let job = sample_job(tenant_id);
        let point = engine.record_result(&job, &[], Utc::now()).await.unwrap();
        assert_eq!(point.overall_score, 100.0);

        let range = TimeRange {
            from: Utc::now() - Duration::days(1),
            to: Utc::now() + Duration::days(1),
        };
        let history = engine.get_history(tenant_id, range).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].source_job_id, job.job_id);
    }

    #[tokio::test]
    async fn forecast_input_downsamples_same_day_points_and_fits_a_trend() {
        let engine = engine();
        let tenant_id = TenantId(uuid::Uuid::new_v4());
        let now = Utc::now();

        for (days_ago, score) in [(2, 90.0), (2, 70.0), (1, 85.0), (0, 80.0)] {
            let point = ComplianceHistoryPoint {
                tenant_id,
                at: now - Duration::days(days_ago),
                overall_score: score,
                component_scores: HashMap::new(),
                source_job_id: JobId::new(),
            };
            engine.gateway.append_history(&point).await.unwrap();
        }

        let forecast = engine.forecast_input(tenant_id, now).await.unwrap();
        assert_eq!(forecast.daily_points.len(), 3);
        let day0 = forecast.daily_points.iter().find(|(d, _)| *d == 0).unwrap();
        assert_eq!(day0.1, 80.0);
        let day2 = forecast.daily_points.iter().find(|(d, _)| *d == 2).unwrap();
        assert_eq!(day2.1, 80.0); // mean of 90.0 and 70.0
    }

    #[tokio::test]
    async fn empty_history_yields_zeroed_forecast_input() {
        let engine = engine();
        let forecast = engine.forecast_input(TenantId(uuid::Uuid::new_v4()), Utc::now()).await.unwrap();
        assert!(forecast.daily_points.is_empty());
        assert_eq!(forecast.mean, 0.0);
    }
}
