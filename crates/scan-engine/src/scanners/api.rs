//! API scanner (§4.3): issues read-only probes against a list of
//! endpoints, inspects responses with the text scanner, and checks for the
//! presence of auth and rate-limit headers.

use super::{empty_result, Scanner};
use crate::detect::text::scan_text;
use crate::registry::PatternRegistry;
use async_trait::async_trait;
use scan_core::model::{Finding, ScanJob, ScanRequest};
use scan_core::{RegionTag, Severity};
use scan_orchestrator::cancellation::CancellationToken;
use scan_orchestrator::executor::{ScanFailure, ScanOutcome};
use scan_orchestrator::lifecycle::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration as StdDuration;

const RATE_LIMIT_HEADER_CANDIDATES: &[&str] =
    &["x-ratelimit-limit", "x-rate-limit-limit", "ratelimit-limit"];
const AUTH_HEADER_CANDIDATES: &[&str] = &["authorization", "www-authenticate", "x-api-key"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiScanTarget {
    pub endpoints: Vec<ApiEndpoint>,
}

pub struct ApiScanner {
    registry: Arc<PatternRegistry>,
    client: reqwest::Client,
}

impl ApiScanner {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self {
            registry,
            client: reqwest::Client::builder()
                .timeout(StdDuration::from_secs(15))
                .build()
                .expect("reqwest client builds with static config"),
        }
    }
}

#[async_trait]
impl Scanner for ApiScanner {
    fn scan_type(&self) -> scan_core::ScanType {
        scan_core::ScanType::Api
    }

    fn is_retry_safe(&self) -> bool {
        true
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
        let target: ApiScanTarget = serde_json::from_value(request.target.clone()).map_err(|err| ScanFailure {
            message: format!("malformed api scan target: {err}"),
            retry_safe: false,
            partial_findings: vec![],
        })?;

        let region_set = vec![request.target_region.clone()];
        let mut findings: Vec<Finding> = Vec::new();
        let total = target.endpoints.len().max(1);
        let mut endpoints_probed = 0u64;

        for (i, endpoint) in target.endpoints.iter().enumerate() {
            if cancellation.is_cancelled() {
                let mut result = empty_result(job, scan_core::ScanType::Api);
                result.units_scanned = endpoints_probed;
                result.findings_total = findings.len() as u64;
                result.partial = true;
                return Ok(ScanOutcome { findings, result });
            }

            let method = reqwest::Method::from_bytes(endpoint.method.as_bytes()).unwrap_or(reqwest::Method::GET);
            let response = match self.client.request(method, &endpoint.url).send().await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(url = %endpoint.url, error = %err, "api probe failed");
                    endpoints_probed += 1;
                    continue;
                }
            };

            let headers: Vec<String> = response.headers().keys().map(|k| k.as_str().to_lowercase()).collect();
            let has_auth_header = headers.iter().any(|h| AUTH_HEADER_CANDIDATES.contains(&h.as_str()));
            let has_rate_limit_header = headers.iter().any(|h| RATE_LIMIT_HEADER_CANDIDATES.contains(&h.as_str()));

            if !has_auth_header {
                findings.push(missing_header_finding(job.job_id, &endpoint.url, "missing_auth_header", &region_set));
            }
            if !has_rate_limit_header {
                findings.push(missing_header_finding(
                    job.job_id,
                    &endpoint.url,
                    "missing_rate_limit_header",
                    &region_set,
                ));
            }

            if let Ok(body) = response.text().await {
                findings.extend(scan_text(&self.registry, job.job_id, &endpoint.url, &body, &region_set));
            }

            endpoints_probed += 1;
            progress.report((i as f32 + 1.0) / total as f32 * 100.0);
        }

        let mut result = empty_result(job, scan_core::ScanType::Api);
        result.units_scanned = endpoints_probed;
        result.findings_total = findings.len() as u64;
        Ok(ScanOutcome { findings, result })
    }
}

fn missing_header_finding(job_id: scan_core::JobId, url: &str, rule_id: &str, region_tags: &[RegionTag]) -> Finding {
    Finding {
        finding_id: uuid::Uuid::new_v4(),
        job_id,
        finding_type: "api_hygiene".to_string(),
        category: "api_hygiene".to_string(),
        severity: Severity::Low,
        location: url.to_string(),
        evidence_excerpt: String::new(),
        confidence: 1.0,
        rule_id: rule_id.to_string(),
        region_tags: region_tags.to_vec(),
        pii_kind: None,
    }
}
