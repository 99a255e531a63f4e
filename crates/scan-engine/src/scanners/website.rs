//! Website scanner (§4.3): fetches the target URL plus a bounded
//! set of linked pages, hands each capture to the HTML/DOM analyzer, and
//! evaluates the region rule pack over the aggregated observations.

use super::{empty_result, Scanner};
use crate::detect::html::{analyze, CookieClass, PageCapture};
use crate::registry::PatternRegistry;
use async_trait::async_trait;
use scan_core::model::{Finding, ScanJob, ScanRequest};
use scan_orchestrator::cancellation::CancellationToken;
use scan_orchestrator::executor::{ScanFailure, ScanOutcome};
use scan_orchestrator::lifecycle::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Default bound on linked pages fetched beyond the target URL itself
/// (§4.3: "≤ 5 by default, configurable").
pub const DEFAULT_MAX_LINKED_PAGES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteScanTarget {
    pub target_url: String,
    #[serde(default)]
    pub max_linked_pages: Option<usize>,
}

pub struct WebsiteScanner {
    registry: Arc<PatternRegistry>,
    client: reqwest::Client,
}

impl WebsiteScanner {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self {
            registry,
            client: reqwest::Client::builder()
                .timeout(StdDuration::from_secs(15))
                .build()
                .expect("reqwest client builds with static config"),
        }
    }

    async fn capture(&self, url: &str) -> Option<PageCapture> {
        let response = self.client.get(url).send().await.ok()?;
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        let html = response.text().await.ok()?;
        let loaded_resources = extract_resource_urls(&html);
        Some(PageCapture {
            url: url.to_string(),
            html,
            response_headers,
            loaded_resources,
            set_cookies,
        })
    }
}

fn extract_resource_urls(html: &str) -> Vec<String> {
    RESOURCE_SRC
        .find_iter(html)
        .filter_map(|m| m.as_str().splitn(2, |c| c == '"' || c == '\'').nth(1))
        .map(str::to_string)
        .collect()
}

static RESOURCE_SRC: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r#"(?i)src=["'][^"']+["']"#).unwrap());

fn extract_linked_pages(base_url: &str, html: &str, limit: usize) -> Vec<String> {
    HREF_LINK
        .find_iter(html)
        .filter_map(|m| m.as_str().splitn(2, |c| c == '"' || c == '\'').nth(1))
        .filter(|href| href.starts_with(base_url))
        .map(str::to_string)
        .take(limit)
        .collect()
}

static HREF_LINK: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r#"(?i)href=["'][^"']+["']"#).unwrap());

#[async_trait]
impl Scanner for WebsiteScanner {
    fn scan_type(&self) -> scan_core::ScanType {
        scan_core::ScanType::Website
    }

    fn is_retry_safe(&self) -> bool {
        true
    }

    fn default_deadline(&self) -> StdDuration {
        StdDuration::from_secs(5 * 60)
    }

    async fn run(
        &self,
        job: &ScanJob,
        request: &ScanRequest,
        cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<ScanOutcome, ScanFailure> {
        let target: WebsiteScanTarget =
            serde_json::from_value(request.target.clone()).map_err(|err| ScanFailure {
                message: format!("malformed website scan target: {err}"),
                retry_safe: false,
                partial_findings: vec![],
            })?;

        let region_set = vec![request.target_region.clone()];
        let limit = target.max_linked_pages.unwrap_or(DEFAULT_MAX_LINKED_PAGES);

        let root_capture = self.capture(&target.target_url).await.ok_or_else(|| ScanFailure {
            message: format!("failed to fetch {}", target.target_url),
            retry_safe: true,
            partial_findings: vec![],
        })?;
        let linked_pages = extract_linked_pages(&target.target_url, &root_capture.html, limit);

        let mut captures = vec![root_capture];
        for url in linked_pages {
            if cancellation.is_cancelled() {
                break;
            }
            if let Some(capture) = self.capture(&url).await {
                captures.push(capture);
            }
        }

        let mut findings: Vec<Finding> = Vec::new();
        let mut pages_scanned = 0u64;
        let mut lines_analyzed = 0u64;
        let mut trackers_found = 0usize;
        let mut cookies_by_class: HashMap<CookieClass, u64> = HashMap::new();
        let mut gdpr_violations: Vec<String> = Vec::new();
        let total = captures.len().max(1);

        for (i, capture) in captures.iter().enumerate() {
            if cancellation.is_cancelled() {
                break;
            }

            let observations = analyze(capture);
            lines_analyzed += observations.lines_analyzed;
            trackers_found += observations.trackers_found;
            for cookie in &observations.cookies {
                *cookies_by_class.entry(cookie.classification).or_insert(0) += 1;
            }

            let violations = self.registry.evaluate_rules(scan_core::ScanType::Website, &observations.context, &region_set);
            for violation in violations {
                gdpr_violations.push(violation.rule_id.clone());
                findings.push(Finding {
                    finding_id: uuid::Uuid::new_v4(),
                    job_id: job.job_id,
                    finding_type: "gdpr_violation".to_string(),
                    category: "consent".to_string(),
                    severity: violation.severity,
                    location: capture.url.clone(),
                    evidence_excerpt: violation.gdpr_article_refs.join(", "),
                    confidence: 1.0,
                    rule_id: violation.rule_id,
                    region_tags: violation.region_tags,
                    pii_kind: None,
                });
            }

            findings.extend(crate::detect::text::scan_text(
                &self.registry,
                job.job_id,
                &capture.url,
                &capture.html,
                &region_set,
            ));

            pages_scanned += 1;
            progress.report((i as f32 + 1.0) / total as f32 * 100.0);
        }

        let mut by_category = HashMap::new();
        by_category.insert("pages_scanned".to_string(), pages_scanned);
        by_category.insert("trackers_found".to_string(), trackers_found as u64);
        by_category.insert(
            "cookies_found".to_string(),
            cookies_by_class.values().sum::<u64>(),
        );
        by_category.insert("gdpr_violations".to_string(), gdpr_violations.len() as u64);

        let mut result = empty_result(job, scan_core::ScanType::Website);
        result.files_scanned = pages_scanned;
        result.units_scanned = lines_analyzed;
        result.findings_total = findings.len() as u64;
        result.by_category = by_category;
        result.partial = cancellation.is_cancelled();
        Ok(ScanOutcome { findings, result })
    }
}
