//! Image scanner (§4.3): runs each image through the OCR adapter
//! and detects PII in whatever text comes back. OCR is an optional
//! capability; its absence degrades to a diagnostic, never a scan failure.

use super::{empty_result, Scanner};
use crate::detect::ocr::{scan_image, OcrEngine};
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
pub struct ImageUnit {
    pub location: String,
    #[serde(with = "base64_bytes")]
    pub image_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageScanTarget {
    pub images: Vec<ImageUnit>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

pub struct ImageScanner {
    registry: Arc<PatternRegistry>,
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl ImageScanner {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry, ocr: None }
    }

    pub fn with_ocr(registry: Arc<PatternRegistry>, ocr: Arc<dyn OcrEngine>) -> Self {
        Self { registry, ocr: Some(ocr) }
    }
}

#[async_trait]
impl Scanner for ImageScanner {
    fn scan_type(&self) -> scan_core::ScanType {
        scan_core::ScanType::Image
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
        let target: ImageScanTarget = serde_json::from_value(request.target.clone()).map_err(|err| ScanFailure {
            message: format!("malformed image scan target: {err}"),
            retry_safe: false,
            partial_findings: vec![],
        })?;

        let region_set = vec![request.target_region.clone()];
        let mut findings = Vec::new();
        let total = target.images.len().max(1);
        let mut files_scanned = 0u64;

        for (i, image) in target.images.iter().enumerate() {
            if cancellation.is_cancelled() {
                let mut result = empty_result(job, scan_core::ScanType::Image);
                result.files_scanned = files_scanned;
                result.findings_total = findings.len() as u64;
                result.partial = true;
                return Ok(ScanOutcome { findings, result });
            }

            let (image_findings, _diagnostics) = scan_image(
                &self.registry,
                job.job_id,
                &image.location,
                &image.image_bytes,
                &region_set,
                self.ocr.as_deref(),
            );
            findings.extend(image_findings);
            files_scanned += 1;
            progress.report((i as f32 + 1.0) / total as f32 * 100.0);
        }

        let mut result = empty_result(job, scan_core::ScanType::Image);
        result.files_scanned = files_scanned;
        result.findings_total = findings.len() as u64;
        Ok(ScanOutcome { findings, result })
    }
}
