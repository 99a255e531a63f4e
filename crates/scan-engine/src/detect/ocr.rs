//! Image OCR adapter (§4.2): optional capability. When an OCR
//! engine is wired in, extracted text is forwarded into the text scanner;
//! when it isn't, the image scanner still completes, with a diagnostic
//! marking the gap rather than failing the job.

use super::text::scan_text;
use super::Diagnostic;
use crate::registry::PatternRegistry;
use scan_core::model::Finding;
use scan_core::{JobId, RegionTag};

/// One OCR-recognized text region with its own confidence.
#[derive(Debug, Clone)]
pub struct OcrRegion {
    pub text: String,
    pub confidence: f64,
}

/// Implemented by whatever OCR backend a deployment wires in; the core
/// ships no OCR engine of its own (§1 Non-goals: no bundled ML models).
pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, image_bytes: &[u8]) -> Vec<OcrRegion>;
}

/// Runs OCR (if available) then the text scanner over every recognized
/// region. `location` stamps findings, e.g. `"photo.jpg"`.
pub fn scan_image(
    registry: &PatternRegistry,
    job_id: JobId,
    location: &str,
    image_bytes: &[u8],
    region_set: &[RegionTag],
    ocr: Option<&dyn OcrEngine>,
) -> (Vec<Finding>, Vec<Diagnostic>) {
    let Some(ocr) = ocr else {
        return (vec![], vec![Diagnostic::info("OCR not available")]);
    };

    let regions = ocr.extract_text(image_bytes);
    if regions.is_empty() {
        return (vec![], vec![Diagnostic::info("no text recognized in image")]);
    }

    let mut findings = Vec::new();
    let mut diagnostics = Vec::new();
    for (i, region) in regions.iter().enumerate() {
        if region.confidence < 0.3 {
            diagnostics.push(Diagnostic::warn(format!(
                "low-confidence OCR region {i} ({:.2}) skipped",
                region.confidence
            )));
            continue;
        }
        let region_location = format!("{location}#region={i}");
        findings.extend(scan_text(registry, job_id, &region_location, &region.text, region_set));
    }

    (findings, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PatternRegistry;

    struct StubOcr(Vec<OcrRegion>);
    impl OcrEngine for StubOcr {
        fn extract_text(&self, _image_bytes: &[u8]) -> Vec<OcrRegion> {
            self.0.clone()
        }
    }

    #[test]
    fn missing_ocr_engine_degrades_gracefully() {
        let registry = PatternRegistry::with_defaults();
        let (findings, diagnostics) = scan_image(&registry, JobId::new(), "id_card.png", &[], &[], None);
        assert!(findings.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("OCR not available"));
    }

    #[test]
    fn recognized_region_is_forwarded_to_text_scanner() {
        let registry = PatternRegistry::with_defaults();
        let region = vec![RegionTag::from("NL")];
        let ocr = StubOcr(vec![OcrRegion { text: "contact a@b.com".to_string(), confidence: 0.9 }]);
        let (findings, _) = scan_image(&registry, JobId::new(), "id_card.png", &[], &region, Some(&ocr));
        assert!(findings.iter().any(|f| f.pii_kind.as_deref() == Some("email")));
    }

    #[test]
    fn low_confidence_region_is_skipped_not_failed() {
        let registry = PatternRegistry::with_defaults();
        let ocr = StubOcr(vec![OcrRegion { text: "a@b.com".to_string(), confidence: 0.1 }]);
        let (findings, diagnostics) = scan_image(&registry, JobId::new(), "id_card.png", &[], &[], Some(&ocr));
        assert!(findings.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }
}
