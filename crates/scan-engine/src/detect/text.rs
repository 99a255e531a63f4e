//! Text scanner (§4.2): chunked byte stream -> normalized text ->
//! sliding-window pattern match via the registry -> `[Finding]`.

use super::Diagnostic;
use crate::registry::PatternRegistry;
use scan_core::model::Finding;
use scan_core::{JobId, RegionTag};
use std::collections::HashSet;

/// Default chunk size and overlap window. Overlap must be at least as wide
/// as the longest pattern the registry can match, so a PII token spanning a
/// chunk boundary is still found; duplicate hits in the overlap region are
/// removed by `(offset, rule_id)` dedup (§4.2).
pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_OVERLAP: usize = 256;

/// Best-effort decode of raw bytes to text. Anything that isn't valid UTF-8
/// is decoded lossily rather than failing the scan outright.
pub fn normalize_to_text(bytes: &[u8]) -> (String, Vec<Diagnostic>) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), vec![]),
        Err(_) => (
            String::from_utf8_lossy(bytes).to_string(),
            vec![Diagnostic::warn("input was not valid UTF-8; decoded lossily")],
        ),
    }
}

/// Scans `text` for PII against the registry's pattern set, chunked to bound
/// memory use on very large inputs, with overlap to catch cross-chunk
/// matches. `location` stamps every finding (e.g. `"path/to/file.rs"` or
/// `"page=3"`).
pub fn scan_text(
    registry: &PatternRegistry,
    job_id: JobId,
    location: &str,
    text: &str,
    region_set: &[RegionTag],
) -> Vec<Finding> {
    scan_text_windowed(registry, job_id, location, text, region_set, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
}

pub fn scan_text_windowed(
    registry: &PatternRegistry,
    job_id: JobId,
    location: &str,
    text: &str,
    region_set: &[RegionTag],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Finding> {
    let bytes = text.as_bytes();
    let mut seen: HashSet<(usize, String)> = HashSet::new();
    let mut findings = Vec::new();

    let mut start = 0usize;
    while start < bytes.len() {
        let end = (start + chunk_size).min(bytes.len());
        // Never split a UTF-8 codepoint: walk back to a char boundary.
        let mut safe_end = end;
        while safe_end > start && !text.is_char_boundary(safe_end) {
            safe_end -= 1;
        }
        let window = &text[start..safe_end];

        for raw in registry.match_text(window, region_set) {
            let global_offset = start + raw.offset;
            let key = (global_offset, raw.rule_id.clone());
            if !seen.insert(key) {
                continue;
            }
            findings.push(Finding {
                finding_id: uuid::Uuid::new_v4(),
                job_id,
                finding_type: "pii_detected".to_string(),
                category: raw.pii_kind.clone(),
                severity: raw.severity,
                location: location.to_string(),
                evidence_excerpt: redact_excerpt(&raw.excerpt),
                confidence: raw.confidence,
                rule_id: raw.rule_id,
                region_tags: raw.region_tags,
                pii_kind: Some(raw.pii_kind),
            });
        }

        if safe_end >= bytes.len() {
            break;
        }
        start = safe_end.saturating_sub(overlap).max(start + 1);
    }

    findings
}

/// Findings carry enough of the match to audit, not the raw secret. Longer
/// excerpts are truncated with the middle masked.
fn redact_excerpt(excerpt: &str) -> String {
    if excerpt.chars().count() <= 6 {
        return "*".repeat(excerpt.chars().count());
    }
    let chars: Vec<char> = excerpt.chars().collect();
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PatternRegistry;

    #[test]
    fn finds_email_and_redacts_excerpt() {
        let registry = PatternRegistry::with_defaults();
        let region = vec![RegionTag::from("NL")];
        let findings = scan_text(&registry, JobId::new(), "file.txt", "email jane.doe@example.com here", &region);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pii_kind.as_deref(), Some("email"));
        assert!(!findings[0].evidence_excerpt.contains("jane.doe"));
    }

    #[test]
    fn cross_chunk_match_is_found_exactly_once() {
        let registry = PatternRegistry::with_defaults();
        let region = vec![RegionTag::from("NL")];
        let padding = "x".repeat(DEFAULT_CHUNK_SIZE - 10);
        let text = format!("{padding}jane.doe@example.com");
        let findings = scan_text_windowed(&registry, JobId::new(), "file.txt", &text, &region, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP);
        let email_hits: Vec<_> = findings.iter().filter(|f| f.pii_kind.as_deref() == Some("email")).collect();
        assert_eq!(email_hits.len(), 1);
    }
}
