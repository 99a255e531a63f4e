//! HTML/DOM analyzer (§4.2): turns a captured page into normalized
//! observations the registry's rule pack can evaluate, plus a cookie
//! classification and a best-effort tracker count.

use crate::registry::rules::RuleContext;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single `Set-Cookie` observation or a cookie inferred from other signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieObservation {
    pub name: String,
    pub classification: CookieClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CookieClass {
    StrictlyNecessary,
    Marketing,
    Analytics,
}

/// A page capture as handed over by the website scanner's fetcher
/// (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCapture {
    pub url: String,
    pub html: String,
    pub response_headers: Vec<(String, String)>,
    pub loaded_resources: Vec<String>,
    pub set_cookies: Vec<String>,
}

/// Result of running the DOM analyzer over one [`PageCapture`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlObservations {
    pub context: RuleContext,
    pub cookies: Vec<CookieObservation>,
    pub trackers_found: usize,
    pub lines_analyzed: u64,
}

static CONSENT_BANNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)cookie(s)?[- ]?(consent|banner|notice)").unwrap());
static REJECT_ALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)reject\s*all").unwrap());
static MARKETING_CHECKBOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<input[^>]*type=["']checkbox["'][^>]*checked[^>]*marketing"#).unwrap());
static KVK_OR_IMPRINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(kvk|colofon|imprint|impressum)").unwrap());
static GOOGLE_ANALYTICS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)google-analytics\.com|gtag\(|googletagmanager").unwrap());

const KNOWN_TRACKER_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "facebook.net",
    "hotjar.com",
];

/// Classifies loaded resources and `Set-Cookie` headers, evaluates consent
/// signals, and derives a tracker/cookie count by the priority order
/// §4.2 defines: explicit headers, then policy-declared cookies,
/// then `max(2, min(round(trackers * 0.7), 20))` as a last resort.
pub fn analyze(capture: &PageCapture) -> HtmlObservations {
    let tracker_domains: Vec<String> = capture
        .loaded_resources
        .iter()
        .chain(capture.response_headers.iter().map(|(_, v)| v))
        .filter_map(|resource| {
            KNOWN_TRACKER_DOMAINS
                .iter()
                .find(|domain| resource.contains(*domain))
                .map(|domain| domain.to_string())
        })
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let trackers_found = tracker_domains.len();

    let cookies = classify_cookies(capture, trackers_found);

    let consent_banner_present = CONSENT_BANNER.is_match(&capture.html);
    let reject_all_button_present = REJECT_ALL.is_match(&capture.html);
    let pre_ticked_marketing_inputs = MARKETING_CHECKBOX.is_match(&capture.html);
    let kvk_or_imprint_present = KVK_OR_IMPRINT.is_match(&capture.html);

    let ga_loaded_before_consent = if let Some(ga_pos) = find_pos(&capture.html, &GOOGLE_ANALYTICS) {
        match find_pos(&capture.html, &CONSENT_BANNER) {
            Some(consent_pos) => ga_pos < consent_pos,
            None => !tracker_domains.is_empty(),
        }
    } else {
        false
    };

    let lines_analyzed = capture.html.lines().count() as u64;

    HtmlObservations {
        context: RuleContext {
            consent_banner_present,
            reject_all_button_present,
            pre_ticked_marketing_inputs,
            tracker_domains,
            ga_loaded_before_consent,
            kvk_or_imprint_present,
            document_markers: vec![],
        },
        cookies,
        trackers_found,
        lines_analyzed,
    }
}

fn find_pos(html: &str, pattern: &Regex) -> Option<usize> {
    pattern.find(html).map(|m| m.start())
}

fn classify_cookies(capture: &PageCapture, trackers_found: usize) -> Vec<CookieObservation> {
    if !capture.set_cookies.is_empty() {
        return capture
            .set_cookies
            .iter()
            .map(|raw| {
                let name = raw.split('=').next().unwrap_or(raw).trim().to_string();
                CookieObservation {
                    classification: classify_cookie_name(&name),
                    name,
                }
            })
            .collect();
    }

    // Estimate from tracker count when neither headers nor a declared policy
    // are available (§4.2 priority (c)).
    let estimated = (2usize).max(((trackers_found as f64 * 0.7).round() as usize).min(20));
    (0..estimated)
        .map(|i| CookieObservation {
            name: format!("estimated_cookie_{i}"),
            classification: CookieClass::Analytics,
        })
        .collect()
}

fn classify_cookie_name(name: &str) -> CookieClass {
    let lower = name.to_lowercase();
    if lower.contains("_ga") || lower.contains("analytics") {
        CookieClass::Analytics
    } else if lower.contains("ad") || lower.contains("marketing") || lower.contains("fbp") {
        CookieClass::Marketing
    } else {
        CookieClass::StrictlyNecessary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(html: &str) -> PageCapture {
        PageCapture {
            url: "https://example.nl".to_string(),
            html: html.to_string(),
            response_headers: vec![],
            loaded_resources: vec![],
            set_cookies: vec![],
        }
    }

    #[test]
    fn detects_missing_reject_all_button() {
        let observations = analyze(&capture("<div class='cookie-consent'>Accept</div>"));
        assert!(observations.context.consent_banner_present);
        assert!(!observations.context.reject_all_button_present);
    }

    #[test]
    fn detects_reject_all_button() {
        let observations = analyze(&capture("<div class='cookie-consent'><button>Reject All</button></div>"));
        assert!(observations.context.reject_all_button_present);
    }

    #[test]
    fn cookie_count_falls_back_to_tracker_estimate() {
        let mut page = capture("<html></html>");
        page.loaded_resources = vec!["https://www.google-analytics.com/analytics.js".to_string()];
        let observations = analyze(&page);
        assert_eq!(observations.trackers_found, 1);
        assert_eq!(observations.cookies.len(), 2);
    }

    #[test]
    fn explicit_set_cookie_headers_take_priority_over_estimate() {
        let mut page = capture("<html></html>");
        page.loaded_resources = vec!["https://www.google-analytics.com/analytics.js".to_string()];
        page.set_cookies = vec!["_ga=GA1.2.123; Path=/".to_string(), "session_id=abc; HttpOnly".to_string()];
        let observations = analyze(&page);
        assert_eq!(observations.cookies.len(), 2);
        assert_eq!(observations.cookies[0].classification, CookieClass::Analytics);
        assert_eq!(observations.cookies[1].classification, CookieClass::StrictlyNecessary);
    }
}
