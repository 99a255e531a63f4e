//! Region rule pack (§4.1 item 2): predicates evaluated against a
//! scanner's normalized context, independent of the PII pattern set.

use scan_core::{RegionTag, ScanType, Severity};
use serde::{Deserialize, Serialize};

/// Normalized observations a scanner hands the registry for rule evaluation.
/// Populated by [`crate::detect::html::analyze`] for website scans; other
/// scan types populate only the fields that apply to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleContext {
    pub consent_banner_present: bool,
    pub reject_all_button_present: bool,
    pub pre_ticked_marketing_inputs: bool,
    pub tracker_domains: Vec<String>,
    pub ga_loaded_before_consent: bool,
    pub kvk_or_imprint_present: bool,
    /// Free-form textual predicates found in documentation (AI model scan).
    pub document_markers: Vec<String>,
}

/// A predicate over [`RuleContext`]. Kept as a closed enum rather than a
/// boxed closure so a reloaded rule pack stays `Serialize`/`Deserialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RulePredicate {
    MissingRejectAllButton,
    PreTickedMarketingCheckboxPresent,
    TrackerLoadedBeforeConsent,
    MissingImprint,
    DocumentMarkerAbsent(String),
}

impl RulePredicate {
    pub fn evaluate(&self, ctx: &RuleContext) -> bool {
        match self {
            RulePredicate::MissingRejectAllButton => {
                ctx.consent_banner_present && !ctx.reject_all_button_present
            }
            RulePredicate::PreTickedMarketingCheckboxPresent => ctx.pre_ticked_marketing_inputs,
            RulePredicate::TrackerLoadedBeforeConsent => {
                !ctx.tracker_domains.is_empty() && ctx.ga_loaded_before_consent
            }
            RulePredicate::MissingImprint => !ctx.kvk_or_imprint_present,
            RulePredicate::DocumentMarkerAbsent(marker) => {
                !ctx.document_markers.iter().any(|m| m.eq_ignore_ascii_case(marker))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRuleEntry {
    pub rule_id: String,
    pub applies_to_scan_types: Vec<ScanType>,
    pub predicate: RulePredicate,
    pub severity: Severity,
    pub gdpr_article_refs: Vec<String>,
    pub penalty_multiplier: f64,
}

impl RegionRuleEntry {
    fn applies_to(&self, scan_type: ScanType) -> bool {
        self.applies_to_scan_types.contains(&scan_type)
    }
}

/// A confirmed rule-pack violation, ready for C7's penalty calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub severity: Severity,
    pub gdpr_article_refs: Vec<String>,
    pub penalty_multiplier: f64,
    pub region_tags: Vec<RegionTag>,
}

pub fn evaluate(
    rules: &[RegionRuleEntry],
    scan_type: ScanType,
    ctx: &RuleContext,
    region_tags: &[RegionTag],
) -> Vec<RuleViolation> {
    rules
        .iter()
        .filter(|rule| rule.applies_to(scan_type) && rule.predicate.evaluate(ctx))
        .map(|rule| RuleViolation {
            rule_id: rule.rule_id.clone(),
            severity: rule.severity,
            gdpr_article_refs: rule.gdpr_article_refs.clone(),
            penalty_multiplier: rule.penalty_multiplier,
            region_tags: region_tags.to_vec(),
        })
        .collect()
}

/// Built-in NL rule pack (§4.3 website scanner example).
pub fn default_nl_rules() -> Vec<RegionRuleEntry> {
    vec![
        RegionRuleEntry {
            rule_id: "nl.reject_all_required".to_string(),
            applies_to_scan_types: vec![ScanType::Website],
            predicate: RulePredicate::MissingRejectAllButton,
            severity: Severity::High,
            gdpr_article_refs: vec!["Art. 7".to_string()],
            penalty_multiplier: 1.2,
        },
        RegionRuleEntry {
            rule_id: "nl.no_pre_ticked_marketing".to_string(),
            applies_to_scan_types: vec![ScanType::Website],
            predicate: RulePredicate::PreTickedMarketingCheckboxPresent,
            severity: Severity::High,
            gdpr_article_refs: vec!["Art. 7".to_string()],
            penalty_multiplier: 1.2,
        },
        RegionRuleEntry {
            rule_id: "nl.ga_before_consent".to_string(),
            applies_to_scan_types: vec![ScanType::Website],
            predicate: RulePredicate::TrackerLoadedBeforeConsent,
            severity: Severity::Medium,
            gdpr_article_refs: vec!["Art. 6".to_string()],
            penalty_multiplier: 1.2,
        },
        RegionRuleEntry {
            rule_id: "nl.kvk_imprint_required".to_string(),
            applies_to_scan_types: vec![ScanType::Website],
            predicate: RulePredicate::MissingImprint,
            severity: Severity::Low,
            gdpr_article_refs: vec![],
            penalty_multiplier: 1.2,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reject_all_is_flagged_only_when_banner_present() {
        let mut ctx = RuleContext {
            consent_banner_present: false,
            ..Default::default()
        };
        assert!(!RulePredicate::MissingRejectAllButton.evaluate(&ctx));
        ctx.consent_banner_present = true;
        assert!(RulePredicate::MissingRejectAllButton.evaluate(&ctx));
        ctx.reject_all_button_present = true;
        assert!(!RulePredicate::MissingRejectAllButton.evaluate(&ctx));
    }

    #[test]
    fn evaluate_filters_by_scan_type() {
        let rules = default_nl_rules();
        let ctx = RuleContext {
            consent_banner_present: true,
            reject_all_button_present: false,
            ..Default::default()
        };
        let nl = vec![RegionTag::from("NL")];
        let website_violations = evaluate(&rules, ScanType::Website, &ctx, &nl);
        assert!(website_violations.iter().any(|v| v.rule_id == "nl.reject_all_required"));

        let code_violations = evaluate(&rules, ScanType::Code, &ctx, &nl);
        assert!(code_violations.is_empty());
    }
}
