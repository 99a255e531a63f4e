//! Pattern & Rule Registry (C1, §4.1). Holds the PII pattern set,
//! the per-region rule pack, and the severity/weight tables as one
//! atomically-swappable snapshot, grounded on the atomic-config-swap shape
//! used across this codebase's security modules (`security/compliance.rs`,
//! `security/data_masking.rs`) but collapsed here into a single `ArcSwap`
//! rather than a cache behind a lock, since snapshots are read far more
//! often than reloaded.

pub mod patterns;
pub mod rules;
pub mod weights;

use crate::error::{EngineError, Result};
use arc_swap::ArcSwap;
use patterns::{PiiPatternEntry, RawMatch};
use rules::{RegionRuleEntry, RuleContext, RuleViolation};
use scan_core::{RegionTag, ScanType};
use std::collections::HashMap;
use std::sync::Arc;
use weights::SeverityWeights;

/// One immutable, shareable view of the registry's content. Scans in flight
/// keep the snapshot they were issued even if `reload` swaps in a new one
/// (§4.1: "in-flight scans continue with the snapshot they were issued").
pub struct RegistrySnapshot {
    pub patterns: Vec<PiiPatternEntry>,
    pub rules_by_region: HashMap<RegionTag, Vec<RegionRuleEntry>>,
    pub severity_weights: SeverityWeights,
}

impl RegistrySnapshot {
    /// Validates structural invariants before a pack is allowed to replace
    /// the live snapshot: every rule must target at least one scan type and
    /// reference an existing region tag, and the pattern set must not be
    /// empty (a registry that matches nothing is almost certainly a bad pack).
    fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(EngineError::MalformedRulePack(
                "pattern set must not be empty".to_string(),
            ));
        }
        for (region, rules) in &self.rules_by_region {
            for rule in rules {
                if rule.applies_to_scan_types.is_empty() {
                    return Err(EngineError::MalformedRulePack(format!(
                        "rule {} in region {} applies to no scan type",
                        rule.rule_id, region
                    )));
                }
            }
        }
        Ok(())
    }
}

pub fn default_snapshot() -> RegistrySnapshot {
    let mut rules_by_region = HashMap::new();
    rules_by_region.insert(RegionTag::from("NL"), rules::default_nl_rules());

    RegistrySnapshot {
        patterns: patterns::default_pattern_set(),
        rules_by_region,
        severity_weights: weights::default_weights(),
    }
}

/// The public C1 surface: `match`, `evaluate_rules`, `reload`.
pub struct PatternRegistry {
    snapshot: ArcSwap<RegistrySnapshot>,
}

impl PatternRegistry {
    pub fn new(initial: RegistrySnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(initial),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_snapshot())
    }

    /// The snapshot currently live. Callers that will run a whole scan
    /// against one consistent view should hold onto this `Arc` rather than
    /// calling `snapshot()` again mid-scan.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// `match(text_window, region_set) -> [RawMatch]` (§4.1).
    /// Deterministic and side-effect-free: runs every pattern whose region
    /// tags intersect `region_set`, or that carries no region tag at all
    /// (region-agnostic patterns like secrets).
    pub fn match_text(&self, text_window: &str, region_set: &[RegionTag]) -> Vec<RawMatch> {
        let snapshot = self.snapshot();
        snapshot
            .patterns
            .iter()
            .filter(|entry| {
                entry.region_tags.is_empty()
                    || entry.region_tags.iter().any(|tag| region_set.contains(tag))
            })
            .flat_map(|entry| entry.scan(text_window))
            .collect()
    }

    /// `evaluate_rules(scan_type, context, region_set) -> [RuleViolation]`.
    pub fn evaluate_rules(
        &self,
        scan_type: ScanType,
        context: &RuleContext,
        region_set: &[RegionTag],
    ) -> Vec<RuleViolation> {
        let snapshot = self.snapshot();
        region_set
            .iter()
            .filter_map(|region| snapshot.rules_by_region.get(region))
            .flat_map(|rules| rules::evaluate(rules, scan_type, context, region_set))
            .collect()
    }

    /// `reload(new_pack)` — atomic replace. A malformed pack is rejected
    /// and the previous snapshot is retained untouched (§4.1).
    pub fn reload(&self, new_pack: RegistrySnapshot) -> Result<()> {
        new_pack.validate()?;
        self.snapshot.store(Arc::new(new_pack));
        Ok(())
    }

    pub fn severity_weights(&self) -> Arc<RegistrySnapshot> {
        self.snapshot()
    }

    /// `penalty_multiplier` for a region rule by id (§4.7: "region
    /// rule violation carries an additional multiplier"). `None` for a
    /// `rule_id` that isn't a region rule (e.g. a PII pattern's `pii.*` id),
    /// which the caller should treat as multiplier 1.0.
    pub fn rule_penalty_multiplier(&self, rule_id: &str) -> Option<f64> {
        let snapshot = self.snapshot();
        snapshot
            .rules_by_region
            .values()
            .flatten()
            .find(|rule| rule.rule_id == rule_id)
            .map(|rule| rule.penalty_multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_text_finds_email_in_nl_region() {
        let registry = PatternRegistry::with_defaults();
        let nl = vec![RegionTag::from("NL")];
        let matches = registry.match_text("reach me at a@b.com please", &nl);
        assert!(matches.iter().any(|m| m.pii_kind == "email"));
    }

    #[test]
    fn region_scoped_pattern_is_excluded_outside_its_region() {
        let registry = PatternRegistry::with_defaults();
        let de = vec![RegionTag::from("DE")];
        let matches = registry.match_text("bsn 111222333 present", &de);
        assert!(!matches.iter().any(|m| m.pii_kind == "dutch_bsn"));
    }

    #[test]
    fn reload_rejects_empty_pattern_set_and_keeps_previous() {
        let registry = PatternRegistry::with_defaults();
        let bad = RegistrySnapshot {
            patterns: vec![],
            rules_by_region: HashMap::new(),
            severity_weights: weights::default_weights(),
        };
        let result = registry.reload(bad);
        assert!(result.is_err());

        let nl = vec![RegionTag::from("NL")];
        assert!(!registry.match_text("a@b.com", &nl).is_empty());
    }

    #[test]
    fn reload_replaces_rules_atomically() {
        let registry = PatternRegistry::with_defaults();
        let mut rules_by_region = HashMap::new();
        rules_by_region.insert(RegionTag::from("DE"), rules::default_nl_rules());
        let replacement = RegistrySnapshot {
            patterns: patterns::default_pattern_set(),
            rules_by_region,
            severity_weights: weights::default_weights(),
        };
        registry.reload(replacement).unwrap();

        let ctx = RuleContext {
            consent_banner_present: true,
            ..Default::default()
        };
        let de = vec![RegionTag::from("DE")];
        assert!(!registry.evaluate_rules(ScanType::Website, &ctx, &de).is_empty());
        let nl = vec![RegionTag::from("NL")];
        assert!(registry.evaluate_rules(ScanType::Website, &ctx, &nl).is_empty());
    }
}
