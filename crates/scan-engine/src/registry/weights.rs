//! Severity/weight tables (§4.1 item 3): the per-finding penalty
//! used by the compliance score engine (C7) and the pii_kind-to-principle
//! mapping it sums penalties into.

use scan_core::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The six GDPR principles scored independently by C7.
pub const PRINCIPLES: [&str; 6] = [
    "lawfulness",
    "purpose_limitation",
    "data_minimisation",
    "accuracy",
    "storage_limitation",
    "integrity_and_confidentiality",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityWeights {
    /// Base point penalty per finding severity, applied per principle
    /// (§4.7): Critical -25, High -10, Medium -3, Low -1, Info 0.
    pub penalty_by_severity: HashMap<Severity, f64>,
    /// pii_kind -> principle bucket (§4.1 item 3).
    pub principle_by_pii_kind: HashMap<String, String>,
    /// Per-principle weight in the overall weighted mean (§4.7);
    /// defaults to uniform.
    pub principle_weight: HashMap<String, f64>,
}

impl SeverityWeights {
    pub fn penalty_for(&self, severity: Severity) -> f64 {
        self.penalty_by_severity.get(&severity).copied().unwrap_or(0.0)
    }

    pub fn principle_for(&self, pii_kind: &str) -> &str {
        self.principle_by_pii_kind
            .get(pii_kind)
            .map(String::as_str)
            .unwrap_or("integrity_and_confidentiality")
    }

    pub fn weight_for(&self, principle: &str) -> f64 {
        self.principle_weight.get(principle).copied().unwrap_or(1.0)
    }
}

pub fn default_weights() -> SeverityWeights {
    let mut penalty_by_severity = HashMap::new();
    penalty_by_severity.insert(Severity::Critical, -25.0);
    penalty_by_severity.insert(Severity::High, -10.0);
    penalty_by_severity.insert(Severity::Medium, -3.0);
    penalty_by_severity.insert(Severity::Low, -1.0);
    penalty_by_severity.insert(Severity::Info, 0.0);

    let mut principle_by_pii_kind = HashMap::new();
    principle_by_pii_kind.insert("email".to_string(), "purpose_limitation".to_string());
    principle_by_pii_kind.insert("dutch_bsn".to_string(), "data_minimisation".to_string());
    principle_by_pii_kind.insert("iban".to_string(), "integrity_and_confidentiality".to_string());
    principle_by_pii_kind.insert("credit_card".to_string(), "integrity_and_confidentiality".to_string());
    principle_by_pii_kind.insert("phone_nl".to_string(), "data_minimisation".to_string());
    principle_by_pii_kind.insert("aws_access_key".to_string(), "integrity_and_confidentiality".to_string());
    principle_by_pii_kind.insert("generic_secret".to_string(), "integrity_and_confidentiality".to_string());

    let principle_weight = PRINCIPLES.iter().map(|p| (p.to_string(), 1.0)).collect();

    SeverityWeights {
        penalty_by_severity,
        principle_by_pii_kind,
        principle_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_match_spec_penalty_table() {
        let weights = default_weights();
        assert_eq!(weights.penalty_for(Severity::Critical), -25.0);
        assert_eq!(weights.penalty_for(Severity::High), -10.0);
        assert_eq!(weights.penalty_for(Severity::Medium), -3.0);
        assert_eq!(weights.penalty_for(Severity::Low), -1.0);
        assert_eq!(weights.penalty_for(Severity::Info), 0.0);
    }

    #[test]
    fn unknown_pii_kind_defaults_to_integrity_bucket() {
        let weights = default_weights();
        assert_eq!(weights.principle_for("unknown_kind"), "integrity_and_confidentiality");
    }
}
