//! PII pattern set (§4.1 item 1): an ordered list of recognizers,
//! each with an optional post-match validator that can downgrade confidence.

use regex::Regex;
use scan_core::{RegionTag, Severity};
use serde::{Deserialize, Serialize};

/// A raw, unconfirmed hit from [`super::PatternRegistry::match_text`]. The
/// aggregator (C6) turns these into [`scan_core::model::Finding`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMatch {
    pub pii_kind: String,
    pub rule_id: String,
    pub offset: usize,
    pub length: usize,
    pub excerpt: String,
    pub confidence: f64,
    pub severity: Severity,
    pub region_tags: Vec<RegionTag>,
}

/// Post-match checksum/structural validation. A match whose validator fails
/// is still reported (§4.1: "degrades confidence", never drops it),
/// at half its base confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Validator {
    /// Dutch citizen service number 11-proof checksum.
    DutchBsnElevenProof,
    /// Luhn mod-10, used for payment card numbers.
    Luhn,
    /// IBAN mod-97 checksum (ISO 7064).
    IbanMod97,
}

impl Validator {
    pub fn validate(&self, candidate: &str) -> bool {
        let digits: String = candidate.chars().filter(|c| c.is_ascii_digit()).collect();
        match self {
            Validator::DutchBsnElevenProof => eleven_proof(&digits),
            Validator::Luhn => luhn_checksum(&digits),
            Validator::IbanMod97 => iban_mod97(candidate),
        }
    }
}

/// Confidence multiplier applied when a match's validator fails (§4.1).
pub const VALIDATOR_FAILURE_PENALTY: f64 = 0.5;

fn eleven_proof(digits: &str) -> bool {
    if digits.len() != 8 && digits.len() != 9 {
        return false;
    }
    let padded: Vec<u32> = if digits.len() == 8 {
        std::iter::once(0).chain(digits.chars().filter_map(|c| c.to_digit(10))).collect()
    } else {
        digits.chars().filter_map(|c| c.to_digit(10)).collect()
    };
    if padded.len() != 9 {
        return false;
    }
    let weighted: i32 = padded
        .iter()
        .take(8)
        .enumerate()
        .map(|(i, d)| *d as i32 * (9 - i as i32))
        .sum::<i32>()
        - padded[8] as i32;
    weighted % 11 == 0
}

fn luhn_checksum(digits: &str) -> bool {
    if digits.len() < 12 {
        return false;
    }
    let sum: u32 = digits
        .chars()
        .rev()
        .enumerate()
        .map(|(i, c)| {
            let d = c.to_digit(10).unwrap_or(0);
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn iban_mod97(candidate: &str) -> bool {
    let cleaned: String = candidate.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if cleaned.len() < 15 {
        return false;
    }
    let rearranged = format!("{}{}", &cleaned[4..], &cleaned[..4]);
    let mut numeric = String::with_capacity(rearranged.len() * 2);
    for ch in rearranged.chars() {
        if ch.is_ascii_digit() {
            numeric.push(ch);
        } else {
            numeric.push_str(&(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 10).to_string());
        }
    }
    // mod-97 over a big decimal string, processed in digestible chunks.
    let mut remainder: u64 = 0;
    for ch in numeric.chars() {
        let digit = ch.to_digit(10).unwrap() as u64;
        remainder = (remainder * 10 + digit) % 97;
    }
    remainder == 1
}

/// One entry in the ordered pattern set.
#[derive(Clone)]
pub struct PiiPatternEntry {
    pub pii_kind: String,
    pub matcher: Regex,
    pub validator: Option<Validator>,
    pub confidence_base: f64,
    pub default_severity: Severity,
    pub region_tags: Vec<RegionTag>,
}

impl PiiPatternEntry {
    /// Applies this entry to a text window, returning one [`RawMatch`] per
    /// non-overlapping match. Dedup across chunk boundaries is the caller's
    /// responsibility (§4.2: dedup by `(offset, rule_id)`).
    pub fn scan(&self, text: &str) -> Vec<RawMatch> {
        self.matcher
            .find_iter(text)
            .map(|m| {
                let confidence = match &self.validator {
                    Some(validator) if !validator.validate(m.as_str()) => {
                        self.confidence_base * VALIDATOR_FAILURE_PENALTY
                    }
                    _ => self.confidence_base,
                };
                RawMatch {
                    pii_kind: self.pii_kind.clone(),
                    rule_id: format!("pii.{}", self.pii_kind),
                    offset: m.start(),
                    length: m.end() - m.start(),
                    excerpt: m.as_str().to_string(),
                    confidence,
                    severity: self.default_severity,
                    region_tags: self.region_tags.clone(),
                }
            })
            .collect()
    }
}

/// The built-in pattern set shipped with the platform. Operators may
/// `reload` a richer pack at runtime; this is the floor every tenant gets.
pub fn default_pattern_set() -> Vec<PiiPatternEntry> {
    let nl = vec![RegionTag::from("NL")];
    let eu = vec![RegionTag::from("EU")];

    vec![
        PiiPatternEntry {
            pii_kind: "email".to_string(),
            matcher: Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").unwrap(),
            validator: None,
            confidence_base: 0.9,
            default_severity: Severity::Medium,
            region_tags: eu.clone(),
        },
        PiiPatternEntry {
            pii_kind: "dutch_bsn".to_string(),
            matcher: Regex::new(r"\b\d{3}[.\s]?\d{3}[.\s]?\d{3}\b").unwrap(),
            validator: Some(Validator::DutchBsnElevenProof),
            confidence_base: 0.95,
            default_severity: Severity::Critical,
            region_tags: nl,
        },
        PiiPatternEntry {
            pii_kind: "iban".to_string(),
            matcher: Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{10,30}\b").unwrap(),
            validator: Some(Validator::IbanMod97),
            confidence_base: 0.9,
            default_severity: Severity::High,
            region_tags: eu.clone(),
        },
        PiiPatternEntry {
            pii_kind: "credit_card".to_string(),
            matcher: Regex::new(r"\b(?:\d[ -]?){13,19}\b").unwrap(),
            validator: Some(Validator::Luhn),
            confidence_base: 0.85,
            default_severity: Severity::Critical,
            region_tags: eu.clone(),
        },
        PiiPatternEntry {
            pii_kind: "phone_nl".to_string(),
            matcher: Regex::new(r"\b(?:\+31|0)[1-9][0-9]{8}\b").unwrap(),
            validator: None,
            confidence_base: 0.7,
            default_severity: Severity::Low,
            region_tags: eu.clone(),
        },
        PiiPatternEntry {
            pii_kind: "aws_access_key".to_string(),
            matcher: Regex::new(r"\bAKIA[0-9A-Z]{16}\b").unwrap(),
            validator: None,
            confidence_base: 0.97,
            default_severity: Severity::Critical,
            region_tags: eu,
        },
        PiiPatternEntry {
            pii_kind: "generic_secret".to_string(),
            matcher: Regex::new(
                r#"(?i)(api[_-]?key|secret|token|password)\s*[:=]\s*['"]?[A-Za-z0-9/_+=-]{12,}['"]?"#,
            )
            .unwrap(),
            validator: None,
            confidence_base: 0.6,
            default_severity: Severity::High,
            region_tags: vec![],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_dutch_bsn_passes_eleven_proof() {
        assert!(eleven_proof("111222333"));
    }

    #[test]
    fn random_nine_digits_usually_fails_eleven_proof() {
        assert!(!eleven_proof("123456789"));
    }

    #[test]
    fn luhn_accepts_known_valid_test_number() {
        assert!(luhn_checksum("4111111111111111"));
    }

    #[test]
    fn luhn_rejects_tampered_number() {
        assert!(!luhn_checksum("4111111111111112"));
    }

    #[test]
    fn email_pattern_matches_and_has_no_validator_penalty() {
        let entries = default_pattern_set();
        let email = entries.iter().find(|e| e.pii_kind == "email").unwrap();
        let matches = email.scan("contact us at jane.doe@example.com today");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.9);
    }

    #[test]
    fn bsn_pattern_downgrades_confidence_on_failed_checksum() {
        let entries = default_pattern_set();
        let bsn = entries.iter().find(|e| e.pii_kind == "dutch_bsn").unwrap();
        let matches = bsn.scan("klantnummer 123456789 geregistreerd");
        assert_eq!(matches.len(), 1);
        assert!((matches[0].confidence - bsn.confidence_base * VALIDATOR_FAILURE_PENALTY).abs() < 1e-9);
    }
}
