use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A region tag, e.g. "NL", "DE", used to select a rule pack (§4.1).
/// Free-form rather than a closed enum: new region packs are data, not code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionTag(pub String);

impl fmt::Display for RegionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RegionTag {
    fn from(s: &str) -> Self {
        Self(s.to_uppercase())
    }
}

/// The closed set of scan types this platform implements (§4.3,
/// Open Question #1 resolution: exactly these eight, no string keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Code,
    Document,
    Image,
    Database,
    Api,
    Website,
    AiModel,
    Dpia,
}

impl ScanType {
    pub const ALL: [ScanType; 8] = [
        ScanType::Code,
        ScanType::Document,
        ScanType::Image,
        ScanType::Database,
        ScanType::Api,
        ScanType::Website,
        ScanType::AiModel,
        ScanType::Dpia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Code => "code",
            ScanType::Document => "document",
            ScanType::Image => "image",
            ScanType::Database => "database",
            ScanType::Api => "api",
            ScanType::Website => "website",
            ScanType::AiModel => "ai_model",
            ScanType::Dpia => "dpia",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScanType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(ScanType::Code),
            "document" => Ok(ScanType::Document),
            "image" => Ok(ScanType::Image),
            "database" => Ok(ScanType::Database),
            "api" => Ok(ScanType::Api),
            "website" => Ok(ScanType::Website),
            "ai_model" => Ok(ScanType::AiModel),
            "dpia" => Ok(ScanType::Dpia),
            other => Err(crate::error::Error::rejected_unknown_type(format!(
                "unknown scan type: {other}"
            ))),
        }
    }
}

/// Finding severity, ordered low to high for comparisons (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the compliance score engine (C7); higher severities
    /// subtract more from the base score.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Info => 0.0,
            Severity::Low => 1.0,
            Severity::Medium => 3.0,
            Severity::High => 7.0,
            Severity::Critical => 15.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The already-authenticated caller identity, handed to the core by the
/// (out-of-scope) auth collaborator. The core never validates credentials;
/// it only trusts and scopes by this value (§1 Non-goals, §4.9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_type_round_trips_through_str() {
        for scan_type in ScanType::ALL {
            let parsed: ScanType = scan_type.as_str().parse().unwrap();
            assert_eq!(parsed, scan_type);
        }
    }

    #[test]
    fn unknown_scan_type_is_rejected() {
        let result: Result<ScanType, _> = "spreadsheet".parse();
        assert!(result.is_err());
    }

    #[test]
    fn severity_ordering_is_monotonic_with_weight() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Critical.weight() > Severity::High.weight());
        assert!(Severity::Info.weight() == 0.0);
    }
}
