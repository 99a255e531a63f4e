//! Tabular/DB analyzer (§4.2): samples rows under a read budget,
//! runs the text scanner over each cell, and classifies columns by the
//! majority `pii_kind` of their confirmed matches.

use super::text::scan_text;
use crate::registry::PatternRegistry;
use scan_core::model::Finding;
use scan_core::{JobId, RegionTag};
use std::collections::HashMap;

/// Sample-size budget per scan mode (§4.3: FAST/SMART/DEEP differ
/// only in sample size, never in detection logic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScanMode {
    Fast,
    Smart,
    Deep,
}

impl ScanMode {
    pub fn row_budget(&self) -> usize {
        match self {
            ScanMode::Fast => 100,
            ScanMode::Smart => 300,
            ScanMode::Deep => 500,
        }
    }
}

/// Minimum confirmed matches before a column is claimed for a `pii_kind`
/// (§4.2).
pub const MIN_CONFIRMED_MATCHES: usize = 3;

#[derive(Debug, Clone)]
pub struct ColumnClassification {
    pub column: String,
    pub majority_pii_kind: Option<String>,
    pub confirmed_matches: usize,
    pub sampled_cells: usize,
}

/// A sampled row as `column_name -> cell_text`; the concrete database
/// scanner is responsible for stringifying whatever the driver returns.
pub type SampledRow = HashMap<String, String>;

/// Runs the text scanner over every sampled cell and classifies each column
/// by the `pii_kind` that appears in at least [`MIN_CONFIRMED_MATCHES`] cells
/// and outnumbers every other kind in that column.
pub fn classify_table(
    registry: &PatternRegistry,
    job_id: JobId,
    table: &str,
    rows: &[SampledRow],
    region_set: &[RegionTag],
) -> (Vec<Finding>, Vec<ColumnClassification>) {
    let mut findings = Vec::new();
    let mut per_column_counts: HashMap<String, HashMap<String, usize>> = HashMap::new();
    let mut per_column_cells: HashMap<String, usize> = HashMap::new();

    for row in rows {
        for (column, cell) in row {
            *per_column_cells.entry(column.clone()).or_insert(0) += 1;
            if cell.is_empty() {
                continue;
            }
            let location = format!("{table}.{column}");
            let cell_findings = scan_text(registry, job_id, &location, cell, region_set);
            for finding in &cell_findings {
                if let Some(pii_kind) = &finding.pii_kind {
                    *per_column_counts
                        .entry(column.clone())
                        .or_default()
                        .entry(pii_kind.clone())
                        .or_insert(0) += 1;
                }
            }
            findings.extend(cell_findings);
        }
    }

    let mut classifications: Vec<ColumnClassification> = per_column_cells
        .into_iter()
        .map(|(column, sampled_cells)| {
            let counts = per_column_counts.get(&column);
            let best = counts.and_then(|counts| {
                counts
                    .iter()
                    .max_by_key(|(_, count)| **count)
                    .filter(|(_, count)| **count >= MIN_CONFIRMED_MATCHES)
            });
            ColumnClassification {
                majority_pii_kind: best.map(|(kind, _)| kind.clone()),
                confirmed_matches: best.map(|(_, count)| *count).unwrap_or(0),
                column,
                sampled_cells,
            }
        })
        .collect();
    classifications.sort_by(|a, b| a.column.cmp(&b.column));

    (findings, classifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PatternRegistry;

    fn row(email: &str) -> SampledRow {
        let mut row = HashMap::new();
        row.insert("email_col".to_string(), email.to_string());
        row.insert("notes".to_string(), "nothing interesting here".to_string());
        row
    }

    #[test]
    fn column_needs_minimum_confirmed_matches_to_be_classified() {
        let registry = PatternRegistry::with_defaults();
        let region = vec![RegionTag::from("NL")];
        let rows = vec![row("a@b.com"), row("c@d.com")];
        let (_, classifications) = classify_table(&registry, JobId::new(), "users", &rows, &region);
        let email_col = classifications.iter().find(|c| c.column == "email_col").unwrap();
        assert!(email_col.majority_pii_kind.is_none());
    }

    #[test]
    fn column_classified_once_it_crosses_the_threshold() {
        let registry = PatternRegistry::with_defaults();
        let region = vec![RegionTag::from("NL")];
        let rows = vec![row("a@b.com"), row("c@d.com"), row("e@f.com")];
        let (_, classifications) = classify_table(&registry, JobId::new(), "users", &rows, &region);
        let email_col = classifications.iter().find(|c| c.column == "email_col").unwrap();
        assert_eq!(email_col.majority_pii_kind.as_deref(), Some("email"));
        assert_eq!(email_col.confirmed_matches, 3);
    }

    #[test]
    fn fast_smart_deep_only_differ_in_row_budget() {
        assert_eq!(ScanMode::Fast.row_budget(), 100);
        assert_eq!(ScanMode::Smart.row_budget(), 300);
        assert_eq!(ScanMode::Deep.row_budget(), 500);
    }
}
