// 🗂️ Consolidator - all jurisdiction extracts for one date → one canonical snapshot
//
// Jurisdictions are visited in configured order, never in data order.
// A later jurisdiction wins when the same identifier shows up twice.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::normalizer::{ColumnMapping, Normalizer, RawExtract};
use crate::record::CanonicalSnapshot;

/// File name of a jurisdiction's extract inside a snapshot-date directory:
/// "Tamil Nadu" → "tamil_nadu.csv"
pub fn extract_file_name(jurisdiction: &str) -> String {
    format!("{}.csv", jurisdiction.to_lowercase().replace(' ', "_"))
}

pub struct Consolidator {
    jurisdictions: Vec<String>,
    default_normalizer: Normalizer,
    overrides: HashMap<String, Normalizer>,
}

impl Consolidator {
    pub fn new(jurisdictions: Vec<String>) -> Self {
        Consolidator {
            jurisdictions,
            default_normalizer: Normalizer::new(),
            overrides: HashMap::new(),
        }
    }

    /// Use a jurisdiction-specific column mapping
    pub fn with_mapping(mut self, jurisdiction: &str, mapping: ColumnMapping) -> Self {
        self.overrides
            .insert(jurisdiction.to_string(), Normalizer::with_mapping(mapping));
        self
    }

    pub fn jurisdictions(&self) -> &[String] {
        &self.jurisdictions
    }

    fn normalizer_for(&self, jurisdiction: &str) -> &Normalizer {
        self.overrides
            .get(jurisdiction)
            .unwrap_or(&self.default_normalizer)
    }

    /// Merge the available extracts into one snapshot.
    ///
    /// A jurisdiction without an extract contributes nothing. Extracts for
    /// jurisdictions outside the configured list are ignored.
    pub fn consolidate(&self, extracts: &[RawExtract]) -> CanonicalSnapshot {
        let mut merged = Vec::new();

        for jurisdiction in &self.jurisdictions {
            // Last extract for a label wins, matching keep-last everywhere else
            let extract = match extracts.iter().rev().find(|e| &e.jurisdiction == jurisdiction) {
                Some(e) => e,
                None => {
                    tracing::debug!(%jurisdiction, "no extract for jurisdiction");
                    continue;
                }
            };

            let normalized = self.normalizer_for(jurisdiction).normalize(extract);
            merged.extend(normalized.into_records());
        }

        for extract in extracts {
            if !self.jurisdictions.contains(&extract.jurisdiction) {
                tracing::warn!(
                    jurisdiction = %extract.jurisdiction,
                    "ignoring extract for unconfigured jurisdiction"
                );
            }
        }

        let concatenated = merged.len();
        let snapshot = CanonicalSnapshot::from_records_keep_last(merged);
        if snapshot.len() < concatenated {
            tracing::warn!(
                duplicates = concatenated - snapshot.len(),
                "identifiers repeated across jurisdictions; later jurisdiction kept"
            );
        }

        snapshot
    }

    /// Paths of the extracts that exist under `snapshot_dir`, in jurisdiction order
    pub fn available_extracts(&self, snapshot_dir: &Path) -> Vec<(String, PathBuf)> {
        self.jurisdictions
            .iter()
            .map(|j| (j.clone(), snapshot_dir.join(extract_file_name(j))))
            .filter(|(_, path)| path.is_file())
            .collect()
    }

    /// Load and consolidate every extract found in one snapshot-date directory.
    /// A missing directory yields an empty snapshot.
    pub fn consolidate_dir(&self, snapshot_dir: &Path) -> Result<CanonicalSnapshot> {
        let mut extracts = Vec::new();
        for (jurisdiction, path) in self.available_extracts(snapshot_dir) {
            extracts.push(RawExtract::from_path(&path, &jurisdiction)?);
        }

        if extracts.is_empty() {
            tracing::warn!(dir = %snapshot_dir.display(), "no extracts found for snapshot");
        }

        Ok(self.consolidate(&extracts))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CANONICAL_COLUMNS;

    fn jurisdictions() -> Vec<String> {
        vec!["Maharashtra".to_string(), "Gujarat".to_string(), "Tamil Nadu".to_string()]
    }

    #[test]
    fn test_extract_file_name() {
        assert_eq!(extract_file_name("Tamil Nadu"), "tamil_nadu.csv");
        assert_eq!(extract_file_name("Delhi"), "delhi.csv");
    }

    #[test]
    fn test_no_extracts_gives_empty_snapshot() {
        let consolidator = Consolidator::new(jurisdictions());
        assert!(consolidator.consolidate(&[]).is_empty());

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("2025-01-01");
        assert!(consolidator.consolidate_dir(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_cross_jurisdiction_duplicate_later_wins() {
        let consolidator = Consolidator::new(jurisdictions());
        // supplied out of order: iteration order is the configured order
        let extracts = vec![
            RawExtract::new("Gujarat", &["CIN", "Company_Name"]).with_row(&["X1", "From Gujarat"]),
            RawExtract::new("Maharashtra", &["CIN", "Company_Name"])
                .with_row(&["X1", "From Maharashtra"])
                .with_row(&["M1", "Mumbai Co"]),
        ];

        let snapshot = consolidator.consolidate(&extracts);
        assert_eq!(snapshot.len(), 2);

        let x1 = snapshot.get("X1").unwrap();
        assert_eq!(x1.name, "From Gujarat");
        assert_eq!(x1.jurisdiction, "Gujarat");
    }

    #[test]
    fn test_unconfigured_jurisdiction_ignored() {
        let consolidator = Consolidator::new(jurisdictions());
        let extracts = vec![RawExtract::new("Kerala", &["CIN"]).with_row(&["K1"])];
        assert!(consolidator.consolidate(&extracts).is_empty());
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let consolidator = Consolidator::new(jurisdictions());
        let extracts = vec![
            RawExtract::new("Tamil Nadu", &["CIN", "Authorized_Capital"])
                .with_row(&["T1", "1,000"])
                .with_row(&["T2", "abc"]),
            RawExtract::new("Maharashtra", &["CIN", "Authorized_Capital"]).with_row(&["M1", "₹50"]),
        ];

        let first = consolidator.consolidate(&extracts).to_csv_bytes().unwrap();
        let second = consolidator.consolidate(&extracts).to_csv_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_consolidate_dir_reads_available_files() {
        let dir = tempfile::tempdir().unwrap();
        let header = CANONICAL_COLUMNS.join(",");
        std::fs::write(
            dir.path().join("tamil_nadu.csv"),
            format!("{}\nt1,Chennai Co,Private,2020-01-01,100,50,Active,62,Addr,RoC-Chennai,Tamil Nadu\n", header),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("maharashtra.csv"),
            format!("{}\nM1,Mumbai Co,Public,2019-05-05,200,200,Dormant,10,Addr,RoC-Mumbai,Maharashtra\n", header),
        )
        .unwrap();

        let consolidator = Consolidator::new(jurisdictions());
        assert_eq!(consolidator.available_extracts(dir.path()).len(), 2);

        let snapshot = consolidator.consolidate_dir(dir.path()).unwrap();
        let ids: Vec<&str> = snapshot.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["M1", "T1"]);
        assert_eq!(snapshot.get("T1").unwrap().authorized_capital, 100.0);
    }
}
