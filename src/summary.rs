// 📝 Daily Summary - counts and notable status changes for one date's change set
//
// Derived purely from the change records; reads nothing else.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::record::{CanonicalField, ChangeKind, ChangeRecord, RegistryStatus};

pub const DEFAULT_NOTABLE_CAP: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: String,
    pub new_incorporations: usize,
    pub deregistered: usize,
    pub updated_records: usize,
    /// Distinct ids with a status field update, first-seen order, capped
    #[serde(rename = "notable_status_changes_CINs")]
    pub notable_status_changes: Vec<String>,
    /// Status updates counted by the new status' reporting label
    #[serde(default)]
    pub status_transitions: BTreeMap<String, usize>,
}

impl DailySummary {
    pub fn from_changes(date: &str, changes: &[ChangeRecord], notable_cap: usize) -> Self {
        let count = |kind: ChangeKind| changes.iter().filter(|c| c.change_kind == kind).count();

        let status_updates: Vec<&ChangeRecord> = changes
            .iter()
            .filter(|c| c.field == Some(CanonicalField::Status))
            .collect();

        let mut status_transitions = BTreeMap::new();
        for change in &status_updates {
            let label = RegistryStatus::classify(change.new_value.as_deref().unwrap_or("")).label();
            *status_transitions.entry(label.to_string()).or_insert(0) += 1;
        }

        let mut seen = BTreeSet::new();
        let notable_status_changes = status_updates
            .iter()
            .filter(|c| seen.insert(c.entity_id.as_str()))
            .take(notable_cap)
            .map(|c| c.entity_id.clone())
            .collect();

        DailySummary {
            date: date.to_string(),
            new_incorporations: count(ChangeKind::NewEntity),
            deregistered: count(ChangeKind::Removed),
            updated_records: count(ChangeKind::FieldUpdate),
            notable_status_changes,
            status_transitions,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Daily Summary ({})", self.date);
        let _ = writeln!(out);
        let _ = writeln!(out, "New incorporations: {}", self.new_incorporations);
        let _ = writeln!(out, "Deregistered: {}", self.deregistered);
        let _ = writeln!(out, "Updated records: {}", self.updated_records);
        if !self.notable_status_changes.is_empty() {
            let _ = writeln!(
                out,
                "Notable CINs with status changes: {}",
                self.notable_status_changes.join(", ")
            );
        }
        for (label, count) in &self.status_transitions {
            let _ = writeln!(out, "Moved to {}: {}", label, count);
        }
        out
    }

    /// Write `daily_summary_<date>.json` and `.txt` into `dir`
    pub fn write(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let json_path = dir.join(format!("daily_summary_{}.json", self.date));
        let txt_path = dir.join(format!("daily_summary_{}.txt", self.date));

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
        std::fs::write(&txt_path, self.render_text())
            .with_context(|| format!("Failed to write {}", txt_path.display()))?;

        Ok((json_path, txt_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_update(id: &str) -> ChangeRecord {
        ChangeRecord::field_update(
            id,
            CanonicalField::Status,
            "Active".to_string(),
            "Strike Off".to_string(),
            "2025-10-19",
        )
    }

    #[test]
    fn test_counts_and_notable_ids() {
        let changes = vec![
            ChangeRecord::new_entity("N1", "2025-10-19"),
            ChangeRecord::removed("R1", "2025-10-19"),
            ChangeRecord::removed("R2", "2025-10-19"),
            status_update("S1"),
            ChangeRecord::field_update(
                "S1",
                CanonicalField::AuthorizedCapital,
                "1.0".to_string(),
                "2.0".to_string(),
                "2025-10-19",
            ),
            status_update("S2"),
        ];

        let summary = DailySummary::from_changes("2025-10-19", &changes, DEFAULT_NOTABLE_CAP);
        assert_eq!(summary.new_incorporations, 1);
        assert_eq!(summary.deregistered, 2);
        assert_eq!(summary.updated_records, 3);
        assert_eq!(summary.notable_status_changes, vec!["S1", "S2"]);
        assert_eq!(summary.status_transitions.get("Strike Off"), Some(&2));
    }

    #[test]
    fn test_status_transitions_use_reporting_labels() {
        let update = |id: &str, new: &str| {
            ChangeRecord::field_update(id, CanonicalField::Status, "Active".to_string(), new.to_string(), "d")
        };
        let changes = vec![
            update("A1", "STRIKE OFF"),
            update("A2", "Struck-Off"),
            update("A3", "dormant"),
            update("A4", "Under Liquidation"),
        ];

        let summary = DailySummary::from_changes("d", &changes, 20);
        assert_eq!(summary.status_transitions.get("Strike Off"), Some(&2));
        assert_eq!(summary.status_transitions.get("Dormant"), Some(&1));
        assert_eq!(summary.status_transitions.get("Other"), Some(&1));
        assert!(summary.render_text().contains("Moved to Strike Off: 2"));
    }

    #[test]
    fn test_notable_cap() {
        let changes: Vec<ChangeRecord> = (0..30).map(|i| status_update(&format!("S{:02}", i))).collect();
        let summary = DailySummary::from_changes("d", &changes, 20);
        assert_eq!(summary.notable_status_changes.len(), 20);
        assert_eq!(summary.notable_status_changes[0], "S00");
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let summary = DailySummary::from_changes("2025-10-19", &[status_update("S1")], 20);
        let (json_path, txt_path) = summary.write(dir.path()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json["updated_records"], 1);
        assert_eq!(json["notable_status_changes_CINs"][0], "S1");

        let text = std::fs::read_to_string(txt_path).unwrap();
        assert!(text.starts_with("Daily Summary (2025-10-19)"));
        assert!(text.contains("Notable CINs with status changes: S1"));
    }
}
