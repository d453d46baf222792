// Enrichment of changed entities (offline).
//
// Receives the changed identifiers of the latest change set, capped at a
// sample size, and produces enrichment rows from a seed file or from the
// master table. The core never reads these rows back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::store::SnapshotStore;

pub const DEFAULT_ENRICHMENT_LIMIT: usize = 100;
pub const SEED_FILE_NAME: &str = "enrichment_seed.csv";
pub const OUTPUT_FILE_NAME: &str = "enriched_changes.csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRow {
    #[serde(rename = "CIN")]
    pub entity_id: String,
    #[serde(rename = "COMPANY_NAME")]
    pub company_name: String,
    #[serde(rename = "STATE")]
    pub state: String,
    #[serde(rename = "STATUS")]
    pub status: String,
    #[serde(rename = "SOURCE")]
    pub source: String,
    #[serde(rename = "FIELD")]
    pub field: String,
    #[serde(rename = "SOURCE_URL")]
    pub source_url: String,
}

/// Two-digit NIC division → sector label
pub fn sector_for_nic(nic_code: &str) -> Option<&'static str> {
    let division = nic_code.trim().get(0..2)?;
    let sector = match division {
        "10" | "11" => "Manufacturing",
        "46" => "Wholesale Trade",
        "47" => "Retail Trade",
        "62" => "IT Services",
        "63" => "Information Services",
        "64" => "Financial Services",
        "70" => "Management/Consulting",
        "71" => "R&D/Engineering",
        "72" => "R&D/Science",
        "86" => "Healthcare",
        "96" => "Personal Services",
        _ => return None,
    };
    Some(sector)
}

pub struct Enricher {
    seed: Vec<EnrichmentRow>,
    limit: usize,
}

impl Enricher {
    pub fn new(limit: usize) -> Self {
        Enricher {
            seed: Vec::new(),
            limit,
        }
    }

    /// Load seed rows if the file exists; a missing seed file is not an error
    pub fn with_seed_file(mut self, path: &Path) -> Result<Self> {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no enrichment seed file");
            return Ok(self);
        }

        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open enrichment seed: {}", path.display()))?;
        for result in rdr.deserialize() {
            let row: EnrichmentRow = result.context("Failed to deserialize enrichment seed row")?;
            self.seed.push(row);
        }

        tracing::debug!(rows = self.seed.len(), "loaded enrichment seed");
        Ok(self)
    }

    pub fn with_seed_rows(mut self, rows: Vec<EnrichmentRow>) -> Self {
        self.seed = rows;
        self
    }

    /// Enrich up to `limit` identifiers. Seeded ids emit all their seed
    /// rows; others get one synthetic row built from the master table.
    pub fn enrich(&self, changed_ids: &[String], store: &SnapshotStore) -> Result<Vec<EnrichmentRow>> {
        let mut out = Vec::new();

        for id in changed_ids.iter().take(self.limit) {
            let seeded: Vec<&EnrichmentRow> = self.seed.iter().filter(|r| &r.entity_id == id).collect();
            if !seeded.is_empty() {
                out.extend(seeded.into_iter().cloned());
                continue;
            }

            let master = store.find_by_id(id)?;
            let sector = master.as_ref().and_then(|r| sector_for_nic(&r.industry_code));
            let (company_name, state, status) = match master {
                Some(r) => (r.name, r.jurisdiction, r.status),
                None => (String::new(), String::new(), String::new()),
            };

            let field = match sector {
                Some(sector) => format!("Director_Names;Sector={};Company_Type", sector),
                None => "Director_Names;Sector;Company_Type".to_string(),
            };

            out.push(EnrichmentRow {
                entity_id: id.clone(),
                company_name,
                state,
                status,
                source: "Seeded (demo)".to_string(),
                field,
                source_url: "N/A".to_string(),
            });
        }

        tracing::info!(
            requested = changed_ids.len(),
            enriched = changed_ids.len().min(self.limit),
            rows = out.len(),
            "enriched changed entities"
        );

        Ok(out)
    }
}

pub fn write_enrichment_csv(path: &Path, rows: &[EnrichmentRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    if rows.is_empty() {
        wtr.write_record(["CIN", "COMPANY_NAME", "STATE", "STATUS", "SOURCE", "FIELD", "SOURCE_URL"])?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CanonicalRecord;

    fn store_with(ids: &[&str]) -> SnapshotStore {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let records: Vec<CanonicalRecord> = ids
            .iter()
            .map(|id| {
                let mut r = CanonicalRecord::new(*id);
                r.name = format!("{} Pvt Ltd", id);
                r.status = "Active".to_string();
                r.jurisdiction = "Gujarat".to_string();
                r.industry_code = "62011".to_string();
                r
            })
            .collect();
        store.upsert_records(&records, "d1").unwrap();
        store
    }

    #[test]
    fn test_sector_lookup() {
        assert_eq!(sector_for_nic("62011"), Some("IT Services"));
        assert_eq!(sector_for_nic("10"), Some("Manufacturing"));
        assert_eq!(sector_for_nic("99"), None);
        assert_eq!(sector_for_nic("6"), None);
    }

    #[test]
    fn test_synthetic_rows_from_master() {
        let store = store_with(&["A1"]);
        let rows = Enricher::new(10)
            .enrich(&["A1".to_string(), "GONE".to_string()], &store)
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].company_name, "A1 Pvt Ltd");
        assert_eq!(rows[0].state, "Gujarat");
        assert_eq!(rows[0].source, "Seeded (demo)");
        assert_eq!(rows[0].field, "Director_Names;Sector=IT Services;Company_Type");
        assert_eq!(rows[1].company_name, "");
        assert_eq!(rows[1].field, "Director_Names;Sector;Company_Type");
    }

    #[test]
    fn test_seed_rows_take_precedence_and_limit_applies() {
        let store = store_with(&["A1", "B2", "C3"]);
        let seed = vec![
            EnrichmentRow {
                entity_id: "B2".to_string(),
                company_name: "Beta".to_string(),
                state: "Gujarat".to_string(),
                status: "Active".to_string(),
                source: "Registry".to_string(),
                field: "Director_Names=X".to_string(),
                source_url: "https://example.org/b2".to_string(),
            };
            2
        ];

        let ids: Vec<String> = ["B2", "A1", "C3"].iter().map(|s| s.to_string()).collect();
        let rows = Enricher::new(2).with_seed_rows(seed).enrich(&ids, &store).unwrap();

        // two seed rows for B2, one synthetic for A1, C3 beyond the cap
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].source, "Registry");
        assert_eq!(rows[2].entity_id, "A1");
    }

    #[test]
    fn test_seed_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SEED_FILE_NAME);
        let rows = vec![EnrichmentRow {
            entity_id: "A1".to_string(),
            company_name: "Acme".to_string(),
            state: "Delhi".to_string(),
            status: "Active".to_string(),
            source: "Registry".to_string(),
            field: "Sector=IT".to_string(),
            source_url: "N/A".to_string(),
        }];
        write_enrichment_csv(&path, &rows).unwrap();

        let enricher = Enricher::new(5).with_seed_file(&path).unwrap();
        let store = store_with(&[]);
        assert_eq!(enricher.enrich(&["A1".to_string()], &store).unwrap(), rows);

        let missing = Enricher::new(5).with_seed_file(&dir.path().join("nope.csv"));
        assert!(missing.is_ok());
    }
}
