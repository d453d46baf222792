// 🎲 Synthetic snapshot generator - demo extracts in the snapshot layout
//
// Seeded RNG, so the same calls always produce the same files.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::path::Path;

use crate::consolidator::extract_file_name;
use crate::normalizer::{Normalizer, RawExtract};
use crate::record::CanonicalRecord;

pub const DEFAULT_SEED: u64 = 42;

const CLASSES: [&str; 3] = ["Private", "Public", "Private (Ltd by shares)"];
const STATUSES: [&str; 4] = ["Active", "Strike Off", "Amalgamated", "Dormant"];
// Active weighted 5:1:1:1
const WEIGHTED_STATUSES: [&str; 8] = [
    "Active", "Active", "Active", "Active", "Active", "Strike Off", "Amalgamated", "Dormant",
];
const NIC_CODES: [&str; 12] = ["10", "11", "46", "47", "62", "63", "64", "70", "71", "72", "86", "96"];
const NAME_WORDS: [&str; 7] = ["Tech", "Agro", "Foods", "Retail", "Fin", "Info", "Consult"];
const AUTHORIZED: [f64; 7] = [1e5, 2e5, 5e5, 1e6, 2e6, 5e6, 1e7];
const PAID_RATIOS: [f64; 3] = [0.5, 0.8, 1.0];
const CAPITAL_FACTORS: [f64; 3] = [0.8, 1.2, 1.5];
const LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Ratios applied to each jurisdiction when deriving the next day's snapshot
#[derive(Debug, Clone, Copy)]
pub struct MutationRatios {
    pub add: f64,
    pub update: f64,
    pub delete: f64,
}

impl Default for MutationRatios {
    fn default() -> Self {
        MutationRatios {
            add: 0.18,
            update: 0.20,
            delete: 0.06,
        }
    }
}

fn registering_office(jurisdiction: &str) -> String {
    match jurisdiction {
        "Maharashtra" => "RoC-Mumbai".to_string(),
        "Gujarat" => "RoC-Ahmedabad".to_string(),
        "Delhi" => "RoC-Delhi".to_string(),
        "Tamil Nadu" => "RoC-Chennai".to_string(),
        "Karnataka" => "RoC-Bangalore".to_string(),
        other => format!("RoC-{}", other),
    }
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

pub struct SnapshotGenerator {
    rng: StdRng,
    jurisdictions: Vec<String>,
}

impl SnapshotGenerator {
    pub fn new(jurisdictions: Vec<String>, seed: u64) -> Self {
        SnapshotGenerator {
            rng: StdRng::seed_from_u64(seed),
            jurisdictions,
        }
    }

    /// Rough registry-style identifier: U + 2 letters + 5-digit sequence +
    /// 2 letters + 6 random digits
    fn make_id(&mut self, seq: usize, state_idx: usize) -> String {
        let letter = |i: usize| LETTERS[i % 26] as char;
        format!(
            "U{}{}{:05}{}{}{}",
            letter(state_idx),
            letter(state_idx + 5),
            seq,
            letter(state_idx + 8),
            letter(state_idx + 13),
            self.rng.gen_range(100_000..=999_999)
        )
    }

    fn company(&mut self, seq: usize, jurisdiction: &str, state_idx: usize) -> CanonicalRecord {
        let id = self.make_id(seq, state_idx);
        let prefix: String = jurisdiction.chars().take(3).collect::<String>().to_uppercase();

        let mut record = CanonicalRecord::new(id);
        record.name = format!("{}-{}-{} Pvt Ltd", prefix, pick(&mut self.rng, &NAME_WORDS), seq);
        record.class = pick(&mut self.rng, &CLASSES).to_string();
        record.incorporation_date = format!(
            "{}-{:02}-{:02}",
            self.rng.gen_range(2005..=2025),
            self.rng.gen_range(1..=12),
            self.rng.gen_range(1..=28)
        );
        record.authorized_capital = *pick(&mut self.rng, &AUTHORIZED);
        record.paid_up_capital = record.authorized_capital * pick(&mut self.rng, &PAID_RATIOS);
        record.status = pick(&mut self.rng, &WEIGHTED_STATUSES).to_string();
        record.industry_code = pick(&mut self.rng, &NIC_CODES).to_string();
        record.address = format!("{}, {}", self.rng.gen_range(1..=200), jurisdiction);
        record.registering_office = registering_office(jurisdiction);
        record.jurisdiction = jurisdiction.to_string();
        record
    }

    /// Write a fresh snapshot with `per_state` companies per jurisdiction.
    /// Returns the number of rows written.
    pub fn write_seed(&mut self, dir: &Path, per_state: usize) -> Result<usize> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let jurisdictions = self.jurisdictions.clone();
        let mut written = 0;
        for (state_idx, jurisdiction) in jurisdictions.iter().enumerate() {
            let rows: Vec<CanonicalRecord> = (0..per_state)
                .map(|j| self.company(1 + j, jurisdiction, state_idx))
                .collect();
            write_extract(&dir.join(extract_file_name(jurisdiction)), &rows)?;
            written += rows.len();
        }

        tracing::info!(dir = %dir.display(), rows = written, "generated seed snapshot");
        Ok(written)
    }

    /// Derive the next snapshot from `prev_dir`: delete, update (status flip
    /// or authorized capital rescale), then add companies.
    pub fn write_mutation(&mut self, prev_dir: &Path, new_dir: &Path, ratios: MutationRatios) -> Result<usize> {
        std::fs::create_dir_all(new_dir)
            .with_context(|| format!("Failed to create directory: {}", new_dir.display()))?;

        let jurisdictions = self.jurisdictions.clone();
        let normalizer = Normalizer::new();
        let mut written = 0;

        for (state_idx, jurisdiction) in jurisdictions.iter().enumerate() {
            let file_name = extract_file_name(jurisdiction);
            let prev_path = prev_dir.join(&file_name);
            if !prev_path.is_file() {
                continue;
            }

            let previous = normalizer
                .normalize(&RawExtract::from_path(&prev_path, jurisdiction)?)
                .into_records();
            let original_len = previous.len();

            // Delete
            let n_del = scaled(original_len, ratios.delete).min(original_len);
            let to_delete: HashSet<String> = previous
                .choose_multiple(&mut self.rng, n_del)
                .map(|r| r.id.clone())
                .collect();
            let mut rows: Vec<CanonicalRecord> = previous
                .iter()
                .filter(|r| !to_delete.contains(&r.id))
                .cloned()
                .collect();

            // Update
            let n_upd = scaled(rows.len(), ratios.update).min(rows.len());
            let to_update: HashSet<String> = rows
                .choose_multiple(&mut self.rng, n_upd)
                .map(|r| r.id.clone())
                .collect();
            for row in rows.iter_mut().filter(|r| to_update.contains(&r.id)) {
                if self.rng.gen_bool(0.5) {
                    row.status = pick(&mut self.rng, &STATUSES).to_string();
                } else {
                    row.authorized_capital *= pick(&mut self.rng, &CAPITAL_FACTORS);
                }
            }

            // Add
            let base_seq = next_sequence(&previous);
            let n_add = scaled(original_len, ratios.add);
            for j in 0..n_add {
                rows.push(self.company(base_seq + j, jurisdiction, state_idx));
            }

            write_extract(&new_dir.join(&file_name), &rows)?;
            written += rows.len();
        }

        tracing::info!(dir = %new_dir.display(), rows = written, "generated mutated snapshot");
        Ok(written)
    }
}

/// `len * ratio`, at least one
fn scaled(len: usize, ratio: f64) -> usize {
    ((len as f64 * ratio) as usize).max(1)
}

/// One past the largest 5-digit sequence embedded in the identifiers
fn next_sequence(records: &[CanonicalRecord]) -> usize {
    records
        .iter()
        .filter_map(|r| r.id.get(3..8))
        .filter_map(|digits| digits.parse::<usize>().ok())
        .max()
        .map(|max| max + 1)
        .unwrap_or(10_000)
}

fn write_extract(path: &Path, rows: &[CanonicalRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create extract: {}", path.display()))?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_detector::ChangeDetector;
    use crate::consolidator::Consolidator;
    use crate::record::ChangeKind;

    fn jurisdictions() -> Vec<String> {
        vec!["Delhi".to_string(), "Tamil Nadu".to_string()]
    }

    #[test]
    fn test_seed_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut generator = SnapshotGenerator::new(jurisdictions(), DEFAULT_SEED);
        assert_eq!(generator.write_seed(dir.path(), 25).unwrap(), 50);

        let snapshot = Consolidator::new(jurisdictions()).consolidate_dir(dir.path()).unwrap();
        assert_eq!(snapshot.len(), 50);

        let first = &snapshot.records()[0];
        assert!(first.id.starts_with("UAF00001IN"));
        assert_eq!(first.registering_office, "RoC-Delhi");
        assert!(first.name.starts_with("DEL-"));
        assert!(first.authorized_capital > 0.0);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        SnapshotGenerator::new(jurisdictions(), 7).write_seed(a.path(), 10).unwrap();
        SnapshotGenerator::new(jurisdictions(), 7).write_seed(b.path(), 10).unwrap();

        let read = |p: &Path| std::fs::read(p.join("tamil_nadu.csv")).unwrap();
        assert_eq!(read(a.path()), read(b.path()));
    }

    #[test]
    fn test_mutation_produces_every_change_kind() {
        let root = tempfile::tempdir().unwrap();
        let day1 = root.path().join("d1");
        let day2 = root.path().join("d2");

        let mut generator = SnapshotGenerator::new(jurisdictions(), DEFAULT_SEED);
        generator.write_seed(&day1, 100).unwrap();
        generator.write_mutation(&day1, &day2, MutationRatios::default()).unwrap();

        let consolidator = Consolidator::new(jurisdictions());
        let previous = consolidator.consolidate_dir(&day1).unwrap();
        let current = consolidator.consolidate_dir(&day2).unwrap();
        let changes = ChangeDetector::new().detect(Some(&previous), &current, "d2");

        // 6 deleted and 18 added per jurisdiction
        assert_eq!(changes.count(ChangeKind::Removed), 12);
        assert_eq!(changes.count(ChangeKind::NewEntity), 36);
        assert!(changes.count(ChangeKind::FieldUpdate) > 0);
    }

    #[test]
    fn test_next_sequence() {
        let records = vec![CanonicalRecord::new("UAF00120IN123456"), CanonicalRecord::new("x")];
        assert_eq!(next_sequence(&records), 121);
        assert_eq!(next_sequence(&[]), 10_000);
    }
}
