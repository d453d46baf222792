// 🔎 Change Detector - previous vs current canonical snapshot → change records
//
// Key-based set reconciliation:
//   new     = current_ids - previous_ids
//   removed = previous_ids - current_ids
//   common  = previous_ids ∩ current_ids
//
// Output order is fully determined by the data: new ids (sorted), then
// removed ids (sorted), then field updates by sorted id and declared field
// order. Input row order never matters.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::normalizer::normalize_id;
use crate::record::{CanonicalField, CanonicalRecord, CanonicalSnapshot, ChangeKind, ChangeRecord};

// ============================================================================
// CHANGE SET
// ============================================================================

/// Change records for one observed date plus the identifier partition
/// they were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub observed_date: String,
    pub records: Vec<ChangeRecord>,
    pub new_ids: BTreeSet<String>,
    pub removed_ids: BTreeSet<String>,
    pub common_ids: BTreeSet<String>,
    /// No previous snapshot existed; nothing was diffed
    pub seeded: bool,
}

impl ChangeSet {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.records.iter().filter(|r| r.change_kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct identifiers with at least one change, first-seen order
    pub fn changed_ids(&self) -> Vec<String> {
        changed_ids(&self.records)
    }
}

/// Distinct entity ids of `records`, first-seen order
pub fn changed_ids(records: &[ChangeRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.entity_id.as_str()))
        .map(|r| r.entity_id.clone())
        .collect()
}

// ============================================================================
// CHANGE DETECTOR
// ============================================================================

pub struct ChangeDetector {
    /// Fields compared for common identifiers, in emission order
    tracked_fields: Vec<CanonicalField>,
}

impl ChangeDetector {
    /// Track every canonical field except the address
    pub fn new() -> Self {
        ChangeDetector {
            tracked_fields: CanonicalField::tracked(),
        }
    }

    pub fn tracked_fields(&self) -> &[CanonicalField] {
        &self.tracked_fields
    }

    /// Diff `current` against `previous` as observed on `observed_date`.
    ///
    /// Without a previous snapshot this is the seed: no records are produced
    /// and every current id lands in `new_ids`.
    pub fn detect(
        &self,
        previous: Option<&CanonicalSnapshot>,
        current: &CanonicalSnapshot,
        observed_date: &str,
    ) -> ChangeSet {
        let curr = keyed(current);

        let previous = match previous {
            Some(p) => p,
            None => {
                tracing::info!(date = observed_date, records = curr.len(), "seed snapshot, skipping diff");
                return ChangeSet {
                    observed_date: observed_date.to_string(),
                    records: Vec::new(),
                    new_ids: curr.keys().cloned().collect(),
                    removed_ids: BTreeSet::new(),
                    common_ids: BTreeSet::new(),
                    seeded: true,
                };
            }
        };

        let prev = keyed(previous);

        let prev_ids: BTreeSet<String> = prev.keys().cloned().collect();
        let curr_ids: BTreeSet<String> = curr.keys().cloned().collect();

        let new_ids: BTreeSet<String> = curr_ids.difference(&prev_ids).cloned().collect();
        let removed_ids: BTreeSet<String> = prev_ids.difference(&curr_ids).cloned().collect();
        let common_ids: BTreeSet<String> = prev_ids.intersection(&curr_ids).cloned().collect();

        let mut records = Vec::new();

        // BTreeSet iteration is sorted
        for id in &new_ids {
            records.push(ChangeRecord::new_entity(id, observed_date));
        }

        // Removed entities carry no field snapshot
        for id in &removed_ids {
            records.push(ChangeRecord::removed(id, observed_date));
        }

        for id in &common_ids {
            let (Some(before), Some(after)) = (prev.get(id), curr.get(id)) else {
                continue;
            };
            self.diff_fields(id, before, after, observed_date, &mut records);
        }

        let change_set = ChangeSet {
            observed_date: observed_date.to_string(),
            records,
            new_ids,
            removed_ids,
            common_ids,
            seeded: false,
        };

        tracing::info!(
            date = observed_date,
            new = change_set.new_ids.len(),
            removed = change_set.removed_ids.len(),
            updates = change_set.count(ChangeKind::FieldUpdate),
            "detected changes"
        );

        change_set
    }

    /// String-equality comparison of each tracked field's representation
    fn diff_fields(
        &self,
        id: &str,
        before: &CanonicalRecord,
        after: &CanonicalRecord,
        observed_date: &str,
        out: &mut Vec<ChangeRecord>,
    ) {
        for field in &self.tracked_fields {
            // both sides are keyed by the same re-normalized id
            if *field == CanonicalField::Id {
                continue;
            }
            let old_value = before.field_repr(*field);
            let new_value = after.field_repr(*field);
            if old_value != new_value {
                out.push(ChangeRecord::field_update(
                    id,
                    *field,
                    old_value,
                    new_value,
                    observed_date,
                ));
            }
        }
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Key records by re-normalized identifier (idempotent on clean ids).
/// A collision after re-normalization keeps the later record.
fn keyed(snapshot: &CanonicalSnapshot) -> BTreeMap<String, &CanonicalRecord> {
    snapshot
        .records()
        .iter()
        .map(|r| (normalize_id(&r.id), r))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
