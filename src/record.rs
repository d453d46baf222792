// 🧾 Canonical Records - the fixed entity schema shared by every stage
// Canonical records, change records, and the canonical snapshot container

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::LedgerError;

// ============================================================================
// CANONICAL FIELDS
// ============================================================================

/// External column names, in canonical order.
/// Used for raw extract headers, the master CSV, SQLite columns and
/// the `field` value of field-update change records.
pub const CANONICAL_COLUMNS: [&str; 11] = [
    "CIN",
    "Company_Name",
    "Company_Class",
    "Date_of_Incorporation",
    "Authorized_Capital",
    "Paidup_Capital",
    "Company_Status",
    "NIC_Code",
    "Registered_Address",
    "RoC",
    "State",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalField {
    #[serde(rename = "CIN")]
    Id,
    #[serde(rename = "Company_Name")]
    Name,
    #[serde(rename = "Company_Class")]
    Class,
    #[serde(rename = "Date_of_Incorporation")]
    IncorporationDate,
    #[serde(rename = "Authorized_Capital")]
    AuthorizedCapital,
    #[serde(rename = "Paidup_Capital")]
    PaidUpCapital,
    #[serde(rename = "Company_Status")]
    Status,
    #[serde(rename = "NIC_Code")]
    IndustryCode,
    #[serde(rename = "Registered_Address")]
    Address,
    #[serde(rename = "RoC")]
    RegisteringOffice,
    #[serde(rename = "State")]
    Jurisdiction,
}

impl CanonicalField {
    /// Every canonical field, in canonical column order
    pub const ALL: [CanonicalField; 11] = [
        CanonicalField::Id,
        CanonicalField::Name,
        CanonicalField::Class,
        CanonicalField::IncorporationDate,
        CanonicalField::AuthorizedCapital,
        CanonicalField::PaidUpCapital,
        CanonicalField::Status,
        CanonicalField::IndustryCode,
        CanonicalField::Address,
        CanonicalField::RegisteringOffice,
        CanonicalField::Jurisdiction,
    ];

    /// External column name for this field
    pub fn column(&self) -> &'static str {
        match self {
            CanonicalField::Id => "CIN",
            CanonicalField::Name => "Company_Name",
            CanonicalField::Class => "Company_Class",
            CanonicalField::IncorporationDate => "Date_of_Incorporation",
            CanonicalField::AuthorizedCapital => "Authorized_Capital",
            CanonicalField::PaidUpCapital => "Paidup_Capital",
            CanonicalField::Status => "Company_Status",
            CanonicalField::IndustryCode => "NIC_Code",
            CanonicalField::Address => "Registered_Address",
            CanonicalField::RegisteringOffice => "RoC",
            CanonicalField::Jurisdiction => "State",
        }
    }

    pub fn from_column(column: &str) -> Option<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .find(|f| f.column() == column)
    }

    /// Capital fields hold floats; everything else is text
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            CanonicalField::AuthorizedCapital | CanonicalField::PaidUpCapital
        )
    }

    /// Address is excluded from change tracking: formatting-only
    /// differences would otherwise flood the ledger.
    pub fn is_tracked(&self) -> bool {
        *self != CanonicalField::Address
    }

    /// Tracked fields in declared (canonical) order
    pub fn tracked() -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| f.is_tracked())
            .collect()
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// ============================================================================
// REGISTRY STATUS (open domain)
// ============================================================================

/// Known status vocabulary used for reporting.
///
/// Statuses stay open strings on the record itself; this only classifies
/// them. Anything unrecognised lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryStatus {
    Active,
    StruckOff,
    Amalgamated,
    Dormant,
    Other,
}

impl RegistryStatus {
    pub fn classify(raw: &str) -> RegistryStatus {
        let key: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "active" => RegistryStatus::Active,
            "strikeoff" | "struckoff" => RegistryStatus::StruckOff,
            "amalgamated" => RegistryStatus::Amalgamated,
            "dormant" => RegistryStatus::Dormant,
            _ => RegistryStatus::Other,
        }
    }

    /// Label as it appears in registry exports
    pub fn label(&self) -> &'static str {
        match self {
            RegistryStatus::Active => "Active",
            RegistryStatus::StruckOff => "Strike Off",
            RegistryStatus::Amalgamated => "Amalgamated",
            RegistryStatus::Dormant => "Dormant",
            RegistryStatus::Other => "Other",
        }
    }
}

// ============================================================================
// CANONICAL RECORD
// ============================================================================

/// One registry entity in the canonical schema, keyed by `id`.
///
/// Capital values are always finite and non-negative; the normalizer
/// coerces anything unparsable to `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    #[serde(rename = "CIN")]
    pub id: String,

    #[serde(rename = "Company_Name")]
    pub name: String,

    #[serde(rename = "Company_Class")]
    pub class: String,

    /// Kept as received; see `normalizer::parse_incorporation_date`
    #[serde(rename = "Date_of_Incorporation")]
    pub incorporation_date: String,

    #[serde(rename = "Authorized_Capital")]
    pub authorized_capital: f64,

    #[serde(rename = "Paidup_Capital")]
    pub paid_up_capital: f64,

    #[serde(rename = "Company_Status")]
    pub status: String,

    #[serde(rename = "NIC_Code")]
    pub industry_code: String,

    #[serde(rename = "Registered_Address")]
    pub address: String,

    #[serde(rename = "RoC")]
    pub registering_office: String,

    /// Set from the source partition, never from row content
    #[serde(rename = "State")]
    pub jurisdiction: String,
}

impl CanonicalRecord {
    /// Record with every non-key field at its neutral value
    pub fn new(id: impl Into<String>) -> Self {
        CanonicalRecord {
            id: id.into(),
            name: String::new(),
            class: String::new(),
            incorporation_date: String::new(),
            authorized_capital: 0.0,
            paid_up_capital: 0.0,
            status: String::new(),
            industry_code: String::new(),
            address: String::new(),
            registering_office: String::new(),
            jurisdiction: String::new(),
        }
    }

    /// String representation used for change detection and the ledger.
    ///
    /// Floats render shortest round-trip with a fractional part, so equal
    /// values always compare equal (`100000.0`).
    pub fn field_repr(&self, field: CanonicalField) -> String {
        match field {
            CanonicalField::Id => self.id.clone(),
            CanonicalField::Name => self.name.clone(),
            CanonicalField::Class => self.class.clone(),
            CanonicalField::IncorporationDate => self.incorporation_date.clone(),
            CanonicalField::AuthorizedCapital => format_capital(self.authorized_capital),
            CanonicalField::PaidUpCapital => format_capital(self.paid_up_capital),
            CanonicalField::Status => self.status.clone(),
            CanonicalField::IndustryCode => self.industry_code.clone(),
            CanonicalField::Address => self.address.clone(),
            CanonicalField::RegisteringOffice => self.registering_office.clone(),
            CanonicalField::Jurisdiction => self.jurisdiction.clone(),
        }
    }

    /// Set a text field. Numeric fields go through `set_capital`.
    pub fn set_text(&mut self, field: CanonicalField, value: String) {
        match field {
            CanonicalField::Id => self.id = value,
            CanonicalField::Name => self.name = value,
            CanonicalField::Class => self.class = value,
            CanonicalField::IncorporationDate => self.incorporation_date = value,
            CanonicalField::Status => self.status = value,
            CanonicalField::IndustryCode => self.industry_code = value,
            CanonicalField::Address => self.address = value,
            CanonicalField::RegisteringOffice => self.registering_office = value,
            CanonicalField::Jurisdiction => self.jurisdiction = value,
            CanonicalField::AuthorizedCapital | CanonicalField::PaidUpCapital => {}
        }
    }

    pub fn set_capital(&mut self, field: CanonicalField, value: f64) {
        match field {
            CanonicalField::AuthorizedCapital => self.authorized_capital = value,
            CanonicalField::PaidUpCapital => self.paid_up_capital = value,
            _ => {}
        }
    }

    pub fn registry_status(&self) -> RegistryStatus {
        RegistryStatus::classify(&self.status)
    }
}

pub fn format_capital(value: f64) -> String {
    format!("{:?}", value)
}

// ============================================================================
// CHANGE RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "New Incorporation")]
    NewEntity,
    #[serde(rename = "Deregistered")]
    Removed,
    #[serde(rename = "Field Update")]
    FieldUpdate,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::NewEntity => "New Incorporation",
            ChangeKind::Removed => "Deregistered",
            ChangeKind::FieldUpdate => "Field Update",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New Incorporation" => Ok(ChangeKind::NewEntity),
            "Deregistered" => Ok(ChangeKind::Removed),
            "Field Update" => Ok(ChangeKind::FieldUpdate),
            other => Err(LedgerError::UnknownValue {
                kind: "change kind",
                value: other.to_string(),
            }),
        }
    }
}

/// One detected difference between two successive canonical snapshots.
///
/// `field`, `old_value` and `new_value` are populated only for
/// `ChangeKind::FieldUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "CIN")]
    pub entity_id: String,

    #[serde(rename = "Change_Type")]
    pub change_kind: ChangeKind,

    #[serde(rename = "Field_Changed")]
    pub field: Option<CanonicalField>,

    #[serde(rename = "Old_Value")]
    pub old_value: Option<String>,

    #[serde(rename = "New_Value")]
    pub new_value: Option<String>,

    #[serde(rename = "Date")]
    pub observed_date: String,
}

impl ChangeRecord {
    pub fn new_entity(entity_id: &str, observed_date: &str) -> Self {
        ChangeRecord {
            entity_id: entity_id.to_string(),
            change_kind: ChangeKind::NewEntity,
            field: None,
            old_value: None,
            new_value: None,
            observed_date: observed_date.to_string(),
        }
    }

    pub fn removed(entity_id: &str, observed_date: &str) -> Self {
        ChangeRecord {
            entity_id: entity_id.to_string(),
            change_kind: ChangeKind::Removed,
            field: None,
            old_value: None,
            new_value: None,
            observed_date: observed_date.to_string(),
        }
    }

    pub fn field_update(
        entity_id: &str,
        field: CanonicalField,
        old_value: String,
        new_value: String,
        observed_date: &str,
    ) -> Self {
        ChangeRecord {
            entity_id: entity_id.to_string(),
            change_kind: ChangeKind::FieldUpdate,
            field: Some(field),
            old_value: Some(old_value),
            new_value: Some(new_value),
            observed_date: observed_date.to_string(),
        }
    }
}

/// Write change records as CSV (one header row, ledger column names)
pub fn write_changes_csv(path: &Path, changes: &[ChangeRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create change log: {}", path.display()))?;

    if changes.is_empty() {
        wtr.write_record(["CIN", "Change_Type", "Field_Changed", "Old_Value", "New_Value", "Date"])?;
    }
    for change in changes {
        wtr.serialize(change)?;
    }
    wtr.flush()?;

    Ok(())
}

pub fn read_changes_csv(path: &Path) -> Result<Vec<ChangeRecord>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open change log: {}", path.display()))?;

    let mut changes = Vec::new();
    for result in rdr.deserialize() {
        let mut change: ChangeRecord = result.context("Failed to deserialize change record")?;
        // An empty cell reads back as None; field updates always carry both values
        if change.change_kind == ChangeKind::FieldUpdate {
            change.old_value.get_or_insert_with(String::new);
            change.new_value.get_or_insert_with(String::new);
        }
        changes.push(change);
    }

    Ok(changes)
}

// ============================================================================
// CANONICAL SNAPSHOT
// ============================================================================

/// The complete, deduplicated record set for one snapshot date.
///
/// Identifiers are unique. Record order is the order of each identifier's
/// last occurrence in the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalSnapshot {
    records: Vec<CanonicalRecord>,
}

impl CanonicalSnapshot {
    pub fn empty() -> Self {
        CanonicalSnapshot::default()
    }

    /// Deduplicate by identifier, keep-last.
    ///
    /// Ordered fold: remember the position of each identifier's last
    /// occurrence, then keep only the record at that position.
    pub fn from_records_keep_last(records: Vec<CanonicalRecord>) -> Self {
        let mut last_seen: HashMap<String, usize> = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            last_seen.insert(record.id.clone(), idx);
        }

        let records = records
            .into_iter()
            .enumerate()
            .filter(|(idx, record)| last_seen.get(&record.id) == Some(idx))
            .map(|(_, record)| record)
            .collect();

        CanonicalSnapshot { records }
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CanonicalRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CanonicalRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Records keyed by identifier, sorted
    pub fn by_id(&self) -> BTreeMap<&str, &CanonicalRecord> {
        self.records.iter().map(|r| (r.id.as_str(), r)).collect()
    }

    /// CSV rendering in canonical column order, records in snapshot order
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        render_csv(self.records.iter())
    }

    /// Content fingerprint (SHA-256, hex), independent of record order.
    ///
    /// Two snapshots with the same records have the same fingerprint, which
    /// lets the store check that a "previous" snapshot is what it committed.
    pub fn fingerprint(&self) -> Result<String> {
        let sorted = self.by_id();
        let bytes = render_csv(sorted.values().copied())?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let bytes = self.to_csv_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
        Ok(())
    }
}

fn render_csv<'a>(records: impl Iterator<Item = &'a CanonicalRecord>) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(CANONICAL_COLUMNS)?;

    for record in records {
        let row: Vec<String> = CanonicalField::ALL
            .iter()
            .map(|f| record.field_repr(*f))
            .collect();
        wtr.write_record(&row)?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e))
}

// ============================================================================
// TESTS
// ============================================================================
