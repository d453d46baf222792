// 🧹 Normalizer - raw per-jurisdiction extract → canonical records
//
// Column mapping is declarative: raw header name → canonical field.
// Unmapped raw columns are dropped, missing canonical columns fall back to
// their neutral value (empty text, 0.0 capital). Nothing in here fails on
// bad cell content.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::LedgerError;
use crate::record::{CanonicalField, CanonicalRecord, CanonicalSnapshot};

// ============================================================================
// RAW EXTRACT
// ============================================================================

/// One jurisdiction's export for one date, as read: headers plus rows of
/// cells. The jurisdiction label comes from the caller (file naming), not
/// from the file.
#[derive(Debug, Clone)]
pub struct RawExtract {
    pub jurisdiction: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawExtract {
    pub fn new(jurisdiction: &str, headers: &[&str]) -> Self {
        RawExtract {
            jurisdiction: jurisdiction.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Builder pattern: append one row of cells
    pub fn with_row(mut self, cells: &[&str]) -> Self {
        self.rows.push(cells.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Parse a CSV extract. Rows may be ragged; short rows read as missing cells.
    pub fn from_reader<R: Read>(reader: R, jurisdiction: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        // Byte records: a cell with invalid UTF-8 is decoded lossily instead
        // of failing the whole extract
        let headers = rdr
            .byte_headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| {
                String::from_utf8_lossy(h)
                    .trim()
                    .trim_start_matches('\u{feff}')
                    .to_string()
            })
            .collect();

        let mut rows = Vec::new();
        let mut lossy_rows = 0usize;
        for (line_num, result) in rdr.byte_records().enumerate() {
            let record = result.with_context(|| {
                format!("Failed to parse CSV line {} for {}", line_num + 2, jurisdiction)
            })?;
            if std::str::from_utf8(record.as_slice()).is_err() {
                lossy_rows += 1;
            }
            rows.push(
                record
                    .iter()
                    .map(|c| String::from_utf8_lossy(c).into_owned())
                    .collect(),
            );
        }

        if lossy_rows > 0 {
            tracing::warn!(%jurisdiction, rows = lossy_rows, "replaced invalid UTF-8 in extract");
        }

        Ok(RawExtract {
            jurisdiction: jurisdiction.to_string(),
            headers,
            rows,
        })
    }

    pub fn from_path(path: &Path, jurisdiction: &str) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open extract: {}", path.display()))?;
        RawExtract::from_reader(file, jurisdiction)
            .with_context(|| format!("Failed to read extract: {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// COLUMN MAPPING
// ============================================================================

/// Raw column name → canonical field.
///
/// Always contains the identity mapping for the canonical column names;
/// jurisdiction-specific aliases are layered on top.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    columns: HashMap<String, CanonicalField>,
}

impl ColumnMapping {
    pub fn identity() -> Self {
        let columns = CanonicalField::ALL
            .iter()
            .map(|f| (f.column().to_string(), *f))
            .collect();
        ColumnMapping { columns }
    }

    pub fn with_alias(mut self, raw_column: &str, field: CanonicalField) -> Self {
        self.columns.insert(raw_column.to_string(), field);
        self
    }

    /// Build from configured aliases (raw name → canonical column name)
    pub fn from_aliases(aliases: &HashMap<String, String>) -> Result<Self> {
        let mut mapping = ColumnMapping::identity();
        for (raw, canonical) in aliases {
            let field = CanonicalField::from_column(canonical).ok_or_else(|| {
                LedgerError::UnknownValue {
                    kind: "canonical column",
                    value: canonical.clone(),
                }
            })?;
            mapping = mapping.with_alias(raw, field);
        }
        Ok(mapping)
    }

    pub fn field_for(&self, raw_column: &str) -> Option<CanonicalField> {
        self.columns.get(raw_column).copied()
    }

    /// Position of each mapped field in `headers`. The first header that maps
    /// to a field wins.
    pub fn resolve(&self, headers: &[String]) -> Vec<(CanonicalField, usize)> {
        let mut positions: Vec<(CanonicalField, usize)> = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = self.field_for(header) {
                if !positions.iter().any(|(f, _)| *f == field) {
                    positions.push((field, idx));
                }
            }
        }
        positions
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::identity()
    }
}

// ============================================================================
// FIELD CLEANING
// ============================================================================

/// Currency markers stripped before parsing capital values.
/// `â‚¹` is the rupee sign after a UTF-8/Windows-1252 round trip.
const CURRENCY_MARKERS: [&str; 7] = ["â‚¹", "₹", "Rs.", "INR", "$", "€", "£"];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Uppercase and strip all whitespace
pub fn normalize_id(raw: &str) -> String {
    raw.to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Parse a capital value. Missing, empty, unparsable, negative or
/// non-finite input yields `0.0`.
pub fn to_float(raw: Option<&str>) -> f64 {
    let raw = match raw {
        Some(r) => r,
        None => return 0.0,
    };

    let mut cleaned = raw.trim().to_string();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.retain(|c| c != ',' && c != '_' && !c.is_whitespace());

    match cleaned.parse::<f64>() {
        // `+ 0.0` folds a parsed "-0" into 0.0
        Ok(v) if v.is_finite() && v >= 0.0 => v + 0.0,
        _ => 0.0,
    }
}

/// Interpret an incorporation date. The canonical record keeps the raw
/// string either way; `None` means "unparsed".
pub fn parse_incorporation_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct Normalizer {
    mapping: ColumnMapping,
}

impl Normalizer {
    pub fn new() -> Self {
        Normalizer {
            mapping: ColumnMapping::identity(),
        }
    }

    pub fn with_mapping(mapping: ColumnMapping) -> Self {
        Normalizer { mapping }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Map one extract onto the canonical schema, keep-last per identifier.
    ///
    /// Rows whose identifier normalizes to the empty string are skipped.
    pub fn normalize(&self, extract: &RawExtract) -> CanonicalSnapshot {
        let positions = self.mapping.resolve(&extract.headers);
        let mut records = Vec::with_capacity(extract.rows.len());
        let mut skipped = 0usize;

        for row in &extract.rows {
            let record = self.normalize_row(row, &positions, &extract.jurisdiction);
            if record.id.is_empty() {
                skipped += 1;
                continue;
            }
            records.push(record);
        }

        if skipped > 0 {
            tracing::warn!(
                jurisdiction = %extract.jurisdiction,
                skipped,
                "skipped rows without an identifier"
            );
        }

        let snapshot = CanonicalSnapshot::from_records_keep_last(records);
        let unparsed_dates = snapshot
            .records()
            .iter()
            .filter(|r| !r.incorporation_date.trim().is_empty())
            .filter(|r| parse_incorporation_date(&r.incorporation_date).is_none())
            .count();
        tracing::debug!(
            jurisdiction = %extract.jurisdiction,
            rows = extract.rows.len(),
            records = snapshot.len(),
            unparsed_dates,
            "normalized extract"
        );

        snapshot
    }

    fn normalize_row(
        &self,
        row: &[String],
        positions: &[(CanonicalField, usize)],
        jurisdiction: &str,
    ) -> CanonicalRecord {
        let mut record = CanonicalRecord::new(String::new());

        for (field, idx) in positions {
            let cell = row.get(*idx).map(|c| c.as_str());
            match field {
                CanonicalField::Id => record.id = normalize_id(cell.unwrap_or("")),
                CanonicalField::Jurisdiction => {}
                f if f.is_numeric() => record.set_capital(*f, to_float(cell)),
                f => record.set_text(*f, cell.unwrap_or("").to_string()),
            }
        }

        record.jurisdiction = jurisdiction.to_string();
        record
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
