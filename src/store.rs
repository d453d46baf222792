// 🗄️ Snapshot Store / Ledger - SQLite + WAL
//
// Two kinds of state:
// - companies: latest canonical values per identifier (upsert, overwritten)
// - change_log: append-only ledger of change records (never updated or deleted)
//
// Every bulk operation runs inside one SQLite transaction, so readers see
// either none or all of it. `commit_date` wraps a whole date (upsert +
// append + commit marker) in a single transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::LedgerError;
use crate::normalizer::normalize_id;
use crate::record::{CanonicalField, CanonicalRecord, CanonicalSnapshot, ChangeKind, ChangeRecord};

const RECORD_COLUMNS: &str = "CIN, Company_Name, Company_Class, Date_of_Incorporation, \
     Authorized_Capital, Paidup_Capital, Company_Status, NIC_Code, \
     Registered_Address, RoC, State";

const CHANGE_COLUMNS: &str = "CIN, Change_Type, Field_Changed, Old_Value, New_Value, Date";

// ============================================================================
// COMMIT METADATA
// ============================================================================

/// One fully committed snapshot date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub commit_id: String,
    pub snapshot_date: String,
    /// `CanonicalSnapshot::fingerprint` of the committed snapshot
    pub fingerprint: String,
    pub record_count: i64,
    pub change_count: i64,
    pub seeded: bool,
    pub committed_at: DateTime<Utc>,
}

/// Everything the store needs to commit one date
#[derive(Debug, Clone, Copy)]
pub struct DateCommit<'a> {
    pub date: &'a str,
    pub snapshot: &'a CanonicalSnapshot,
    pub changes: &'a [ChangeRecord],
    /// Fingerprint of the snapshot the changes were diffed against.
    /// `None` marks the seed.
    pub previous_fingerprint: Option<&'a str>,
}

// ============================================================================
// SNAPSHOT STORE
// ============================================================================

pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        SnapshotStore::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        SnapshotStore::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SnapshotStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Upsert canonical records as one unit. Every canonical field of an
    /// existing identifier is overwritten.
    pub fn upsert_records(&mut self, records: &[CanonicalRecord], seen_date: &str) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .map_err(LedgerError::store_write("upsert_records"))?;
        let written = upsert_in(&tx, records, seen_date)?;
        tx.commit().map_err(LedgerError::store_write("upsert_records"))?;

        tracing::debug!(records = written, date = seen_date, "upserted records");
        Ok(written)
    }

    /// Append change records to the ledger as one unit
    pub fn append_changes(&mut self, changes: &[ChangeRecord]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .map_err(LedgerError::store_write("append_changes"))?;
        let written = append_in(&tx, changes)?;
        tx.commit().map_err(LedgerError::store_write("append_changes"))?;

        tracing::debug!(changes = written, "appended changes");
        Ok(written)
    }

    /// Commit one date: upsert the snapshot, append its changes and record
    /// the commit marker, all in a single transaction.
    ///
    /// Rejects dates that are not strictly after the last committed date and
    /// "previous" snapshots that are not the last committed one.
    pub fn commit_date(&mut self, commit: DateCommit<'_>) -> Result<CommitInfo> {
        let fingerprint = commit.snapshot.fingerprint()?;
        self.check_preconditions(&commit)?;

        let info = CommitInfo {
            commit_id: uuid::Uuid::new_v4().to_string(),
            snapshot_date: commit.date.to_string(),
            fingerprint,
            record_count: commit.snapshot.len() as i64,
            change_count: commit.changes.len() as i64,
            seeded: commit.previous_fingerprint.is_none(),
            committed_at: Utc::now(),
        };

        let tx = self
            .conn
            .transaction()
            .map_err(LedgerError::store_write("commit_date"))?;

        upsert_in(&tx, commit.snapshot.records(), commit.date)?;
        append_in(&tx, commit.changes)?;
        tx.execute(
            "INSERT INTO commits (
                commit_id, snapshot_date, fingerprint, record_count,
                change_count, seeded, committed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                info.commit_id,
                info.snapshot_date,
                info.fingerprint,
                info.record_count,
                info.change_count,
                info.seeded,
                info.committed_at.to_rfc3339(),
            ],
        )
        .map_err(LedgerError::store_write("commit_date"))?;

        tx.commit().map_err(LedgerError::store_write("commit_date"))?;

        tracing::info!(
            date = %info.snapshot_date,
            records = info.record_count,
            changes = info.change_count,
            seeded = info.seeded,
            commit_id = %info.commit_id,
            "committed snapshot date"
        );

        Ok(info)
    }

    fn check_preconditions(&self, commit: &DateCommit<'_>) -> Result<()> {
        let last = self.last_commit()?;

        match (last, commit.previous_fingerprint) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(LedgerError::MissingSeed {
                date: commit.date.to_string(),
            }
            .into()),
            (Some(last), None) => Err(LedgerError::SeedOnNonEmptyStore {
                date: commit.date.to_string(),
                last_committed: last.snapshot_date,
            }
            .into()),
            (Some(last), Some(previous)) => {
                if commit.date <= last.snapshot_date.as_str() {
                    return Err(LedgerError::OutOfOrderDate {
                        date: commit.date.to_string(),
                        last_committed: last.snapshot_date,
                    }
                    .into());
                }
                if previous != last.fingerprint {
                    return Err(LedgerError::PreviousMismatch {
                        date: commit.date.to_string(),
                        last_committed: last.snapshot_date,
                        expected: last.fingerprint,
                        actual: previous.to_string(),
                    }
                    .into());
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Commit history
    // ------------------------------------------------------------------------

    pub fn last_commit(&self) -> Result<Option<CommitInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT commit_id, snapshot_date, fingerprint, record_count,
                        change_count, seeded, committed_at
                 FROM commits
                 ORDER BY snapshot_date DESC
                 LIMIT 1",
                [],
                commit_from_row,
            )
            .optional()?;
        Ok(info)
    }

    pub fn commits(&self) -> Result<Vec<CommitInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT commit_id, snapshot_date, fingerprint, record_count,
                    change_count, seeded, committed_at
             FROM commits
             ORDER BY snapshot_date",
        )?;
        let commits = stmt
            .query_map([], commit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(commits)
    }

    /// Rebuild the last committed canonical snapshot (records seen on the
    /// last committed date). `None` if nothing has been committed.
    pub fn load_latest_snapshot(&self) -> Result<Option<CanonicalSnapshot>> {
        let last = match self.last_commit()? {
            Some(last) => last,
            None => return Ok(None),
        };

        let sql = format!(
            "SELECT {} FROM companies WHERE last_seen_date = ?1 ORDER BY CIN",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([&last.snapshot_date], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(CanonicalSnapshot::from_records_keep_last(records)))
    }

    // ------------------------------------------------------------------------
    // Entity table
    // ------------------------------------------------------------------------

    /// Every entity ever stored, ordered by identifier
    pub fn all_records(&self) -> Result<Vec<CanonicalRecord>> {
        let sql = format!("SELECT {} FROM companies ORDER BY CIN", RECORD_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<CanonicalRecord>> {
        let sql = format!("SELECT {} FROM companies WHERE CIN = ?1", RECORD_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, [normalize_id(id)], record_from_row)
            .optional()?;
        Ok(record)
    }

    /// Case-insensitive substring match on the company name
    pub fn search_by_name(&self, fragment: &str) -> Result<Vec<CanonicalRecord>> {
        let sql = format!(
            "SELECT {} FROM companies WHERE lower(Company_Name) LIKE ?1 ORDER BY CIN",
            RECORD_COLUMNS
        );
        let pattern = format!("%{}%", fragment.to_lowercase());
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([pattern], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count_records(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM companies", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Export the full entity table to CSV, canonical column order, sorted by id
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let snapshot = CanonicalSnapshot::from_records_keep_last(self.all_records()?);
        snapshot.write_csv(path)?;

        tracing::debug!(path = %path.display(), records = snapshot.len(), "exported master table");
        Ok(snapshot.len())
    }

    // ------------------------------------------------------------------------
    // Ledger queries
    // ------------------------------------------------------------------------

    /// Full change history of one entity, by date then insertion order
    pub fn changes_for_entity(&self, id: &str) -> Result<Vec<ChangeRecord>> {
        self.query_changes("WHERE CIN = ?1", &[&normalize_id(id)])
    }

    /// Ledger rows with date >= `since` (inclusive)
    pub fn changes_since(&self, since: &str) -> Result<Vec<ChangeRecord>> {
        self.query_changes("WHERE Date >= ?1", &[&since])
    }

    /// Ledger rows with `from` <= date <= `to`
    pub fn changes_between(&self, from: &str, to: &str) -> Result<Vec<ChangeRecord>> {
        self.query_changes("WHERE Date >= ?1 AND Date <= ?2", &[&from, &to])
    }

    pub fn count_changes(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM change_log", [], |row| row.get(0))?;
        Ok(count)
    }

    fn query_changes(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<ChangeRecord>> {
        let sql = format!(
            "SELECT {} FROM change_log {} ORDER BY Date, id",
            CHANGE_COLUMNS, filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let changes = stmt
            .query_map(args, change_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(changes)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode: readers keep seeing the last committed state during writes
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS companies (
            CIN TEXT PRIMARY KEY,
            Company_Name TEXT NOT NULL,
            Company_Class TEXT NOT NULL,
            Date_of_Incorporation TEXT NOT NULL,
            Authorized_Capital REAL NOT NULL,
            Paidup_Capital REAL NOT NULL,
            Company_Status TEXT NOT NULL,
            NIC_Code TEXT NOT NULL,
            Registered_Address TEXT NOT NULL,
            RoC TEXT NOT NULL,
            State TEXT NOT NULL,
            last_seen_date TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only: nothing in this crate issues UPDATE or DELETE on it
    conn.execute(
        "CREATE TABLE IF NOT EXISTS change_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            CIN TEXT NOT NULL,
            Change_Type TEXT NOT NULL,
            Field_Changed TEXT,
            Old_Value TEXT,
            New_Value TEXT,
            Date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS commits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            commit_id TEXT UNIQUE NOT NULL,
            snapshot_date TEXT UNIQUE NOT NULL,
            fingerprint TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            change_count INTEGER NOT NULL,
            seeded INTEGER NOT NULL,
            committed_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_change_log_cin ON change_log(CIN)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_change_log_date ON change_log(Date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_companies_seen ON companies(last_seen_date)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW HELPERS
// ============================================================================

fn upsert_in(conn: &Connection, records: &[CanonicalRecord], seen_date: &str) -> Result<usize> {
    let sql = format!(
        "REPLACE INTO companies ({}, last_seen_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        RECORD_COLUMNS
    );
    let mut stmt = conn
        .prepare_cached(&sql)
        .map_err(LedgerError::store_write("upsert_records"))?;

    for record in records {
        stmt.execute(params![
            record.id,
            record.name,
            record.class,
            record.incorporation_date,
            record.authorized_capital,
            record.paid_up_capital,
            record.status,
            record.industry_code,
            record.address,
            record.registering_office,
            record.jurisdiction,
            seen_date,
        ])
        .map_err(LedgerError::store_write("upsert_records"))?;
    }

    Ok(records.len())
}

fn append_in(conn: &Connection, changes: &[ChangeRecord]) -> Result<usize> {
    let sql = format!(
        "INSERT INTO change_log ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        CHANGE_COLUMNS
    );
    let mut stmt = conn
        .prepare_cached(&sql)
        .map_err(LedgerError::store_write("append_changes"))?;

    for change in changes {
        stmt.execute(params![
            change.entity_id,
            change.change_kind.as_str(),
            change.field.map(|f| f.column()),
            change.old_value,
            change.new_value,
            change.observed_date,
        ])
        .map_err(LedgerError::store_write("append_changes"))?;
    }

    Ok(changes.len())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CanonicalRecord> {
    Ok(CanonicalRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        class: row.get(2)?,
        incorporation_date: row.get(3)?,
        authorized_capital: row.get(4)?,
        paid_up_capital: row.get(5)?,
        status: row.get(6)?,
        industry_code: row.get(7)?,
        address: row.get(8)?,
        registering_office: row.get(9)?,
        jurisdiction: row.get(10)?,
    })
}

fn change_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeRecord> {
    let kind_str: String = row.get(1)?;
    let change_kind: ChangeKind = kind_str
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    let field_str: Option<String> = row.get(2)?;
    let field = match field_str.as_deref() {
        None | Some("") => None,
        Some(column) => Some(CanonicalField::from_column(column).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                Box::new(LedgerError::UnknownValue {
                    kind: "canonical column",
                    value: column.to_string(),
                }),
            )
        })?),
    };

    Ok(ChangeRecord {
        entity_id: row.get(0)?,
        change_kind,
        field,
        old_value: row.get(3)?,
        new_value: row.get(4)?,
        observed_date: row.get(5)?,
    })
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<CommitInfo> {
    let committed_at_str: String = row.get(6)?;
    let committed_at = DateTime::parse_from_rfc3339(&committed_at_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(CommitInfo {
        commit_id: row.get(0)?,
        snapshot_date: row.get(1)?,
        fingerprint: row.get(2)?,
        record_count: row.get(3)?,
        change_count: row.get(4)?,
        seeded: row.get(5)?,
        committed_at,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn company(id: &str, name: &str, status: &str) -> CanonicalRecord {
        let mut r = CanonicalRecord::new(id);
        r.name = name.to_string();
        r.status = status.to_string();
        r.authorized_capital = 100000.0;
        r.jurisdiction = "Delhi".to_string();
        r
    }

    fn snapshot(records: Vec<CanonicalRecord>) -> CanonicalSnapshot {
        CanonicalSnapshot::from_records_keep_last(records)
    }

    fn seed(store: &mut SnapshotStore, date: &str, snap: &CanonicalSnapshot) -> CommitInfo {
        store
            .commit_date(DateCommit {
                date,
                snapshot: snap,
                changes: &[],
                previous_fingerprint: None,
            })
            .unwrap()
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let mut store = SnapshotStore::open_in_memory().unwrap();

        store
            .upsert_records(&[company("A1", "Acme", "Active"), company("B2", "Beta", "Active")], "d1")
            .unwrap();
        store
            .upsert_records(&[company("A1", "Acme Renamed", "Dormant")], "d2")
            .unwrap();

        assert_eq!(store.count_records().unwrap(), 2);
        let a1 = store.find_by_id("a1").unwrap().unwrap();
        assert_eq!(a1.name, "Acme Renamed");
        assert_eq!(a1.status, "Dormant");
    }

    #[test]
    fn test_ledger_is_append_only() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let change = ChangeRecord::new_entity("A1", "2025-10-18");

        store.append_changes(&[change.clone()]).unwrap();
        store.append_changes(&[change.clone()]).unwrap();

        assert_eq!(store.count_changes().unwrap(), 2);
        assert_eq!(store.changes_for_entity("A1").unwrap(), vec![change.clone(), change]);
    }

    #[test]
    fn test_change_round_trip_through_sql() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let changes = vec![
            ChangeRecord::removed("B2", "2025-10-18"),
            ChangeRecord::field_update(
                "A1",
                CanonicalField::AuthorizedCapital,
                "100000.0".to_string(),
                "120000.0".to_string(),
                "2025-10-18",
            ),
        ];
        store.append_changes(&changes).unwrap();

        assert_eq!(store.changes_since("2025-10-18").unwrap(), changes);
    }

    #[test]
    fn test_range_queries_inclusive() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        store
            .append_changes(&[
                ChangeRecord::new_entity("A1", "2025-10-17"),
                ChangeRecord::new_entity("A2", "2025-10-18"),
                ChangeRecord::new_entity("A3", "2025-10-19"),
            ])
            .unwrap();

        let since: Vec<String> = store
            .changes_since("2025-10-18")
            .unwrap()
            .into_iter()
            .map(|c| c.entity_id)
            .collect();
        assert_eq!(since, vec!["A2", "A3"]);

        let between = store.changes_between("2025-10-17", "2025-10-18").unwrap();
        assert_eq!(between.len(), 2);
    }

    #[test]
    fn test_commit_and_reload_latest_snapshot() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        assert!(store.load_latest_snapshot().unwrap().is_none());

        let day1 = snapshot(vec![company("A1", "Acme", "Active"), company("A2", "Beta", "Active")]);
        let seed_info = seed(&mut store, "2025-10-17", &day1);
        assert!(seed_info.seeded);

        let day2 = snapshot(vec![company("A2", "Beta", "Active"), company("A3", "Gamma", "Active")]);
        let changes = vec![
            ChangeRecord::new_entity("A3", "2025-10-18"),
            ChangeRecord::removed("A1", "2025-10-18"),
        ];
        let info = store
            .commit_date(DateCommit {
                date: "2025-10-18",
                snapshot: &day2,
                changes: &changes,
                previous_fingerprint: Some(&seed_info.fingerprint),
            })
            .unwrap();

        assert_eq!(info.change_count, 2);
        assert_eq!(store.commits().unwrap().len(), 2);
        assert_eq!(store.last_commit().unwrap().unwrap().snapshot_date, "2025-10-18");

        // removed entity stays in the table but not in the latest snapshot
        assert_eq!(store.count_records().unwrap(), 3);
        let latest = store.load_latest_snapshot().unwrap().unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.get("A1").is_none());
        assert_eq!(latest.fingerprint().unwrap(), info.fingerprint);
    }

    #[test]
    fn test_out_of_order_date_rejected() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let snap = snapshot(vec![company("A1", "Acme", "Active")]);
        let seed_info = seed(&mut store, "2025-10-18", &snap);

        let err = store
            .commit_date(DateCommit {
                date: "2025-10-17",
                snapshot: &snap,
                changes: &[],
                previous_fingerprint: Some(&seed_info.fingerprint),
            })
            .unwrap_err();

        let ledger_err = err.downcast_ref::<LedgerError>().unwrap();
        assert!(matches!(ledger_err, LedgerError::OutOfOrderDate { .. }));
        assert!(ledger_err.is_precondition());
    }

    #[test]
    fn test_previous_mismatch_rejected() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let snap = snapshot(vec![company("A1", "Acme", "Active")]);
        seed(&mut store, "2025-10-17", &snap);

        let stale = snapshot(vec![company("Z9", "Other", "Active")]);
        let stale_fp = stale.fingerprint().unwrap();
        let err = store
            .commit_date(DateCommit {
                date: "2025-10-18",
                snapshot: &snap,
                changes: &[],
                previous_fingerprint: Some(&stale_fp),
            })
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::PreviousMismatch { .. })
        ));
    }

    #[test]
    fn test_seed_rules() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        let snap = snapshot(vec![company("A1", "Acme", "Active")]);
        let fp = snap.fingerprint().unwrap();

        let err = store
            .commit_date(DateCommit {
                date: "2025-10-17",
                snapshot: &snap,
                changes: &[],
                previous_fingerprint: Some(&fp),
            })
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<LedgerError>(), Some(LedgerError::MissingSeed { .. })));

        seed(&mut store, "2025-10-17", &snap);
        let err = store
            .commit_date(DateCommit {
                date: "2025-10-18",
                snapshot: &snap,
                changes: &[],
                previous_fingerprint: None,
            })
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::SeedOnNonEmptyStore { .. })
        ));
    }

    #[test]
    fn test_failed_commit_leaves_no_trace() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        store.connection().execute("DROP TABLE change_log", []).unwrap();

        let snap = snapshot(vec![company("A1", "Acme", "Active")]);
        let changes = vec![ChangeRecord::new_entity("A1", "2025-10-17")];
        let err = store
            .commit_date(DateCommit {
                date: "2025-10-17",
                snapshot: &snap,
                changes: &changes,
                previous_fingerprint: None,
            })
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::StoreWrite { .. })
        ));
        assert_eq!(store.count_records().unwrap(), 0);
        assert!(store.last_commit().unwrap().is_none());
    }

    #[test]
    fn test_search_and_export() {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        store
            .upsert_records(
                &[company("B2", "Beta Foods Pvt Ltd", "Active"), company("A1", "Acme Tech", "Active")],
                "d1",
            )
            .unwrap();

        let hits = store.search_by_name("FOODS").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "B2");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("master_latest.csv");
        assert_eq!(store.export_csv(&path).unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("CIN,Company_Name"));
        assert!(lines[1].starts_with("A1,"));
        assert!(lines[2].starts_with("B2,"));
    }
}
