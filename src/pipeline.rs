// 🔁 Pipeline - strictly sequential date processing
//
// For each date: consolidate → diff against previous → commit atomically →
// write change log + master export. Snapshot N becomes "previous" for N+1.
// A failed date aborts the run; every earlier date stays committed.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::change_detector::{changed_ids, ChangeDetector};
use crate::config::PipelineConfig;
use crate::consolidator::Consolidator;
use crate::enrichment::{write_enrichment_csv, Enricher, OUTPUT_FILE_NAME, SEED_FILE_NAME};
use crate::record::{write_changes_csv, CanonicalSnapshot, ChangeKind, ChangeRecord};
use crate::store::{CommitInfo, DateCommit, SnapshotStore};
use crate::summary::DailySummary;

/// What happened to one date
#[derive(Debug, Clone, Serialize)]
pub struct DateOutcome {
    pub date: String,
    pub record_count: usize,
    pub new_entities: usize,
    pub removed: usize,
    pub field_updates: usize,
    pub seeded: bool,
    pub commit_id: String,
    pub changelog_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub processed: Vec<DateOutcome>,
    /// Dates at or before the store's last commit when the run started
    pub skipped: Vec<String>,
    pub summary: Option<DailySummary>,
    pub summary_paths: Option<(PathBuf, PathBuf)>,
    pub enrichment_path: Option<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    consolidator: Consolidator,
    detector: ChangeDetector,
    store: SnapshotStore,
}

impl Pipeline {
    /// Open the store at the configured database path
    pub fn open(config: PipelineConfig) -> Result<Self> {
        let store = SnapshotStore::open(&config.db_path())?;
        Pipeline::new(config, store)
    }

    pub fn new(config: PipelineConfig, store: SnapshotStore) -> Result<Self> {
        let consolidator = config.consolidator()?;
        Ok(Pipeline {
            config,
            consolidator,
            detector: ChangeDetector::new(),
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn into_store(self) -> SnapshotStore {
        self.store
    }

    /// Process `dates` in the given order, resuming from the last committed
    /// snapshot if the store already has one.
    pub fn run(&mut self, dates: &[String]) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        let mut previous = self.store.load_latest_snapshot()?;
        let commits = self.store.commits()?;
        let resume_after = self.store.last_commit()?.map(|c| c.snapshot_date);
        if let Some(last) = &resume_after {
            tracing::info!(last_committed = %last, "resuming from committed state");
        }

        let mut last_changes: Option<(String, Vec<ChangeRecord>)> = None;

        for date in dates {
            if let Some(last) = &resume_after {
                if date.as_str() <= last.as_str() {
                    tracing::info!(%date, "already committed, skipping");
                    self.restore_changelog(date, &commits)?;
                    report.skipped.push(date.clone());
                    continue;
                }
            }

            tracing::info!(%date, "consolidating snapshot");
            let snapshot_dir = self.config.snapshot_dir(date);
            let current = self
                .consolidator
                .consolidate_dir(&snapshot_dir)
                .with_context(|| format!("Failed to consolidate snapshot {}", date))?;

            let (outcome, changes) = self
                .process_date(date, previous.as_ref(), &current)
                .with_context(|| format!("Pipeline failed for {}", date))?;

            if !outcome.seeded {
                last_changes = Some((date.clone(), changes));
            }
            report.processed.push(outcome);
            previous = Some(current);
        }

        // The ledger is the source of truth; a file lost after an earlier
        // commit is re-exported from it
        if resume_after.is_some() && !self.config.master_csv_path().is_file() {
            self.store.export_csv(&self.config.master_csv_path())?;
            tracing::warn!("restored missing master export");
        }

        if let Some((date, changes)) = last_changes {
            report.enrichment_path = Some(self.enrich(&changes)?);

            let summary = DailySummary::from_changes(&date, &changes, self.config.notable_status_cap);
            report.summary_paths = Some(summary.write(&self.config.summaries_dir())?);
            tracing::info!(
                %date,
                new = summary.new_incorporations,
                deregistered = summary.deregistered,
                updated = summary.updated_records,
                "wrote daily summary"
            );
            report.summary = Some(summary);
        }

        tracing::info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            "pipeline complete"
        );

        Ok(report)
    }

    /// Diff and commit one date. `previous = None` seeds the store.
    ///
    /// The change log CSV and the master export are written only after the
    /// commit succeeds.
    pub fn process_date(
        &mut self,
        date: &str,
        previous: Option<&CanonicalSnapshot>,
        current: &CanonicalSnapshot,
    ) -> Result<(DateOutcome, Vec<ChangeRecord>)> {
        let change_set = self.detector.detect(previous, current, date);
        let previous_fingerprint = previous.map(|p| p.fingerprint()).transpose()?;

        let info = self.store.commit_date(DateCommit {
            date,
            snapshot: current,
            changes: &change_set.records,
            previous_fingerprint: previous_fingerprint.as_deref(),
        })?;

        let changelog_path = if change_set.seeded {
            tracing::info!(%date, records = current.len(), "seeded master table");
            None
        } else {
            let path = self.config.changelog_path(date);
            write_changes_csv(&path, &change_set.records)?;
            Some(path)
        };

        self.store.export_csv(&self.config.master_csv_path())?;

        let outcome = DateOutcome {
            date: date.to_string(),
            record_count: current.len(),
            new_entities: change_set.count(ChangeKind::NewEntity),
            removed: change_set.count(ChangeKind::Removed),
            field_updates: change_set.count(ChangeKind::FieldUpdate),
            seeded: change_set.seeded,
            commit_id: info.commit_id,
            changelog_path,
        };

        Ok((outcome, change_set.records))
    }

    /// Rewrite a committed date's change log CSV from the ledger if the file
    /// is missing (the commit succeeded but the file write did not)
    fn restore_changelog(&self, date: &str, commits: &[CommitInfo]) -> Result<()> {
        let commit = match commits.iter().find(|c| c.snapshot_date == date) {
            Some(c) if !c.seeded => c,
            _ => return Ok(()),
        };

        let path = self.config.changelog_path(date);
        if path.is_file() {
            return Ok(());
        }

        let changes = self.store.changes_between(date, date)?;
        write_changes_csv(&path, &changes)?;
        tracing::warn!(
            %date,
            commit_id = %commit.commit_id,
            changes = changes.len(),
            "restored missing change log from ledger"
        );
        Ok(())
    }

    fn enrich(&self, changes: &[ChangeRecord]) -> Result<PathBuf> {
        let enrichment_dir = self.config.enrichment_dir();
        let ids = changed_ids(changes);

        let enricher = Enricher::new(self.config.enrichment_limit)
            .with_seed_file(&enrichment_dir.join(SEED_FILE_NAME))?;
        let rows = enricher.enrich(&ids, &self.store)?;

        let path = enrichment_dir.join(OUTPUT_FILE_NAME);
        write_enrichment_csv(&path, &rows)?;
        Ok(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================
