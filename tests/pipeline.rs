// End-to-end: three generated snapshot dates through the full pipeline

use std::collections::BTreeSet;

use registry_ledger::generator::DEFAULT_SEED;
use registry_ledger::{
    read_changes_csv, ChangeKind, MutationRatios, Pipeline, PipelineConfig, SnapshotGenerator,
};

const DATES: [&str; 3] = ["2025-10-17", "2025-10-18", "2025-10-19"];

fn demo_config(root: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        data_dir: root.join("snapshots"),
        output_dir: root.join("outputs"),
        ..PipelineConfig::default()
    }
}

fn generate(config: &PipelineConfig) {
    let mut generator = SnapshotGenerator::new(config.jurisdictions.clone(), DEFAULT_SEED);
    generator.write_seed(&config.snapshot_dir(DATES[0]), 40).unwrap();
    generator
        .write_mutation(&config.snapshot_dir(DATES[0]), &config.snapshot_dir(DATES[1]), MutationRatios::default())
        .unwrap();
    generator
        .write_mutation(
            &config.snapshot_dir(DATES[1]),
            &config.snapshot_dir(DATES[2]),
            MutationRatios { add: 0.18, update: 0.22, delete: 0.06 },
        )
        .unwrap();
}

#[test]
fn three_dates_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let config = demo_config(root.path());
    generate(&config);

    let dates: Vec<String> = DATES.iter().map(|d| d.to_string()).collect();
    let mut pipeline = Pipeline::open(config.clone()).unwrap();
    let report = pipeline.run(&dates).unwrap();

    assert_eq!(report.processed.len(), 3);
    assert!(report.processed[0].seeded);
    assert_eq!(report.processed[0].record_count, 200);
    assert!(report.processed[0].changelog_path.is_none());

    let consolidator = config.consolidator().unwrap();
    let mut previous_ids: BTreeSet<String> = BTreeSet::new();

    for (i, date) in DATES.iter().enumerate() {
        let snapshot = consolidator.consolidate_dir(&config.snapshot_dir(date)).unwrap();
        let ids: BTreeSet<String> = snapshot.records().iter().map(|r| r.id.clone()).collect();

        if i > 0 {
            let changes = read_changes_csv(&config.changelog_path(date)).unwrap();
            let kind_ids = |kind: ChangeKind| -> BTreeSet<String> {
                changes
                    .iter()
                    .filter(|c| c.change_kind == kind)
                    .map(|c| c.entity_id.clone())
                    .collect()
            };

            // New and removed sets are exactly the identifier set differences
            let expected_new: BTreeSet<String> = ids.difference(&previous_ids).cloned().collect();
            let expected_removed: BTreeSet<String> = previous_ids.difference(&ids).cloned().collect();
            assert_eq!(kind_ids(ChangeKind::NewEntity), expected_new);
            assert_eq!(kind_ids(ChangeKind::Removed), expected_removed);

            // Field updates only touch ids present on both sides
            for id in kind_ids(ChangeKind::FieldUpdate) {
                assert!(ids.contains(&id) && previous_ids.contains(&id));
            }

            assert!(changes.iter().all(|c| c.observed_date == *date));
            assert_eq!(report.processed[i].new_entities, expected_new.len());
            assert_eq!(report.processed[i].removed, expected_removed.len());
        }

        previous_ids = ids;
    }

    // Ledger is the concatenation of the two daily change sets
    let store = pipeline.store();
    let logged: usize = DATES[1..]
        .iter()
        .map(|d| read_changes_csv(&config.changelog_path(d)).unwrap().len())
        .sum();
    assert_eq!(store.count_changes().unwrap() as usize, logged);

    // Master table keeps removed companies, so it covers every id ever seen
    let mut ever_seen = BTreeSet::new();
    for date in DATES {
        let snapshot = consolidator.consolidate_dir(&config.snapshot_dir(date)).unwrap();
        ever_seen.extend(snapshot.records().iter().map(|r| r.id.clone()));
    }
    assert_eq!(store.count_records().unwrap() as usize, ever_seen.len());

    // Summary and enrichment describe the last date
    let summary = report.summary.unwrap();
    assert_eq!(summary.date, DATES[2]);
    assert!(summary.notable_status_changes.len() <= 20);
    assert!(report.enrichment_path.unwrap().is_file());
    assert!(config.master_csv_path().is_file());
}

#[test]
fn rerun_is_a_no_op() {
    let root = tempfile::tempdir().unwrap();
    let config = demo_config(root.path());
    generate(&config);

    let dates: Vec<String> = DATES.iter().map(|d| d.to_string()).collect();
    let first = Pipeline::open(config.clone()).unwrap().run(&dates).unwrap();
    assert_eq!(first.processed.len(), 3);

    let mut pipeline = Pipeline::open(config).unwrap();
    let ledger_before = pipeline.store().count_changes().unwrap();
    let second = pipeline.run(&dates).unwrap();

    assert!(second.processed.is_empty());
    assert_eq!(second.skipped.len(), 3);
    assert_eq!(pipeline.store().count_changes().unwrap(), ledger_before);
    assert_eq!(pipeline.store().commits().unwrap().len(), 3);
}
