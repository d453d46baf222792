// Registry Ledger - Core Library
// Snapshot consolidation, change detection and the append-only change ledger.
// Exposes all modules for use in the CLI, the API server, and tests.

pub mod record;
pub mod error;
pub mod normalizer;
pub mod consolidator;
pub mod change_detector;
pub mod store;
pub mod summary;
pub mod enrichment;
pub mod config;
pub mod pipeline;
pub mod generator;      // Demo snapshots

// Re-export commonly used types
pub use record::{
    CanonicalField, CanonicalRecord, CanonicalSnapshot, ChangeKind, ChangeRecord,
    RegistryStatus, CANONICAL_COLUMNS,
    format_capital, read_changes_csv, write_changes_csv,
};
pub use error::LedgerError;
pub use normalizer::{
    ColumnMapping, Normalizer, RawExtract,
    normalize_id, parse_incorporation_date, to_float,
};
pub use consolidator::{Consolidator, extract_file_name};
pub use change_detector::{ChangeDetector, ChangeSet, changed_ids};
pub use store::{CommitInfo, DateCommit, SnapshotStore, setup_database};
pub use summary::DailySummary;
pub use enrichment::{Enricher, EnrichmentRow, sector_for_nic, write_enrichment_csv};
pub use config::PipelineConfig;
pub use pipeline::{DateOutcome, Pipeline, PipelineReport};
pub use generator::{MutationRatios, SnapshotGenerator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
