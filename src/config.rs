// ⚙️ Pipeline configuration
//
// Optional TOML file with a serde default for every field, then environment
// overrides for the two directories.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::consolidator::Consolidator;
use crate::enrichment::DEFAULT_ENRICHMENT_LIMIT;
use crate::normalizer::ColumnMapping;
use crate::summary::DEFAULT_NOTABLE_CAP;

pub const ENV_DATA_DIR: &str = "REGISTRY_LEDGER_DATA_DIR";
pub const ENV_OUTPUT_DIR: &str = "REGISTRY_LEDGER_OUTPUT_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the snapshot tree: `<data_dir>/<date>/<jurisdiction>.csv`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Database, master export, change logs, summaries, enrichment
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Consolidation order; later jurisdictions win identifier collisions
    #[serde(default = "default_jurisdictions")]
    pub jurisdictions: Vec<String>,

    #[serde(default = "default_enrichment_limit")]
    pub enrichment_limit: usize,

    #[serde(default = "default_notable_cap")]
    pub notable_status_cap: usize,

    /// jurisdiction → (raw column → canonical column)
    #[serde(default)]
    pub column_aliases: HashMap<String, HashMap<String, String>>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/snapshots")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_jurisdictions() -> Vec<String> {
    ["Maharashtra", "Gujarat", "Delhi", "Tamil Nadu", "Karnataka"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_enrichment_limit() -> usize {
    DEFAULT_ENRICHMENT_LIMIT
}

fn default_notable_cap() -> usize {
    DEFAULT_NOTABLE_CAP
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            jurisdictions: default_jurisdictions(),
            enrichment_limit: default_enrichment_limit(),
            notable_status_cap: default_notable_cap(),
            column_aliases: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path` when given (must exist), else defaults; then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => PipelineConfig::from_file(p)?,
            None => PipelineConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        PipelineConfig::from_toml_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
    }

    pub fn snapshot_dir(&self, date: &str) -> PathBuf {
        self.data_dir.join(date)
    }

    pub fn db_path(&self) -> PathBuf {
        self.output_dir.join("master.db")
    }

    pub fn master_csv_path(&self) -> PathBuf {
        self.output_dir.join("master_latest.csv")
    }

    pub fn changelogs_dir(&self) -> PathBuf {
        self.output_dir.join("changelogs")
    }

    pub fn changelog_path(&self, date: &str) -> PathBuf {
        self.changelogs_dir().join(format!("changes_{}.csv", date))
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.output_dir.join("summaries")
    }

    pub fn enrichment_dir(&self) -> PathBuf {
        self.output_dir.join("enrichment")
    }

    /// Consolidator with the configured order and column aliases
    pub fn consolidator(&self) -> Result<Consolidator> {
        let mut consolidator = Consolidator::new(self.jurisdictions.clone());
        for (jurisdiction, aliases) in &self.column_aliases {
            let mapping = ColumnMapping::from_aliases(aliases)
                .with_context(|| format!("Invalid column aliases for {}", jurisdiction))?;
            consolidator = consolidator.with_mapping(jurisdiction, mapping);
        }
        Ok(consolidator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.jurisdictions.len(), 5);
        assert_eq!(config.enrichment_limit, 100);
        assert_eq!(config.notable_status_cap, 20);
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            output_dir = "/tmp/ledger"
            jurisdictions = ["Delhi", "Karnataka"]

            [column_aliases.Karnataka]
            Corporate_Identification_Number = "CIN"
            "#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/ledger"));
        assert_eq!(config.jurisdictions, vec!["Delhi", "Karnataka"]);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/ledger/master.db"));
        assert_eq!(
            config.changelog_path("2025-10-18"),
            PathBuf::from("/tmp/ledger/changelogs/changes_2025-10-18.csv")
        );
        assert!(config.consolidator().is_ok());
    }

    #[test]
    fn test_bad_alias_rejected() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [column_aliases.Delhi]
            Foo = "Bar"
            "#,
        )
        .unwrap();
        assert!(config.consolidator().is_err());
    }

    #[test]
    fn test_unknown_key_type_rejected() {
        assert!(PipelineConfig::from_toml_str("enrichment_limit = \"lots\"").is_err());
    }
}
