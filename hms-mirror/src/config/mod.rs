//! Run configuration for hms-mirror
//!
//! Default config location: ~/.hms-mirror/cfg/default.yaml

mod cluster;

pub use cluster::{ClusterConfig, ClustersConfig, HiveServer2Config};

use crate::mirror::Environment;
use crate::stage::{MetadataStrategy, Stage, StorageStrategy};
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Config {
    /// Stage to run. Usually supplied on the command line.
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub clusters: ClustersConfig,

    /// Databases to migrate. Either this or `db_regex` must be set.
    #[serde(default)]
    pub databases: Vec<String>,
    #[serde(default)]
    pub db_regex: Option<String>,
    #[serde(default)]
    pub tbl_regex: Option<String>,
    /// Prefix added to the database name on the UPPER cluster.
    #[serde(default)]
    pub db_prefix: Option<String>,

    #[serde(default)]
    pub share_storage: bool,
    #[serde(default)]
    pub commit_to_upper: bool,
    #[serde(default)]
    pub replication_strategy: ReplicationStrategy,

    /// Per-table overrides keyed by LOWER database, then LOWER table name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub translations: BTreeMap<String, BTreeMap<String, TableTranslation>>,

    /// Without this flag the run is a dry-run: statements are recorded, never executed.
    #[serde(default)]
    pub execute: bool,

    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetadataConfig {
    #[serde(default)]
    pub strategy: MetadataStrategy,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// DR targets are read-only; ownership is never moved to UPPER.
    #[serde(default)]
    pub disaster_recovery: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            strategy: MetadataStrategy::default(),
            concurrency: default_concurrency(),
            disaster_recovery: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub strategy: StorageStrategy,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub migrate_acid: bool,
    /// HYBRID switches from EXPORT_IMPORT to SQL above this many partitions.
    #[serde(default = "default_export_import_partition_limit")]
    pub export_import_partition_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            strategy: StorageStrategy::default(),
            concurrency: default_concurrency(),
            migrate_acid: false,
            export_import_partition_limit: default_export_import_partition_limit(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_export_import_partition_limit() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TransferConfig {
    #[serde(default = "default_transfer_prefix")]
    pub transfer_prefix: String,
    #[serde(default = "default_export_base_dir_prefix")]
    pub export_base_dir_prefix: String,
    /// Staging location shared by both clusters (HYBRID / EXPORT_IMPORT).
    #[serde(default)]
    pub intermediate_storage: Option<String>,
}

fn default_transfer_prefix() -> String {
    "hms_mirror_transfer_".to_string()
}

fn default_export_base_dir_prefix() -> String {
    "/apps/hive/warehouse/export_".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            transfer_prefix: default_transfer_prefix(),
            export_base_dir_prefix: default_export_base_dir_prefix(),
            intermediate_storage: None,
        }
    }
}

/// Overrides for a single table on UPPER
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TableTranslation {
    /// Table name on UPPER. Without an explicit `location`, a moved table's
    /// location follows the new name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
    /// UPPER location; wins over namespace translation and shared storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationStrategy {
    Overwrite,
    #[default]
    Synchronize,
}

impl std::str::FromStr for ReplicationStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OVERWRITE" => Ok(ReplicationStrategy::Overwrite),
            "SYNCHRONIZE" => Ok(ReplicationStrategy::Synchronize),
            _ => Err(format!(
                "Replication strategy can only be one of: OVERWRITE|SYNCHRONIZE (got {})",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StateConfig {
    /// Background snapshot cadence
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_retry_dir")]
    pub retry_dir: PathBuf,
}

fn default_snapshot_interval_ms() -> u64 {
    5000
}

fn default_retry_dir() -> PathBuf {
    default_home_dir().join("retry")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: default_snapshot_interval_ms(),
            retry_dir: default_retry_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Override with RUST_LOG env var
    #[serde(default = "default_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info,hms_mirror=debug".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// ~/.hms-mirror
pub fn default_home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hms-mirror")
}

/// ~/.hms-mirror/cfg/default.yaml
pub fn default_config_path() -> PathBuf {
    default_home_dir().join("cfg").join("default.yaml")
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".into()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".into()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from a YAML file. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Couldn't locate configuration file: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.expand_paths()?;
        Ok(config)
    }

    fn expand_paths(&mut self) -> Result<()> {
        self.state.retry_dir = expand_tilde(&self.state.retry_dir)?;
        Ok(())
    }

    /// Cross-field checks. Any failure here is fatal before stage work begins.
    pub fn validate(&self) -> Result<()> {
        let stage = self.stage.ok_or_else(|| {
            Error::Validation("Stage (METADATA|STORAGE) has not been specified".into())
        })?;

        if self.databases.is_empty() && self.db_regex.is_none() {
            return Err(Error::Validation("No databases specified".into()));
        }

        if self.commit_to_upper && !self.share_storage {
            return Err(Error::Validation(
                "Can't commit schema (purgeable) unless using 'Shared Storage'".into(),
            ));
        }

        if self.metadata.disaster_recovery && stage != Stage::Metadata {
            return Err(Error::Validation(
                "Disaster-Recovery option is only valid with the METADATA stage".into(),
            ));
        }

        if self.storage.migrate_acid
            && !(stage == Stage::Storage
                && matches!(
                    self.storage.strategy,
                    StorageStrategy::ExportImport | StorageStrategy::Hybrid
                ))
        {
            return Err(Error::Validation(
                "ACID migration only supported in STORAGE stage with the EXPORT_IMPORT or HYBRID strategies"
                    .into(),
            ));
        }

        if self.metadata.concurrency == 0 || self.storage.concurrency == 0 {
            return Err(Error::Validation("Concurrency must be at least 1".into()));
        }

        let blank = |v: &Option<String>| matches!(v.as_deref(), Some(v) if v.trim().is_empty());
        for (database, tables) in &self.translations {
            for (table, translation) in tables {
                if blank(&translation.rename) || blank(&translation.location) {
                    return Err(Error::Validation(format!(
                        "Translation for {}.{} has an empty rename or location",
                        database, table
                    )));
                }
            }
        }

        if self.state.snapshot_interval_ms == 0 {
            return Err(Error::Validation(
                "state.snapshot_interval_ms must be greater than 0".into(),
            ));
        }

        // Surface bad patterns now rather than mid-setup.
        self.database_filter()?;
        self.table_filter()?;

        Ok(())
    }

    pub fn cluster(&self, environment: Environment) -> &ClusterConfig {
        self.clusters.get(environment)
    }

    /// Worker pool size for a stage
    pub fn concurrency(&self, stage: Stage) -> usize {
        match stage {
            Stage::Metadata => self.metadata.concurrency,
            Stage::Storage => self.storage.concurrency,
        }
    }

    pub fn database_filter(&self) -> Result<Option<Regex>> {
        self.db_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(Error::from)
    }

    pub fn table_filter(&self) -> Result<Option<Regex>> {
        self.tbl_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(Error::from)
    }

    /// Name of the database on the UPPER cluster
    pub fn upper_database(&self, database: &str) -> String {
        match &self.db_prefix {
            Some(prefix) => format!("{}{}", prefix, database),
            None => database.to_string(),
        }
    }

    pub fn translation(&self, database: &str, table: &str) -> Option<&TableTranslation> {
        self.translations.get(database)?.get(table)
    }

    /// Name of the table on the UPPER cluster
    pub fn upper_table(&self, database: &str, table: &str) -> String {
        self.translation(database, table)
            .and_then(|t| t.rename.clone())
            .unwrap_or_else(|| table.to_string())
    }

    /// Explicit UPPER location for the table, if one is configured
    pub fn location_override(&self, database: &str, table: &str) -> Option<&str> {
        self.translation(database, table)?.location.as_deref()
    }

    /// Name of the intermediate database used by the TRANSITION strategy
    pub fn transfer_database(&self, database: &str) -> String {
        format!("{}{}", self.transfer.transfer_prefix, database)
    }

    pub fn export_dir(&self, database: &str, table: &str) -> String {
        format!(
            "{}{}/{}",
            self.transfer.export_base_dir_prefix, database, table
        )
    }
}
