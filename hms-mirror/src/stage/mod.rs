//! Stages and their per-table tasks
//!
//! A stage walks every table of the conversion once. Eligible tables become a
//! [`StageTask`] on the stage's [`WorkerPool`]; the [`StageRunner`] waits for all
//! of them before returning.

mod metadata;
mod pool;
mod runner;
mod storage;

pub use pool::WorkerPool;
pub use runner::{StageRunner, StageSummary};

use crate::config::Config;
use crate::feature::FeatureSet;
use crate::mirror::{PhaseState, SharedConversion, TableMirror};
use crate::replication::{DataTransfer, SchemaReplicator};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Replicate table definitions to UPPER
    Metadata,
    /// Move table data to UPPER
    Storage,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Metadata => write!(f, "METADATA"),
            Stage::Storage => write!(f, "STORAGE"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "METADATA" => Ok(Stage::Metadata),
            "STORAGE" => Ok(Stage::Storage),
            _ => Err(format!("Stage can only be one of: METADATA|STORAGE (got {})", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataStrategy {
    /// Build the UPPER schema straight from the LOWER definition
    #[default]
    Direct,
    /// Go through a transfer table in `<transfer_prefix><db>` and an export/import
    Transition,
}

impl std::fmt::Display for MetadataStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataStrategy::Direct => write!(f, "DIRECT"),
            MetadataStrategy::Transition => write!(f, "TRANSITION"),
        }
    }
}

impl std::str::FromStr for MetadataStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DIRECT" => Ok(MetadataStrategy::Direct),
            "TRANSITION" => Ok(MetadataStrategy::Transition),
            _ => Err(format!(
                "Metadata strategy can only be one of: DIRECT|TRANSITION (got {})",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageStrategy {
    Sql,
    ExportImport,
    #[default]
    Hybrid,
    Distcp,
}

impl std::fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageStrategy::Sql => write!(f, "SQL"),
            StorageStrategy::ExportImport => write!(f, "EXPORT_IMPORT"),
            StorageStrategy::Hybrid => write!(f, "HYBRID"),
            StorageStrategy::Distcp => write!(f, "DISTCP"),
        }
    }
}

impl std::str::FromStr for StorageStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "SQL" => Ok(StorageStrategy::Sql),
            "EXPORT_IMPORT" => Ok(StorageStrategy::ExportImport),
            "HYBRID" => Ok(StorageStrategy::Hybrid),
            "DISTCP" => Ok(StorageStrategy::Distcp),
            _ => Err(format!(
                "Storage strategy can only be one of: SQL|EXPORT_IMPORT|HYBRID|DISTCP (got {})",
                s
            )),
        }
    }
}

/// Everything a task needs besides the table it owns.
pub struct StageContext {
    pub config: Arc<Config>,
    pub replicator: Arc<dyn SchemaReplicator>,
    pub transfer: Arc<dyn DataTransfer>,
    pub features: FeatureSet,
    /// Flips to `true` when the run is being cancelled
    pub shutdown: watch::Receiver<bool>,
}

impl StageContext {
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// One unit of stage work, bound to a strategy. Applied to one table at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTask {
    Metadata(MetadataStrategy),
    Storage(StorageStrategy),
}

impl StageTask {
    /// Task for the stage and strategy selected in the config.
    pub fn for_config(config: &Config) -> Result<Self> {
        match config.stage {
            Some(Stage::Metadata) => Ok(StageTask::Metadata(config.metadata.strategy)),
            Some(Stage::Storage) => Ok(StageTask::Storage(config.storage.strategy)),
            None => Err(Error::Validation(
                "Stage (METADATA|STORAGE) has not been specified".into(),
            )),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            StageTask::Metadata(_) => Stage::Metadata,
            StageTask::Storage(_) => Stage::Storage,
        }
    }

    pub fn strategy_name(&self) -> String {
        match self {
            StageTask::Metadata(strategy) => strategy.to_string(),
            StageTask::Storage(strategy) => strategy.to_string(),
        }
    }

    /// Reason the table can't run in this stage at all. Checked before scheduling.
    pub fn precondition(&self, table: &TableMirror) -> Option<&'static str> {
        match self {
            StageTask::Metadata(_) => metadata::precondition(table),
            StageTask::Storage(_) => None,
        }
    }

    /// Run the strategy against the table. Errors are the table's, not the stage's.
    pub async fn dispatch(&self, table: &mut TableMirror, context: &StageContext) -> Result<()> {
        match self {
            StageTask::Metadata(strategy) => metadata::dispatch(*strategy, table, context).await,
            StageTask::Storage(strategy) => storage::dispatch(*strategy, table, context).await,
        }
    }

    /// Full lifecycle for one owned table: claim, dispatch, record the outcome.
    ///
    /// The table is written back to the shared conversion when claimed and again
    /// when finished, so snapshots see `STARTED` for in-flight work.
    pub async fn execute(
        self,
        mut table: TableMirror,
        context: Arc<StageContext>,
        conversion: SharedConversion,
    ) -> PhaseState {
        tracing::info!(strategy = %self.strategy_name(), "Migrating");
        table.start_stage();
        write_back(&conversion, &table);

        if context.is_cancelled() {
            table.fail(Error::Cancelled("run stopped before dispatch".into()).to_string());
        } else {
            match self.dispatch(&mut table, &context).await {
                Ok(()) => table.finish_stage(PhaseState::Success),
                Err(e) => {
                    tracing::warn!(error = %e, "Table failed");
                    table.fail(e.to_string());
                }
            }
        }

        tracing::info!(
            state = %table.phase_state,
            elapsed_ms = table.stage_duration_ms,
            "Migration complete"
        );
        let state = table.phase_state;
        write_back(&conversion, &table);
        state
    }
}

/// Replace the shared copy of a table with the task's copy.
pub(crate) fn write_back(conversion: &SharedConversion, table: &TableMirror) {
    let mut conversion = conversion.write();
    if let Some(slot) = conversion.table_mut(&table.db_name, &table.name) {
        *slot = table.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("metadata".parse::<Stage>().unwrap(), Stage::Metadata);
        assert_eq!(
            "transition".parse::<MetadataStrategy>().unwrap(),
            MetadataStrategy::Transition
        );
        assert_eq!(
            "export-import".parse::<StorageStrategy>().unwrap(),
            StorageStrategy::ExportImport
        );
        assert!("schema_extract".parse::<MetadataStrategy>().is_err());
    }

    #[test]
    fn test_strategy_serde_names() {
        assert_eq!(
            serde_yaml::to_string(&StorageStrategy::ExportImport).unwrap().trim(),
            "EXPORT_IMPORT"
        );
        assert_eq!(StorageStrategy::ExportImport.to_string(), "EXPORT_IMPORT");
    }

    #[test]
    fn test_task_for_config() {
        let mut config = Config::default();
        assert!(StageTask::for_config(&config).is_err());

        config.stage = Some(Stage::Storage);
        config.storage.strategy = StorageStrategy::Distcp;
        let task = StageTask::for_config(&config).unwrap();
        assert_eq!(task, StageTask::Storage(StorageStrategy::Distcp));
        assert_eq!(task.stage(), Stage::Storage);
        assert_eq!(task.strategy_name(), "DISTCP");
    }

    #[test]
    fn test_metadata_rejects_transactional() {
        let mut table = TableMirror::new("sales", "orders");
        table.lower.definition = vec![
            "TBLPROPERTIES (".into(),
            "  'transactional'='true')".into(),
        ];
        let metadata = StageTask::Metadata(MetadataStrategy::Direct);
        assert!(metadata.precondition(&table).is_some());
        assert!(StageTask::Storage(StorageStrategy::Sql)
            .precondition(&table)
            .is_none());
    }
}
