//! hms-mirror: migrate Hive tables between a LOWER and an UPPER cluster
//!
//! A run replicates either schemas (METADATA stage) or data (STORAGE stage)
//! for every table of the selected databases:
//! - per-table phase states drive scheduling and make runs resumable
//! - each stage runs its tables on a bounded worker pool
//! - the whole run is snapshotted to a retry file while it runs
//! - captured definitions are repaired by schema features before replay

pub mod config;
pub mod engine;
pub mod error;
pub mod feature;
pub mod mirror;
pub mod replication;
pub mod report;
pub mod setup;
pub mod stage;
pub mod state;

pub use config::Config;
pub use engine::{Engine, RunOutcome};
pub use error::{Error, Result};
pub use feature::{Feature, FeatureSet};
pub use mirror::{Conversion, DbMirror, Environment, PhaseState, SharedConversion, TableMirror};
pub use stage::{MetadataStrategy, Stage, StageTask, StorageStrategy};
pub use state::StateMaintenance;
