//! Migration record types
//!
//! - `Conversion`: the whole run, persisted as the retry file
//! - `DbMirror`: one database
//! - `TableMirror`: one table, the unit of concurrency
//! - `EnvironmentTable`: one cluster-side view of a table

pub mod conversion;
pub mod database;
pub mod environment;
pub mod table;

pub use conversion::{Conversion, SharedConversion};
pub use database::DbMirror;
pub use environment::{CreateStrategy, EnvironmentTable};
pub use table::TableMirror;

use serde::{Deserialize, Serialize};

/// Cluster side of a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    /// Source cluster
    Lower,
    /// Target cluster
    Upper,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Lower => write!(f, "LOWER"),
            Environment::Upper => write!(f, "UPPER"),
        }
    }
}

/// Per-table progress marker. The only input to scheduling decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    #[default]
    Init,
    /// Claimed by a task that hasn't finished. Seen after a crash.
    Started,
    Error,
    Success,
    /// Succeeded in an earlier run and skipped by this one.
    RetrySkippedPastSuccess,
}

/// What a stage does with a table in a given phase state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduling {
    Run,
    /// Previously successful; move to `RetrySkippedPastSuccess` without running.
    SkipPastSuccess,
    /// Already skipped in an earlier retry; leave alone.
    AlreadySkipped,
}

impl PhaseState {
    pub fn scheduling(&self) -> Scheduling {
        match self {
            PhaseState::Init | PhaseState::Started | PhaseState::Error => Scheduling::Run,
            PhaseState::Success => Scheduling::SkipPastSuccess,
            PhaseState::RetrySkippedPastSuccess => Scheduling::AlreadySkipped,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseState::Error | PhaseState::Success | PhaseState::RetrySkippedPastSuccess
        )
    }

    pub fn all() -> &'static [PhaseState] {
        &[
            PhaseState::Init,
            PhaseState::Started,
            PhaseState::Error,
            PhaseState::Success,
            PhaseState::RetrySkippedPastSuccess,
        ]
    }
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseState::Init => write!(f, "INIT"),
            PhaseState::Started => write!(f, "STARTED"),
            PhaseState::Error => write!(f, "ERROR"),
            PhaseState::Success => write!(f, "SUCCESS"),
            PhaseState::RetrySkippedPastSuccess => write!(f, "RETRY_SKIPPED_PAST_SUCCESS"),
        }
    }
}

/// A (description, statement) pair, used for table actions and SQL logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPair {
    pub description: String,
    pub statement: String,
}

impl StatementPair {
    pub fn new(description: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            statement: statement.into(),
        }
    }
}
