use super::{Environment, EnvironmentTable, PhaseState, StatementPair};
use crate::feature::FeatureSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Migration record for one table.
///
/// Owned by exactly one stage task while that stage runs. The LOWER and UPPER
/// views are separate values; nothing written to one is visible in the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMirror {
    pub name: String,
    pub db_name: String,
    #[serde(default)]
    pub phase_state: PhaseState,

    /// Set when a stage task claims the table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stage_duration_ms: u64,

    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub actions: Vec<StatementPair>,
    /// Properties added to the UPPER definition, `key=value`
    #[serde(default)]
    pub prop_add: Vec<String>,

    pub lower: EnvironmentTable,
    /// `definition` here is what setup captured on UPPER, if the table existed
    pub upper: EnvironmentTable,

    /// LOWER definition after the feature pipeline; replayed as the UPPER schema
    #[serde(default)]
    pub replay: Vec<String>,
}

impl TableMirror {
    pub fn new(db_name: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            lower: EnvironmentTable::new(name.clone()),
            upper: EnvironmentTable::new(name.clone()),
            name,
            db_name: db_name.into(),
            phase_state: PhaseState::Init,
            stage_start: None,
            stage_duration_ms: 0,
            issues: Vec::new(),
            actions: Vec::new(),
            prop_add: Vec::new(),
            replay: Vec::new(),
        }
    }

    /// `db.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.db_name, self.name)
    }

    pub fn environment(&self, environment: Environment) -> &EnvironmentTable {
        match environment {
            Environment::Lower => &self.lower,
            Environment::Upper => &self.upper,
        }
    }

    pub fn environment_mut(&mut self, environment: Environment) -> &mut EnvironmentTable {
        match environment {
            Environment::Lower => &mut self.lower,
            Environment::Upper => &mut self.upper,
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.lower.is_transactional()
    }

    pub fn partition_count(&self) -> usize {
        self.lower.partitions.len()
    }

    /// Claim the table for a stage task.
    ///
    /// The statement plan of an earlier attempt is dropped; issues are kept.
    pub fn start_stage(&mut self) {
        self.actions.clear();
        self.lower.sql.clear();
        self.upper.sql.clear();
        self.stage_start = Some(Utc::now());
        self.phase_state = PhaseState::Started;
    }

    /// Close out the stage with a terminal state and record the elapsed time.
    pub fn finish_stage(&mut self, state: PhaseState) {
        if let Some(start) = self.stage_start {
            let elapsed = Utc::now().signed_duration_since(start);
            self.stage_duration_ms = elapsed.num_milliseconds().max(0) as u64;
        }
        self.phase_state = state;
    }

    /// Record a failure and move to `Error`.
    pub fn fail(&mut self, issue: impl Into<String>) {
        self.add_issue(issue);
        self.finish_stage(PhaseState::Error);
    }

    pub fn add_issue(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }

    pub fn add_action(&mut self, description: impl Into<String>, statement: impl Into<String>) {
        self.actions.push(StatementPair::new(description, statement));
    }

    /// Add a property to the UPPER definition and note it for the report.
    ///
    /// A later value for the same key replaces the earlier one.
    pub fn add_upper_property(&mut self, key: &str, value: &str) {
        self.upper.add_property(key, value);
        let prefix = format!("{}=", key);
        self.prop_add.retain(|entry| !entry.starts_with(&prefix));
        self.prop_add.push(format!("{}{}", prefix, value));
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Copy the LOWER definition into `replay` and run the feature pipeline over the copy.
    ///
    /// Returns the names of the features that rewrote the definition. Both
    /// captured definitions are left as they are.
    pub fn prepare_replay(&mut self, features: &FeatureSet) -> Vec<&'static str> {
        self.replay = self.lower.definition.clone();
        let applied = features.apply(&mut self.replay);
        for name in &applied {
            self.upper
                .add_issue(format!("Schema adjusted by feature '{}'", name));
        }
        applied
    }
}
