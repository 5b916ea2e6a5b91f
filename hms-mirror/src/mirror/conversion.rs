use super::{DbMirror, PhaseState, TableMirror};
use crate::config::Config;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Conversion shared between the stage runner, its tasks and the snapshot loop.
///
/// The lock is only ever held for map lookups, single-table write-backs and
/// snapshot serialization, never across an await point.
pub type SharedConversion = Arc<RwLock<Conversion>>;

/// The whole run: every database and table plus the configuration it ran with.
///
/// This is exactly what the retry file contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub start: DateTime<Utc>,
    pub config: Config,
    #[serde(default)]
    pub databases: BTreeMap<String, DbMirror>,
}

impl Conversion {
    pub fn new(config: Config) -> Self {
        Self {
            start: Utc::now(),
            config,
            databases: BTreeMap::new(),
        }
    }

    pub fn into_shared(self) -> SharedConversion {
        Arc::new(RwLock::new(self))
    }

    /// Returns the existing entry when the database is already present.
    pub fn add_database(&mut self, database: &str) -> &mut DbMirror {
        self.databases
            .entry(database.to_string())
            .or_insert_with(|| DbMirror::new(database))
    }

    pub fn database(&self, database: &str) -> Option<&DbMirror> {
        self.databases.get(database)
    }

    pub fn table(&self, database: &str, table: &str) -> Option<&TableMirror> {
        self.databases.get(database)?.table(table)
    }

    pub fn table_mut(&mut self, database: &str, table: &str) -> Option<&mut TableMirror> {
        self.databases.get_mut(database)?.table_mut(table)
    }

    /// All tables, database-major then table-minor
    pub fn tables(&self) -> impl Iterator<Item = &TableMirror> {
        self.databases
            .values()
            .flat_map(|db| db.table_mirrors.values())
    }

    pub fn table_count(&self) -> usize {
        self.databases.values().map(DbMirror::len).sum()
    }

    pub fn partition_count(&self) -> usize {
        self.tables().map(TableMirror::partition_count).sum()
    }

    /// Number of tables per phase state, in lifecycle order; zero counts omitted.
    pub fn phase_counts(&self) -> Vec<(PhaseState, usize)> {
        PhaseState::all()
            .iter()
            .map(|state| {
                let count = self
                    .tables()
                    .filter(|t| t.phase_state == *state)
                    .count();
                (*state, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

impl std::fmt::Display for Conversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Conversion:")?;
        writeln!(f, "\tDatabases : {}", self.databases.len())?;
        writeln!(f, "\tTables    : {}", self.table_count())?;
        write!(f, "\tPartitions: {}", self.partition_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_database_is_idempotent() {
        let mut conversion = Conversion::new(Config::default());
        conversion.add_database("sales").add_table("orders");
        conversion.add_database("sales").add_table("customers");

        assert_eq!(conversion.databases.len(), 1);
        assert_eq!(conversion.table_count(), 2);
    }

    #[test]
    fn test_databases_iterate_in_name_order() {
        let mut conversion = Conversion::new(Config::default());
        for db in ["warehouse", "audit", "marketing"] {
            conversion.add_database(db);
        }
        let names: Vec<_> = conversion.databases.keys().cloned().collect();
        assert_eq!(names, vec!["audit", "marketing", "warehouse"]);
    }

    #[test]
    fn test_summary_and_counts() {
        let mut conversion = Conversion::new(Config::default());
        let db = conversion.add_database("sales");
        db.add_table("orders").lower.partitions =
            vec!["dt=2026-01-01".into(), "dt=2026-01-02".into()];
        db.add_table("customers").phase_state = PhaseState::Success;

        assert_eq!(conversion.partition_count(), 2);
        assert_eq!(
            conversion.phase_counts(),
            vec![(PhaseState::Init, 1), (PhaseState::Success, 1)]
        );

        let summary = conversion.to_string();
        assert!(summary.contains("Databases : 1"));
        assert!(summary.contains("Tables    : 2"));
        assert!(summary.contains("Partitions: 2"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut conversion = Conversion::new(Config::default());
        let tbl = conversion.add_database("sales").add_table("orders");
        tbl.phase_state = PhaseState::Error;
        tbl.add_issue("ACID Table not supported for METADATA phase");
        tbl.add_action("Create table", "CREATE EXTERNAL TABLE orders ...");

        let yaml = serde_yaml::to_string(&conversion).unwrap();
        let restored: Conversion = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored, conversion);
    }
}
