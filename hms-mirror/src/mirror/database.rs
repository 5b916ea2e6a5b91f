use super::TableMirror;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All tables being migrated for one database, in name order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbMirror {
    pub database: String,
    #[serde(default)]
    pub table_mirrors: BTreeMap<String, TableMirror>,
}

impl DbMirror {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table_mirrors: BTreeMap::new(),
        }
    }

    /// Returns the existing entry when the table is already present.
    pub fn add_table(&mut self, table: &str) -> &mut TableMirror {
        let database = &self.database;
        self.table_mirrors
            .entry(table.to_string())
            .or_insert_with(|| TableMirror::new(database.clone(), table))
    }

    pub fn table(&self, table: &str) -> Option<&TableMirror> {
        self.table_mirrors.get(table)
    }

    pub fn table_mut(&mut self, table: &str) -> Option<&mut TableMirror> {
        self.table_mirrors.get_mut(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.table_mirrors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table_mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table_mirrors.is_empty()
    }
}
