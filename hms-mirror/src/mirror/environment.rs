use super::StatementPair;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// What the target side should do with the table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateStrategy {
    #[default]
    Nothing,
    Create,
    Drop,
    Replace,
    Leave,
}

/// One cluster-side view of a table.
///
/// `definition` holds the captured `SHOW CREATE TABLE` output one line per entry.
/// Feature rewrites operate on it in place; everything else (partitioning,
/// table properties, location) is read back through the accessors below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentTable {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub create_strategy: CreateStrategy,
    #[serde(default)]
    pub definition: Vec<String>,
    #[serde(default)]
    pub partitions: Vec<String>,
    #[serde(default)]
    pub add_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub sql: Vec<StatementPair>,
}

fn table_property_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*'([^']+)'\s*=\s*'([^']*)'").expect("table property pattern is valid")
    })
}

impl EnvironmentTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partitions.is_empty()
    }

    /// Value of a `TBLPROPERTIES` entry, if the definition carries one.
    pub fn table_property(&self, key: &str) -> Option<String> {
        let start = self
            .definition
            .iter()
            .position(|line| line.trim_start().to_uppercase().starts_with("TBLPROPERTIES"))?;

        self.definition[start..].iter().find_map(|line| {
            let body = line
                .trim_start()
                .trim_start_matches("TBLPROPERTIES")
                .trim_start()
                .trim_start_matches('(');
            table_property_regex()
                .captures(body)
                .filter(|caps| caps[1].eq_ignore_ascii_case(key))
                .map(|caps| caps[2].to_string())
        })
    }

    /// Hive ACID (transactional) table
    pub fn is_transactional(&self) -> bool {
        self.table_property("transactional")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// `LOCATION` clause, unquoted. Handles both the split and single-line forms.
    pub fn location(&self) -> Option<String> {
        let idx = self
            .definition
            .iter()
            .position(|line| line.trim().to_uppercase().starts_with("LOCATION"))?;

        let inline = self.definition[idx].trim()["LOCATION".len()..].trim();
        let raw = if inline.is_empty() {
            self.definition.get(idx + 1)?.trim()
        } else {
            inline
        };
        let unquoted = raw.trim_matches(|c| c == '\'' || c == '"');
        if unquoted.is_empty() {
            None
        } else {
            Some(unquoted.to_string())
        }
    }

    pub fn is_external(&self) -> bool {
        self.definition
            .first()
            .map(|line| line.to_uppercase().contains("CREATE EXTERNAL TABLE"))
            .unwrap_or(false)
    }

    pub fn add_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.add_properties.insert(key.into(), value.into());
    }

    /// Same issue twice is recorded once.
    pub fn add_issue(&mut self, issue: impl Into<String>) {
        let issue = issue.into();
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }

    pub fn add_sql(&mut self, description: impl Into<String>, statement: impl Into<String>) {
        self.sql.push(StatementPair::new(description, statement));
    }
}
