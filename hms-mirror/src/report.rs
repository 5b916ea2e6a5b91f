//! Markdown run report

use crate::mirror::{Conversion, TableMirror};
use crate::stage::Stage;
use std::fmt;

/// Render the whole conversion: run header, phase tally, config, one table per
/// database and the statement plan for every table that produced one.
pub fn render_markdown(conversion: &Conversion) -> String {
    MarkdownReport(conversion).to_string()
}

struct MarkdownReport<'a>(&'a Conversion);

impl fmt::Display for MarkdownReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conversion = self.0;
        let config = &conversion.config;
        let mode = if config.execute { "EXECUTE" } else { "DRY-RUN" };
        let (stage, strategy) = match config.stage {
            Some(Stage::Metadata) => ("METADATA".to_string(), config.metadata.strategy.to_string()),
            Some(Stage::Storage) => ("STORAGE".to_string(), config.storage.strategy.to_string()),
            None => ("-".to_string(), "-".to_string()),
        };

        writeln!(f, "# HMS-Mirror {} ({}) - {}", stage, strategy, mode)?;
        writeln!(f)?;
        writeln!(f, "Run started: {}", conversion.start.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f)?;
        writeln!(f, "```")?;
        writeln!(f, "{}", conversion)?;
        writeln!(f, "```")?;
        writeln!(f)?;

        writeln!(f, "## Phase States")?;
        writeln!(f)?;
        writeln!(f, "| Phase State | Tables |")?;
        writeln!(f, "|---|---|")?;
        for (state, count) in conversion.phase_counts() {
            writeln!(f, "| {} | {} |", state, count)?;
        }
        writeln!(f)?;

        writeln!(f, "## Config")?;
        writeln!(f)?;
        writeln!(f, "```yaml")?;
        match serde_yaml::to_string(config) {
            Ok(yaml) => write!(f, "{}", yaml)?,
            Err(e) => writeln!(f, "# config could not be rendered: {}", e)?,
        }
        writeln!(f, "```")?;

        for (name, db) in &conversion.databases {
            writeln!(f)?;
            writeln!(f, "## Database: {}", name)?;
            writeln!(f)?;
            if db.is_empty() {
                writeln!(f, "_No tables collected._")?;
                continue;
            }
            writeln!(
                f,
                "| Table | Phase State | Duration (ms) | Partitions | Added Properties | Issues |"
            )?;
            writeln!(f, "|---|---|---|---|---|---|")?;
            for table in db.table_mirrors.values() {
                writeln!(
                    f,
                    "| {} | {} | {} | {} | {} | {} |",
                    cell(&table.name),
                    table.phase_state,
                    table.stage_duration_ms,
                    table.partition_count(),
                    cell(&table.prop_add.join("\n")),
                    cell(&all_issues(table).join("\n")),
                )?;
            }

            for table in db.table_mirrors.values().filter(|t| !t.actions.is_empty()) {
                writeln!(f)?;
                writeln!(f, "### {}", table.qualified_name())?;
                writeln!(f)?;
                writeln!(f, "```sql")?;
                for action in &table.actions {
                    writeln!(f, "-- {}", action.description)?;
                    writeln!(f, "{};", action.statement)?;
                }
                writeln!(f, "```")?;
            }
        }
        Ok(())
    }
}

/// Table issues followed by side-specific ones, prefixed with their side.
fn all_issues(table: &TableMirror) -> Vec<String> {
    table
        .issues
        .iter()
        .cloned()
        .chain(table.lower.issues.iter().map(|i| format!("LOWER: {}", i)))
        .chain(table.upper.issues.iter().map(|i| format!("UPPER: {}", i)))
        .collect()
}

fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', "<br/>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mirror::PhaseState;

    #[test]
    fn test_report_sections() {
        let mut config = Config {
            stage: Some(Stage::Metadata),
            databases: vec!["sales".into()],
            ..Default::default()
        };
        config.execute = false;
        let mut conversion = Conversion::new(config);
        conversion.add_database("empty_db");
        let db = conversion.add_database("sales");
        let orders = db.add_table("orders");
        orders.phase_state = PhaseState::Error;
        orders.add_issue("ACID Table not supported for METADATA phase");
        orders.upper.add_issue("a|b");
        let customers = db.add_table("customers");
        customers.phase_state = PhaseState::Success;
        customers.add_action("UPPER: Create database", "CREATE DATABASE IF NOT EXISTS `sales`");

        let report = render_markdown(&conversion);
        assert!(report.starts_with("# HMS-Mirror METADATA (DIRECT) - DRY-RUN"));
        assert!(report.contains("| ERROR | 1 |"));
        assert!(report.contains("| SUCCESS | 1 |"));
        assert!(report.contains("```yaml\n"));
        assert!(report.contains("## Database: sales"));
        assert!(report.contains("_No tables collected._"));
        assert!(report.contains("ACID Table not supported for METADATA phase<br/>UPPER: a\\|b"));
        assert!(report.contains("### sales.customers"));
        assert!(report.contains("CREATE DATABASE IF NOT EXISTS `sales`;"));
        assert!(!report.contains("### sales.orders"));
    }
}
