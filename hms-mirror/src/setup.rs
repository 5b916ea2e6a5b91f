//! Collection pass run once before the first stage of a fresh run.
//!
//! Resolves the databases, lists and filters their tables, and fills in each
//! table's LOWER view and UPPER existence. Runs before any task exists, so it
//! is the only code that adds databases or tables to a conversion.

use crate::config::Config;
use crate::mirror::{Environment, SharedConversion, TableMirror};
use crate::replication::MetastoreCatalog;
use crate::{Error, Result};

/// Collect every table for the configured databases into the conversion.
///
/// Returns the number of tables collected. Any error aborts the whole pass.
pub async fn collect(
    conversion: &SharedConversion,
    catalog: &dyn MetastoreCatalog,
    config: &Config,
) -> Result<usize> {
    let databases = resolve_databases(catalog, config).await?;
    if databases.is_empty() {
        return Err(Error::Setup("No databases matched the configuration".into()));
    }
    let table_filter = config.table_filter()?;
    let mut collected = 0;

    for database in databases {
        let tables: Vec<String> = catalog
            .tables(Environment::Lower, &database)
            .await?
            .into_iter()
            .filter(|t| table_filter.as_ref().map(|re| re.is_match(t)).unwrap_or(true))
            .collect();
        tracing::info!(db = %database, tables = tables.len(), "Collecting tables");

        let mut mirrors = Vec::with_capacity(tables.len());
        for table in &tables {
            mirrors.push(collect_table(catalog, config, &database, table).await?);
        }

        // Tables are added only here, before any stage runs.
        let mut conversion = conversion.write();
        let db = conversion.add_database(&database);
        for mirror in mirrors {
            let slot = db.add_table(&mirror.name);
            slot.lower = mirror.lower;
            slot.upper = mirror.upper;
            collected += 1;
        }
    }

    tracing::info!(tables = collected, "Setup complete");
    Ok(collected)
}

async fn resolve_databases(catalog: &dyn MetastoreCatalog, config: &Config) -> Result<Vec<String>> {
    let available = catalog.databases(Environment::Lower).await?;

    if !config.databases.is_empty() {
        for database in &config.databases {
            if !available.contains(database) {
                return Err(Error::Setup(format!(
                    "Database '{}' not found on LOWER ({})",
                    database,
                    catalog.name()
                )));
            }
        }
        return Ok(config.databases.clone());
    }

    let filter = config.database_filter()?;
    Ok(available
        .into_iter()
        .filter(|db| filter.as_ref().map(|re| re.is_match(db)).unwrap_or(false))
        .collect())
}

async fn collect_table(
    catalog: &dyn MetastoreCatalog,
    config: &Config,
    database: &str,
    table: &str,
) -> Result<TableMirror> {
    let mut mirror = TableMirror::new(database, table);

    mirror.lower.definition = catalog
        .table_definition(Environment::Lower, database, table)
        .await?
        .ok_or_else(|| {
            Error::Setup(format!(
                "Table '{}.{}' listed but has no definition on LOWER",
                database, table
            ))
        })?;
    mirror.lower.exists = true;
    mirror.lower.partitions = catalog
        .partitions(Environment::Lower, database, table)
        .await?;

    let upper_db = config.upper_database(database);
    let upper_table = config.upper_table(database, table);
    if let Some(definition) = catalog
        .table_definition(Environment::Upper, &upper_db, &upper_table)
        .await?
    {
        tracing::debug!(db = %upper_db, table = %upper_table, "Table exists on UPPER");
        mirror.upper.exists = true;
        mirror.upper.definition = definition;
    }

    Ok(mirror)
}
