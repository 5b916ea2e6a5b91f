//! HiveQL rendition of every strategy.
//!
//! Each step is recorded on the table (per-side SQL log plus table actions)
//! and only sent to the cluster when the run has `execute` set. A dry-run
//! therefore produces the full statement plan without touching either side.

use super::{ConnectionPools, DataTransfer, SchemaReplicator};
use crate::config::{Config, ReplicationStrategy};
use crate::mirror::{CreateStrategy, Environment, TableMirror};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const METADATA_STAGE_PROPERTY: &str = "hms-mirror_Metadata_Stage1";
const STORAGE_STAGE_PROPERTY: &str = "hms-mirror_Storage_Stage2";
const PURGE_PROPERTY: &str = "external.table.purge";
const DISCOVER_PARTITIONS_PROPERTY: &str = "discover.partitions";
const SHADOW_SUFFIX: &str = "_hms_mirror_shadow";

pub struct SqlReplicator {
    pools: Arc<dyn ConnectionPools>,
}

impl SqlReplicator {
    pub fn new(pools: Arc<dyn ConnectionPools>) -> Self {
        Self { pools }
    }

    /// Record a statement on the table and run it when executing.
    async fn run(
        &self,
        table: &mut TableMirror,
        environment: Environment,
        description: &str,
        statement: String,
        config: &Config,
    ) -> Result<()> {
        tracing::debug!(%environment, description, statement = %statement, "Statement");
        table
            .environment_mut(environment)
            .add_sql(description, statement.clone());
        table.add_action(format!("{}: {}", environment, description), statement.clone());
        if config.execute {
            self.pools.execute(environment, &statement).await?;
        }
        Ok(())
    }

    async fn create_upper_database(&self, table: &mut TableMirror, config: &Config) -> Result<()> {
        let upper_db = config.upper_database(&table.db_name);
        self.run(
            table,
            Environment::Upper,
            "Create database",
            format!("CREATE DATABASE IF NOT EXISTS `{}`", upper_db),
            config,
        )
        .await
    }

    /// Decide what happens to an existing UPPER table and drop it when replacing.
    ///
    /// Returns false when the existing table is to be left alone.
    async fn prepare_upper_table(&self, table: &mut TableMirror, config: &Config) -> Result<bool> {
        if !table.upper.exists {
            table.upper.create_strategy = CreateStrategy::Create;
            return Ok(true);
        }
        match config.replication_strategy {
            ReplicationStrategy::Overwrite => {
                table.upper.create_strategy = CreateStrategy::Replace;
                let target = upper_target(table, config);
                self.run(
                    table,
                    Environment::Upper,
                    "Drop existing table",
                    format!("DROP TABLE IF EXISTS {}", target),
                    config,
                )
                .await?;
                Ok(true)
            }
            ReplicationStrategy::Synchronize => {
                table.upper.create_strategy = CreateStrategy::Leave;
                table
                    .upper
                    .add_issue("Table exists on UPPER; left in place (SYNCHRONIZE)");
                Ok(false)
            }
        }
    }

    /// Properties and partition discovery on a freshly created UPPER table.
    async fn finish_upper_table(&self, table: &mut TableMirror, config: &Config) -> Result<()> {
        let target = upper_target(table, config);
        if !table.upper.add_properties.is_empty() {
            let statement = set_properties_statement(&target, &table.upper.add_properties);
            self.run(table, Environment::Upper, "Set table properties", statement, config)
                .await?;
        }
        if table.lower.is_partitioned() {
            self.run(
                table,
                Environment::Upper,
                "Discover partitions",
                format!("MSCK REPAIR TABLE {}", target),
                config,
            )
            .await?;
        }
        Ok(())
    }

    fn add_metadata_properties(&self, table: &mut TableMirror, config: &Config) {
        table.add_upper_property(METADATA_STAGE_PROPERTY, &timestamp());
        if !table.lower.is_external() && config.cluster(Environment::Lower).legacy_hive {
            table
                .upper
                .add_issue("Legacy managed table converted to EXTERNAL on UPPER");
            let owns_data = config.commit_to_upper && !config.metadata.disaster_recovery;
            table.add_upper_property(PURGE_PROPERTY, if owns_data { "true" } else { "false" });
        }
        if table.lower.is_partitioned() {
            table.add_upper_property(DISCOVER_PARTITIONS_PROPERTY, "true");
        }
    }

    fn add_storage_properties(&self, table: &mut TableMirror) {
        table.add_upper_property(STORAGE_STAGE_PROPERTY, &timestamp());
        if !table.lower.is_external() && !table.is_transactional() {
            table.add_upper_property(PURGE_PROPERTY, "true");
        }
        if table.lower.is_partitioned() {
            table.add_upper_property(DISCOVER_PARTITIONS_PROPERTY, "true");
        }
    }

    /// Data location for the table on UPPER when the data moves (or is shared).
    fn upper_location(table: &TableMirror, config: &Config) -> Option<String> {
        if let Some(location) = config.location_override(&table.db_name, &table.name) {
            return Some(location.to_string());
        }
        let lower = table.lower.location()?;
        if config.share_storage {
            return Some(lower);
        }
        let from = &config.cluster(Environment::Lower).hcfs_namespace;
        let translated = config
            .cluster(Environment::Upper)
            .translate_location(&lower, from);
        let upper_name = config.upper_table(&table.db_name, &table.name);
        Some(follow_rename(translated, &table.name, &upper_name))
    }

    /// Location for an UPPER table that keeps reading the LOWER data.
    fn linked_location(table: &TableMirror, config: &Config) -> Option<String> {
        config
            .location_override(&table.db_name, &table.name)
            .map(str::to_string)
            .or_else(|| table.lower.location())
    }

    /// Where EXPORT writes and IMPORT reads.
    fn export_location(table: &TableMirror, config: &Config) -> String {
        let dir = config.export_dir(&table.db_name, &table.name);
        let base = config
            .transfer
            .intermediate_storage
            .as_deref()
            .unwrap_or(&config.cluster(Environment::Lower).hcfs_namespace);
        format!("{}{}", base.trim_end_matches('/'), dir)
    }

    /// ACID tables need `migrate_acid` and an EXPORT based strategy.
    fn check_acid(table: &TableMirror, config: &Config, export_based: bool) -> Result<()> {
        if !table.is_transactional() {
            return Ok(());
        }
        if !export_based {
            return Err(Error::Dispatch(
                "ACID tables can only be migrated with the EXPORT_IMPORT or HYBRID strategies"
                    .into(),
            ));
        }
        if !config.storage.migrate_acid {
            return Err(Error::Dispatch(
                "ACID table migration has not been enabled (--acid)".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaReplicator for SqlReplicator {
    async fn build_upper_schema(&self, table: &mut TableMirror, config: &Config) -> Result<()> {
        let upper_db = config.upper_database(&table.db_name);
        let upper_name = config.upper_table(&table.db_name, &table.name);
        self.create_upper_database(table, config).await?;
        if !self.prepare_upper_table(table, config).await? {
            return Ok(());
        }

        // METADATA leaves the data where it is; UPPER points at the LOWER location.
        let location = Self::linked_location(table, config);
        let statement = create_statement(
            &table.replay,
            &upper_db,
            &upper_name,
            location.as_deref(),
        )?;
        self.run(table, Environment::Upper, "Create table", statement, config)
            .await?;

        self.add_metadata_properties(table, config);
        self.finish_upper_table(table, config).await
    }

    async fn build_transfer_schema(
        &self,
        table: &mut TableMirror,
        config: &Config,
    ) -> Result<()> {
        let transfer_db = config.transfer_database(&table.db_name);
        self.run(
            table,
            Environment::Lower,
            "Create transfer database",
            format!("CREATE DATABASE IF NOT EXISTS `{}`", transfer_db),
            config,
        )
        .await?;

        let location = table.lower.location();
        let statement = create_statement(
            &table.replay,
            &transfer_db,
            &table.name,
            location.as_deref(),
        )?;
        self.run(table, Environment::Lower, "Create transfer table", statement, config)
            .await
    }

    async fn export_schema(&self, table: &mut TableMirror, config: &Config) -> Result<()> {
        let transfer = qualified(&config.transfer_database(&table.db_name), &table.name);
        let export_location = Self::export_location(table, config);
        self.run(
            table,
            Environment::Lower,
            "Export transfer table metadata",
            format!(
                "EXPORT TABLE {} TO '{}' FOR METADATA REPLICATION('hms-mirror')",
                transfer, export_location
            ),
            config,
        )
        .await
    }

    async fn import_transfer_schema(
        &self,
        table: &mut TableMirror,
        config: &Config,
    ) -> Result<()> {
        let target = upper_target(table, config);
        self.create_upper_database(table, config).await?;
        if !self.prepare_upper_table(table, config).await? {
            return Ok(());
        }

        let export_location = Self::export_location(table, config);
        let statement = match Self::linked_location(table, config) {
            Some(location) => format!(
                "IMPORT EXTERNAL TABLE {} FROM '{}' LOCATION '{}'",
                target, export_location, location
            ),
            None => format!("IMPORT EXTERNAL TABLE {} FROM '{}'", target, export_location),
        };
        self.run(table, Environment::Upper, "Import transfer table", statement, config)
            .await?;

        self.add_metadata_properties(table, config);
        self.finish_upper_table(table, config).await
    }
}

#[async_trait]
impl DataTransfer for SqlReplicator {
    async fn sql(&self, table: &mut TableMirror, config: &Config) -> Result<()> {
        Self::check_acid(table, config, false)?;
        if config.share_storage {
            table.add_issue("Shared storage: no data movement required");
            return self.build_upper_schema(table, config).await;
        }

        let upper_db = config.upper_database(&table.db_name);
        let upper_name = config.upper_table(&table.db_name, &table.name);
        let target = qualified(&upper_db, &upper_name);
        let shadow_name = format!("{}{}", upper_name, SHADOW_SUFFIX);
        let shadow = qualified(&upper_db, &shadow_name);
        let lower_location = table.lower.location().ok_or_else(|| {
            Error::Dispatch("No LOCATION in LOWER definition; can't link LOWER data".into())
        })?;

        self.create_upper_database(table, config).await?;
        let statement = create_statement(
            &table.replay,
            &upper_db,
            &shadow_name,
            Some(&lower_location),
        )?;
        self.run(table, Environment::Upper, "Create shadow table", statement, config)
            .await?;
        if table.lower.is_partitioned() {
            self.run(
                table,
                Environment::Upper,
                "Discover shadow partitions",
                format!("MSCK REPAIR TABLE {}", shadow),
                config,
            )
            .await?;
        }

        if self.prepare_upper_table(table, config).await? {
            let location = Self::upper_location(table, config);
            let statement = create_statement(
                &table.replay,
                &upper_db,
                &upper_name,
                location.as_deref(),
            )?;
            self.run(table, Environment::Upper, "Create table", statement, config)
                .await?;
        }

        let keys = partition_keys(&table.lower.partitions);
        if !keys.is_empty() {
            self.run(
                table,
                Environment::Upper,
                "Enable dynamic partitions",
                "SET hive.exec.dynamic.partition.mode=nonstrict".to_string(),
                config,
            )
            .await?;
        }
        let statement = insert_statement(&target, &shadow, &keys);
        self.run(table, Environment::Upper, "Transfer data", statement, config)
            .await?;
        self.run(
            table,
            Environment::Upper,
            "Drop shadow table",
            format!("DROP TABLE IF EXISTS {}", shadow),
            config,
        )
        .await?;

        self.add_storage_properties(table);
        self.finish_upper_table(table, config).await
    }

    async fn export_import(&self, table: &mut TableMirror, config: &Config) -> Result<()> {
        Self::check_acid(table, config, true)?;
        let source = qualified(&table.db_name, &table.name);
        let target = upper_target(table, config);
        let export_location = Self::export_location(table, config);

        self.run(
            table,
            Environment::Lower,
            "Export table",
            format!("EXPORT TABLE {} TO '{}'", source, export_location),
            config,
        )
        .await?;

        self.create_upper_database(table, config).await?;
        if table.upper.exists && config.replication_strategy == ReplicationStrategy::Overwrite {
            self.prepare_upper_table(table, config).await?;
        }

        let statement = if table.is_transactional() {
            match config.location_override(&table.db_name, &table.name) {
                Some(location) => format!(
                    "IMPORT TABLE {} FROM '{}' LOCATION '{}'",
                    target, export_location, location
                ),
                None => format!("IMPORT TABLE {} FROM '{}'", target, export_location),
            }
        } else {
            match Self::upper_location(table, config) {
                Some(location) => format!(
                    "IMPORT EXTERNAL TABLE {} FROM '{}' LOCATION '{}'",
                    target, export_location, location
                ),
                None => format!("IMPORT EXTERNAL TABLE {} FROM '{}'", target, export_location),
            }
        };
        self.run(table, Environment::Upper, "Import table", statement, config)
            .await?;

        self.add_storage_properties(table);
        self.finish_upper_table(table, config).await
    }

    async fn hybrid(&self, table: &mut TableMirror, config: &Config) -> Result<()> {
        let limit = config.storage.export_import_partition_limit;
        if !table.is_transactional() && table.partition_count() > limit {
            tracing::info!(
                partitions = table.partition_count(),
                limit,
                "HYBRID: partition count over EXPORT_IMPORT limit, using SQL"
            );
            self.sql(table, config).await
        } else {
            tracing::info!("HYBRID: using EXPORT_IMPORT");
            self.export_import(table, config).await
        }
    }

    async fn distcp(&self, table: &mut TableMirror, config: &Config) -> Result<()> {
        Self::check_acid(table, config, false)?;
        let lower_location = table.lower.location().ok_or_else(|| {
            Error::Dispatch("No LOCATION in LOWER definition; can't plan distcp".into())
        })?;
        let upper_location = Self::upper_location(table, config)
            .unwrap_or_else(|| lower_location.clone());
        let upper_db = config.upper_database(&table.db_name);
        let upper_name = config.upper_table(&table.db_name, &table.name);

        self.create_upper_database(table, config).await?;
        if self.prepare_upper_table(table, config).await? {
            let statement = create_statement(
                &table.replay,
                &upper_db,
                &upper_name,
                Some(&upper_location),
            )?;
            self.run(table, Environment::Upper, "Create table", statement, config)
                .await?;
        }

        // Not HiveQL; recorded as a plan only.
        table.add_action(
            "LOWER: distcp plan",
            format!("hadoop distcp {} {}", lower_location, upper_location),
        );
        table.add_issue("DISTCP: run the recorded distcp plan before using the UPPER table");

        self.add_storage_properties(table);
        self.finish_upper_table(table, config).await
    }
}

fn qualified(database: &str, table: &str) -> String {
    format!("`{}`.`{}`", database, table)
}

/// The table as named on UPPER, after the database prefix and any rename
fn upper_target(table: &TableMirror, config: &Config) -> String {
    qualified(
        &config.upper_database(&table.db_name),
        &config.upper_table(&table.db_name, &table.name),
    )
}

/// Swap the last path segment of `location` when it is the old table name.
fn follow_rename(location: String, from: &str, to: &str) -> String {
    if from == to {
        return location;
    }
    let renamed = match location.trim_end_matches('/').rsplit_once('/') {
        Some((parent, last)) if last == from => Some(format!("{}/{}", parent, to)),
        _ => None,
    };
    renamed.unwrap_or(location)
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Render a captured definition as `CREATE EXTERNAL TABLE` for `database.table`.
///
/// The header line is rebuilt with the new name; the column list and the rest
/// of the definition are kept. `location` replaces any LOCATION clause.
fn create_statement(
    definition: &[String],
    database: &str,
    table: &str,
    location: Option<&str>,
) -> Result<String> {
    let header = definition
        .iter()
        .position(|line| {
            let upper = line.to_ascii_uppercase();
            upper.contains("CREATE") && upper.contains("TABLE")
        })
        .ok_or_else(|| Error::Dispatch("Definition has no CREATE TABLE line".into()))?;

    let mut lines: Vec<String> = definition[header..].to_vec();
    let columns = lines[0].find('(').map(|idx| &lines[0][idx..]).unwrap_or("");
    lines[0] = format!(
        "CREATE EXTERNAL TABLE IF NOT EXISTS {}{}",
        qualified(database, table),
        columns
    );

    if let Some(location) = location {
        let clause = vec!["LOCATION".to_string(), format!("  '{}'", location)];
        match lines
            .iter()
            .position(|line| line.trim().to_ascii_uppercase().starts_with("LOCATION"))
        {
            Some(idx) => {
                let split_form = lines[idx].trim().len() == "LOCATION".len();
                let end = if split_form {
                    (idx + 2).min(lines.len())
                } else {
                    idx + 1
                };
                lines.splice(idx..end, clause);
            }
            None => {
                let at = lines
                    .iter()
                    .position(|line| line.trim().to_ascii_uppercase().starts_with("TBLPROPERTIES"))
                    .unwrap_or(lines.len());
                lines.splice(at..at, clause);
            }
        }
    }
    Ok(lines.join("\n"))
}

fn set_properties_statement(
    target: &str,
    properties: &std::collections::BTreeMap<String, String>,
) -> String {
    let pairs: Vec<String> = properties
        .iter()
        .map(|(k, v)| format!("'{}'='{}'", k, v))
        .collect();
    format!("ALTER TABLE {} SET TBLPROPERTIES ({})", target, pairs.join(", "))
}

/// Partition column names from the first spec, e.g. `dt=1/region=eu` -> `[dt, region]`.
fn partition_keys(partitions: &[String]) -> Vec<String> {
    partitions
        .first()
        .map(|spec| {
            spec.split('/')
                .filter_map(|part| part.split_once('=').map(|(k, _)| k.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn insert_statement(target: &str, source: &str, partition_keys: &[String]) -> String {
    if partition_keys.is_empty() {
        format!("INSERT OVERWRITE TABLE {} SELECT * FROM {}", target, source)
    } else {
        format!(
            "INSERT OVERWRITE TABLE {} PARTITION ({}) SELECT * FROM {}",
            target,
            partition_keys.join(", "),
            source
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableTranslation;
    use crate::stage::Stage;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPools {
        executed: Mutex<Vec<(Environment, String)>>,
    }

    #[async_trait]
    impl ConnectionPools for RecordingPools {
        async fn execute(&self, environment: Environment, statement: &str) -> Result<()> {
            self.executed.lock().push((environment, statement.to_string()));
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn orders() -> TableMirror {
        let mut table = TableMirror::new("sales", "orders");
        table.lower.definition = vec![
            "CREATE TABLE `orders`(".into(),
            "  `id` bigint,".into(),
            "  `amount` double)".into(),
            "PARTITIONED BY (".into(),
            "  `dt` string)".into(),
            "LOCATION".into(),
            "  'hdfs://lower:8020/warehouse/sales.db/orders'".into(),
            "TBLPROPERTIES (".into(),
            "  'numFiles'='3')".into(),
        ];
        table.lower.partitions = vec!["dt=2026-01-01".into(), "dt=2026-01-02".into()];
        table.replay = table.lower.definition.clone();
        table
    }

    fn config() -> Config {
        let mut config = Config {
            stage: Some(Stage::Metadata),
            databases: vec!["sales".into()],
            db_prefix: Some("dr_".into()),
            ..Default::default()
        };
        config.clusters.lower.legacy_hive = true;
        config.clusters.lower.hcfs_namespace = "hdfs://lower:8020".into();
        config.clusters.upper.hcfs_namespace = "hdfs://upper:8020".into();
        config
    }

    fn translate(config: &mut Config, rename: Option<&str>, location: Option<&str>) {
        config.translations.entry("sales".into()).or_default().insert(
            "orders".into(),
            TableTranslation {
                rename: rename.map(String::from),
                location: location.map(String::from),
            },
        );
    }

    #[test]
    fn test_follow_rename() {
        assert_eq!(
            follow_rename("hdfs://upper:8020/w/sales.db/orders".into(), "orders", "orders_v2"),
            "hdfs://upper:8020/w/sales.db/orders_v2"
        );
        assert_eq!(
            follow_rename("hdfs://upper:8020/w/custom".into(), "orders", "orders_v2"),
            "hdfs://upper:8020/w/custom"
        );
    }

    #[test]
    fn test_create_statement_renames_and_relocates() {
        let table = orders();
        let sql = create_statement(
            &table.replay,
            "dr_sales",
            "orders",
            Some("hdfs://upper:8020/warehouse/sales.db/orders"),
        )
        .unwrap();
        let lines: Vec<&str> = sql.lines().collect();
        assert_eq!(lines[0], "CREATE EXTERNAL TABLE IF NOT EXISTS `dr_sales`.`orders`(");
        assert_eq!(lines[5], "LOCATION");
        assert_eq!(lines[6], "  'hdfs://upper:8020/warehouse/sales.db/orders'");
        assert_eq!(lines[7], "TBLPROPERTIES (");
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn test_create_statement_inserts_missing_location() {
        let def = vec![
            "CREATE TABLE `t`(".to_string(),
            "  `id` int)".to_string(),
            "TBLPROPERTIES (".to_string(),
            "  'a'='b')".to_string(),
        ];
        let sql = create_statement(&def, "db", "t", Some("s3a://bucket/t")).unwrap();
        assert_eq!(
            sql.lines().collect::<Vec<_>>(),
            vec![
                "CREATE EXTERNAL TABLE IF NOT EXISTS `db`.`t`(",
                "  `id` int)",
                "LOCATION",
                "  's3a://bucket/t'",
                "TBLPROPERTIES (",
                "  'a'='b')",
            ]
        );
    }

    #[test]
    fn test_create_statement_requires_header() {
        assert!(create_statement(&["ROW FORMAT SERDE".to_string()], "db", "t", None).is_err());
    }

    #[test]
    fn test_partition_keys_and_insert() {
        let keys = partition_keys(&["dt=2026-01-01/region=eu".to_string()]);
        assert_eq!(keys, vec!["dt", "region"]);
        assert_eq!(
            insert_statement("`a`.`t`", "`a`.`s`", &keys),
            "INSERT OVERWRITE TABLE `a`.`t` PARTITION (dt, region) SELECT * FROM `a`.`s`"
        );
        assert!(partition_keys(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_records_without_executing() {
        let pools = Arc::new(RecordingPools::default());
        let replicator = SqlReplicator::new(pools.clone());
        let mut table = orders();

        replicator.build_upper_schema(&mut table, &config()).await.unwrap();

        assert!(pools.executed.lock().is_empty());
        assert_eq!(table.upper.create_strategy, CreateStrategy::Create);
        let descriptions: Vec<_> = table.actions.iter().map(|a| a.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec![
                "UPPER: Create database",
                "UPPER: Create table",
                "UPPER: Set table properties",
                "UPPER: Discover partitions",
            ]
        );
        assert!(table.actions[1]
            .statement
            .contains("'hdfs://lower:8020/warehouse/sales.db/orders'"));
        assert!(table.prop_add.contains(&"external.table.purge=false".to_string()));
        assert!(table.prop_add.contains(&"discover.partitions=true".to_string()));
        assert_eq!(table.upper.sql.len(), 4);
    }

    #[tokio::test]
    async fn test_managed_table_conversion_only_from_legacy_hive() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut config = config();
        config.clusters.lower.legacy_hive = false;

        let mut table = orders();
        replicator.build_upper_schema(&mut table, &config).await.unwrap();
        assert!(!table.prop_add.iter().any(|p| p.starts_with("external.table.purge=")));
        assert!(table.upper.issues.is_empty());

        config.clusters.lower.legacy_hive = true;
        config.share_storage = true;
        config.commit_to_upper = true;
        let mut table = orders();
        replicator.build_upper_schema(&mut table, &config).await.unwrap();
        assert!(table.prop_add.contains(&"external.table.purge=true".to_string()));
        assert_eq!(
            table.upper.issues,
            vec!["Legacy managed table converted to EXTERNAL on UPPER"]
        );
    }

    #[tokio::test]
    async fn test_direct_with_rename_and_location_override() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut config = config();
        translate(&mut config, Some("orders_v2"), Some("s3a://archive/orders"));
        let mut table = orders();

        replicator.build_upper_schema(&mut table, &config).await.unwrap();

        let create = &table.actions[1].statement;
        assert!(create.starts_with("CREATE EXTERNAL TABLE IF NOT EXISTS `dr_sales`.`orders_v2`("));
        assert!(create.contains("  's3a://archive/orders'"));
        assert!(!create.contains("hdfs://lower:8020"));
        assert!(table
            .actions
            .iter()
            .any(|a| a.statement == "MSCK REPAIR TABLE `dr_sales`.`orders_v2`"));
    }

    #[tokio::test]
    async fn test_sql_rename_moves_location_with_name() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut config = config();
        config.stage = Some(Stage::Storage);
        translate(&mut config, Some("orders_v2"), None);
        let mut table = orders();

        replicator.sql(&mut table, &config).await.unwrap();

        let statements: Vec<&str> = table.upper.sql.iter().map(|s| s.statement.as_str()).collect();
        assert!(statements.iter().any(|s| s.starts_with(
            "CREATE EXTERNAL TABLE IF NOT EXISTS `dr_sales`.`orders_v2_hms_mirror_shadow`("
        )));
        let create = statements
            .iter()
            .find(|s| s.starts_with("CREATE EXTERNAL TABLE IF NOT EXISTS `dr_sales`.`orders_v2`("))
            .unwrap();
        assert!(create.contains("  'hdfs://upper:8020/warehouse/sales.db/orders_v2'"));
        assert!(statements.contains(
            &"INSERT OVERWRITE TABLE `dr_sales`.`orders_v2` PARTITION (dt) SELECT * FROM `dr_sales`.`orders_v2_hms_mirror_shadow`"
        ));
    }

    #[tokio::test]
    async fn test_sql_location_override_wins() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut config = config();
        config.stage = Some(Stage::Storage);
        translate(&mut config, None, Some("s3a://archive/orders"));
        let mut table = orders();

        replicator.sql(&mut table, &config).await.unwrap();

        let create = table
            .upper
            .sql
            .iter()
            .find(|s| s.description == "Create table")
            .unwrap();
        assert!(create.statement.starts_with("CREATE EXTERNAL TABLE IF NOT EXISTS `dr_sales`.`orders`("));
        assert!(create.statement.contains("  's3a://archive/orders'"));
    }

    #[tokio::test]
    async fn test_execute_sends_statements() {
        let pools = Arc::new(RecordingPools::default());
        let replicator = SqlReplicator::new(pools.clone());
        let mut table = orders();
        let mut config = config();
        config.execute = true;

        replicator.build_upper_schema(&mut table, &config).await.unwrap();
        let executed = pools.executed.lock();
        assert_eq!(executed.len(), table.actions.len());
        assert_eq!(
            executed[0],
            (
                Environment::Upper,
                "CREATE DATABASE IF NOT EXISTS `dr_sales`".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_existing_upper_table_synchronize_leaves_it() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut table = orders();
        table.upper.exists = true;

        replicator.build_upper_schema(&mut table, &config()).await.unwrap();
        assert_eq!(table.upper.create_strategy, CreateStrategy::Leave);
        assert_eq!(table.actions.len(), 1);
        assert_eq!(table.upper.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_steps() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut table = orders();
        let config = config();

        replicator.build_transfer_schema(&mut table, &config).await.unwrap();
        replicator.export_schema(&mut table, &config).await.unwrap();
        replicator.import_transfer_schema(&mut table, &config).await.unwrap();

        assert_eq!(table.lower.sql.len(), 3);
        assert!(table.lower.sql[0]
            .statement
            .contains("`hms_mirror_transfer_sales`"));
        assert!(table.lower.sql[2].statement.contains(
            "'hdfs://lower:8020/apps/hive/warehouse/export_sales/orders'"
        ));
        assert!(table
            .upper
            .sql
            .iter()
            .any(|s| s.statement.starts_with("IMPORT EXTERNAL TABLE `dr_sales`.`orders`")));
    }

    #[tokio::test]
    async fn test_storage_acid_requires_opt_in() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut table = orders();
        table.lower.definition[8] = "  'transactional'='true')".into();
        let mut config = config();
        config.stage = Some(Stage::Storage);

        assert!(replicator.export_import(&mut table, &config).await.is_err());
        assert!(replicator.sql(&mut table, &config).await.is_err());

        config.storage.migrate_acid = true;
        replicator.export_import(&mut table, &config).await.unwrap();
        assert!(table
            .upper
            .sql
            .iter()
            .any(|s| s.statement.starts_with("IMPORT TABLE `dr_sales`.`orders`")));
    }

    #[tokio::test]
    async fn test_hybrid_switches_to_sql_over_limit() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut table = orders();
        let mut config = config();
        config.storage.export_import_partition_limit = 1;

        replicator.hybrid(&mut table, &config).await.unwrap();
        assert!(table
            .upper
            .sql
            .iter()
            .any(|s| s.statement.contains("PARTITION (dt) SELECT * FROM `dr_sales`.`orders_hms_mirror_shadow`")));
        assert!(table.lower.sql.is_empty());
    }

    #[tokio::test]
    async fn test_distcp_records_plan() {
        let replicator = SqlReplicator::new(Arc::new(RecordingPools::default()));
        let mut table = orders();
        replicator.distcp(&mut table, &config()).await.unwrap();

        let plan = table
            .actions
            .iter()
            .find(|a| a.description == "LOWER: distcp plan")
            .unwrap();
        assert_eq!(
            plan.statement,
            "hadoop distcp hdfs://lower:8020/warehouse/sales.db/orders hdfs://upper:8020/warehouse/sales.db/orders"
        );
    }
}
