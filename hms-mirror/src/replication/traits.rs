use crate::config::Config;
use crate::mirror::{Environment, TableMirror};
use crate::Result;
use async_trait::async_trait;

/// Schema replication steps used by the METADATA stage.
///
/// Implementations record what they do on the table (actions, SQL logs,
/// issues). An `Err` marks the table `ERROR`; it never stops the stage.
#[async_trait]
pub trait SchemaReplicator: Send + Sync {
    /// DIRECT: create the UPPER table from the (feature-corrected) UPPER definition.
    async fn build_upper_schema(&self, table: &mut TableMirror, config: &Config) -> Result<()>;

    /// TRANSITION step 1: transfer table on LOWER in `<transfer_prefix><db>`.
    async fn build_transfer_schema(&self, table: &mut TableMirror, config: &Config)
        -> Result<()>;

    /// TRANSITION step 2: export the transfer table's metadata from LOWER.
    async fn export_schema(&self, table: &mut TableMirror, config: &Config) -> Result<()>;

    /// TRANSITION step 3: import on UPPER, pointing at the LOWER data location.
    async fn import_transfer_schema(&self, table: &mut TableMirror, config: &Config)
        -> Result<()>;
}

/// One call per STORAGE strategy
#[async_trait]
pub trait DataTransfer: Send + Sync {
    async fn sql(&self, table: &mut TableMirror, config: &Config) -> Result<()>;

    async fn export_import(&self, table: &mut TableMirror, config: &Config) -> Result<()>;

    /// Picks SQL or EXPORT_IMPORT per table.
    async fn hybrid(&self, table: &mut TableMirror, config: &Config) -> Result<()>;

    async fn distcp(&self, table: &mut TableMirror, config: &Config) -> Result<()>;
}

/// Statement execution against a cluster's HiveServer2
#[async_trait]
pub trait ConnectionPools: Send + Sync {
    async fn execute(&self, environment: Environment, statement: &str) -> Result<()>;

    /// Human-readable backend name
    fn name(&self) -> &str;
}

/// Source of databases, tables and captured definitions for the setup pass.
#[async_trait]
pub trait MetastoreCatalog: Send + Sync {
    /// Databases on the given side
    async fn databases(&self, environment: Environment) -> Result<Vec<String>>;

    /// Tables of a database on the given side; empty when the database is absent.
    async fn tables(&self, environment: Environment, database: &str) -> Result<Vec<String>>;

    /// `SHOW CREATE TABLE` output, one line per entry. `None` when the table is absent.
    async fn table_definition(
        &self,
        environment: Environment,
        database: &str,
        table: &str,
    ) -> Result<Option<Vec<String>>>;

    /// Partition specs, e.g. `dt=2026-01-01/region=eu`
    async fn partitions(
        &self,
        environment: Environment,
        database: &str,
        table: &str,
    ) -> Result<Vec<String>>;

    fn name(&self) -> &str;
}
