use super::MetastoreCatalog;
use crate::mirror::Environment;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Catalog over a directory of captured definitions.
///
/// Layout:
///
/// ```text
/// <root>/lower/<db>/<table>.sql         SHOW CREATE TABLE output
/// <root>/lower/<db>/<table>.partitions  one partition spec per line (optional)
/// <root>/upper/<db>/<table>.sql         present when the table exists on UPPER
/// ```
#[derive(Debug, Clone)]
pub struct DdlDirectoryCatalog {
    root: PathBuf,
}

impl DdlDirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn side_dir(&self, environment: Environment) -> PathBuf {
        self.root.join(environment.to_string().to_lowercase())
    }

    fn table_file(
        &self,
        environment: Environment,
        database: &str,
        table: &str,
        extension: &str,
    ) -> PathBuf {
        self.side_dir(environment)
            .join(database)
            .join(format!("{}.{}", table, extension))
    }
}

/// Sorted entry names of `dir` passing `keep`. Missing dir means no entries.
async fn list_entries(
    dir: &Path,
    keep: impl Fn(&Path, bool) -> Option<String>,
) -> Result<Vec<String>> {
    if !tokio::fs::try_exists(dir).await? {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let is_dir = entry.file_type().await?.is_dir();
        if let Some(name) = keep(&entry.path(), is_dir) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl MetastoreCatalog for DdlDirectoryCatalog {
    async fn databases(&self, environment: Environment) -> Result<Vec<String>> {
        list_entries(&self.side_dir(environment), |path, is_dir| {
            if !is_dir {
                return None;
            }
            path.file_name().map(|n| n.to_string_lossy().into_owned())
        })
        .await
    }

    async fn tables(&self, environment: Environment, database: &str) -> Result<Vec<String>> {
        let dir = self.side_dir(environment).join(database);
        list_entries(&dir, |path, is_dir| {
            if is_dir || path.extension().map(|e| e != "sql").unwrap_or(true) {
                return None;
            }
            path.file_stem().map(|n| n.to_string_lossy().into_owned())
        })
        .await
    }

    async fn table_definition(
        &self,
        environment: Environment,
        database: &str,
        table: &str,
    ) -> Result<Option<Vec<String>>> {
        let path = self.table_file(environment, database, table, "sql");
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        while lines.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
            lines.pop();
        }
        if lines.is_empty() {
            return Err(Error::Setup(format!(
                "Empty table definition: {}",
                path.display()
            )));
        }
        Ok(Some(lines))
    }

    async fn partitions(
        &self,
        environment: Environment,
        database: &str,
        table: &str,
    ) -> Result<Vec<String>> {
        let path = self.table_file(environment, database, table, "partitions");
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &str {
        "ddl-directory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_lists_databases_and_tables_sorted() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "lower/sales/orders.sql", "CREATE TABLE `orders`(\n");
        write(temp.path(), "lower/sales/customers.sql", "CREATE TABLE `customers`(\n");
        write(temp.path(), "lower/sales/orders.partitions", "dt=1\n");
        write(temp.path(), "lower/audit/log.sql", "CREATE TABLE `log`(\n");

        let catalog = DdlDirectoryCatalog::new(temp.path());
        assert_eq!(
            catalog.databases(Environment::Lower).await.unwrap(),
            vec!["audit", "sales"]
        );
        assert_eq!(
            catalog.tables(Environment::Lower, "sales").await.unwrap(),
            vec!["customers", "orders"]
        );
        assert!(catalog.databases(Environment::Upper).await.unwrap().is_empty());
        assert!(catalog
            .tables(Environment::Upper, "sales")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_definition_and_partitions() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "lower/sales/orders.sql",
            "CREATE TABLE `orders`(\n  `id` bigint)\nPARTITIONED BY (\n  `dt` string)\n\n",
        );
        write(temp.path(), "lower/sales/orders.partitions", "dt=2026-01-01\n\ndt=2026-01-02\n");

        let catalog = DdlDirectoryCatalog::new(temp.path());
        let def = catalog
            .table_definition(Environment::Lower, "sales", "orders")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(def.len(), 4);
        assert_eq!(
            catalog
                .partitions(Environment::Lower, "sales", "orders")
                .await
                .unwrap(),
            vec!["dt=2026-01-01", "dt=2026-01-02"]
        );
        assert!(catalog
            .table_definition(Environment::Upper, "sales", "orders")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_definition_is_an_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "lower/sales/broken.sql", "\n\n");
        let catalog = DdlDirectoryCatalog::new(temp.path());
        assert!(catalog
            .table_definition(Environment::Lower, "sales", "broken")
            .await
            .is_err());
    }
}
