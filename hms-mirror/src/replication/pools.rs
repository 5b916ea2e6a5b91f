use super::ConnectionPools;
use crate::mirror::Environment;
use crate::{Error, Result};
use async_trait::async_trait;

/// Pools for a build without a HiveServer2 driver.
///
/// Every statement fails, so an `--execute` run marks each table `ERROR`
/// with the reason while dry-runs never get here.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedPools;

#[async_trait]
impl ConnectionPools for DisconnectedPools {
    async fn execute(&self, environment: Environment, statement: &str) -> Result<()> {
        tracing::warn!(%environment, statement, "No HiveServer2 connection available");
        Err(Error::Connection {
            environment: environment.to_string(),
            reason: "no HiveServer2 driver is linked into this build".into(),
        })
    }

    fn name(&self) -> &str {
        "disconnected"
    }
}
