//! Per-side cluster settings (LOWER / UPPER).

use crate::mirror::Environment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ClustersConfig {
    #[serde(default)]
    pub lower: ClusterConfig,
    #[serde(default)]
    pub upper: ClusterConfig,
}

impl ClustersConfig {
    pub fn get(&self, environment: Environment) -> &ClusterConfig {
        match environment {
            Environment::Lower => &self.lower,
            Environment::Upper => &self.upper,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ClusterConfig {
    /// Hive 1/2 cluster. Managed tables read from a legacy LOWER are converted
    /// to EXTERNAL on UPPER, with `external.table.purge` set from data ownership.
    #[serde(default)]
    pub legacy_hive: bool,

    /// Filesystem namespace prefix for table locations, e.g. `hdfs://lower-nn:8020`.
    #[serde(default)]
    pub hcfs_namespace: String,

    #[serde(default)]
    pub hive_server2: HiveServer2Config,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct HiveServer2Config {
    #[serde(default)]
    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_class_name: Option<String>,

    #[serde(default)]
    pub connection_properties: BTreeMap<String, String>,
}

impl ClusterConfig {
    /// Rewrite a LOWER location onto this cluster's namespace.
    ///
    /// Locations that don't start with `from_namespace` are returned untouched.
    pub fn translate_location(&self, location: &str, from_namespace: &str) -> String {
        if from_namespace.is_empty() || self.hcfs_namespace.is_empty() {
            return location.to_string();
        }
        match location.strip_prefix(from_namespace) {
            Some(rest) => format!("{}{}", self.hcfs_namespace.trim_end_matches('/'), rest),
            None => location.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_location() {
        let upper = ClusterConfig {
            hcfs_namespace: "hdfs://upper:8020".into(),
            ..Default::default()
        };
        assert_eq!(
            upper.translate_location("hdfs://lower:8020/warehouse/db/t", "hdfs://lower:8020"),
            "hdfs://upper:8020/warehouse/db/t"
        );
        assert_eq!(
            upper.translate_location("s3a://bucket/db/t", "hdfs://lower:8020"),
            "s3a://bucket/db/t"
        );
    }
}
