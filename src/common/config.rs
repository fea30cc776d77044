//! Configuration for replikv
//!
//! Loaded from an optional TOML file, then overridden by `REPLIKV_*`
//! environment variables (nested keys use `__`, e.g. `REPLIKV_NODES__N1`).

use crate::common::{Error, Result};
use crate::replica::ConsistencyLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "REPLIKV";

/// Finder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the local node; preferred target for full reads
    #[serde(default)]
    pub node_name: String,

    /// Class (collection) the finder serves
    pub class: String,

    /// Level used when the caller does not pick one
    #[serde(default)]
    pub consistency_level: ConsistencyLevel,

    /// Per-RPC deadline on the read path
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Deadline for a background repair write
    #[serde(default = "default_repair_timeout")]
    pub repair_timeout_ms: u64,

    /// Node name → host address
    #[serde(default)]
    pub nodes: BTreeMap<String, String>,

    /// Shard name → replica node names (owner first)
    #[serde(default)]
    pub shards: BTreeMap<String, Vec<String>>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_read_timeout() -> u64 {
    5_000
}
fn default_repair_timeout() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            class: String::new(),
            consistency_level: ConsistencyLevel::default(),
            read_timeout_ms: default_read_timeout(),
            repair_timeout_ms: default_repair_timeout(),
            nodes: BTreeMap::new(),
            shards: BTreeMap::new(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from an optional file plus environment, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.class.trim().is_empty() {
            return Err(Error::InvalidConfig("class cannot be empty".into()));
        }
        if self.read_timeout_ms == 0 || self.repair_timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeouts must be positive".into()));
        }
        if let Some((shard, _)) = self.shards.iter().find(|(_, nodes)| nodes.is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "shard {} has no replicas",
                shard
            )));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn repair_timeout(&self) -> Duration {
        Duration::from_millis(self.repair_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
node_name = "n1"
class = "Article"
consistency_level = "ALL"
read_timeout_ms = 250

[nodes]
n1 = "10.0.0.1:8300"
n2 = "10.0.0.2:8300"

[shards]
s1 = ["n1", "n2"]
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.class, "Article");
        assert_eq!(config.consistency_level, ConsistencyLevel::All);
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.repair_timeout_ms, 30_000);
        assert_eq!(config.nodes["n2"], "10.0.0.2:8300");
        assert_eq!(config.shards["s1"], vec!["n1", "n2"]);
    }

    #[test]
    fn test_validate() {
        let mut config = Config {
            class: "Article".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.shards.insert("s1".into(), vec![]);
        assert!(config.validate().is_err());

        config.shards.clear();
        config.read_timeout_ms = 0;
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_err());
    }
}
