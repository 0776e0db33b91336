use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::database::Topology;
use crate::errors::StoreError;

pub const CLICKHOUSE_MAX_BLOCK_SIZE: u64 = 100_000;
pub const CLICKHOUSE_READ_TIMEOUT: Duration = Duration::from_secs(90);
pub const REDIS_POOL_SIZE: u32 = 800;
pub const REDIS_MIN_IDLE: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub table: String,
    /// Column order used to bind every insert.
    pub data_schema: Vec<String>,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            username: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
            table: String::new(),
            data_schema: Vec::new(),
        }
    }
}

impl ClickHouseConfig {
    pub fn connection_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.host.trim().is_empty() {
            return Err(StoreError::ConfigError("ClickHouse host is empty".to_string()));
        }
        if self.database.trim().is_empty() || self.table.trim().is_empty() {
            return Err(StoreError::ConfigError(
                "ClickHouse database and table must both be set".to_string(),
            ));
        }
        if self.data_schema.is_empty() {
            return Err(StoreError::ConfigError(
                "ClickHouse data_schema needs at least one column".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Single address, or a comma-separated node list in cluster mode.
    pub host: String,
    pub password: String,
    /// Logical database index; ignored in cluster mode.
    pub database: i64,
    pub is_cluster: bool,
    pub enable: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:6379".to_string(),
            password: String::new(),
            database: 0,
            is_cluster: false,
            enable: true,
        }
    }
}

impl RedisConfig {
    pub fn topology(&self) -> Topology {
        if self.is_cluster {
            Topology::Cluster
        } else {
            Topology::Single
        }
    }

    pub fn cluster_nodes(&self) -> Vec<String> {
        self.host
            .split(',')
            .map(str::trim)
            .filter(|node| !node.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.host.trim().is_empty() {
            return Err(StoreError::ConfigError("Redis host is empty".to_string()));
        }
        if self.is_cluster && !self.host.contains(',') {
            return Err(StoreError::ConfigError(
                "Redis cluster addresses must be separated by commas".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    pub clickhouse: Option<ClickHouseConfig>,
    pub redis: Option<RedisConfig>,
    pub observability: ObservabilityConfig,
}

/// Loads a config file and applies `STOREKIT__SECTION__KEY` environment overrides.
pub fn load_config(path: &str) -> Result<ToolkitConfig, StoreError> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("STOREKIT").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}
