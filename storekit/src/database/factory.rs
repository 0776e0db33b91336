// storekit/src/database/factory.rs
//
// Factory Pattern for key-value topology selection
// Supports: single node, cluster
//

use std::sync::Arc;
use async_trait::async_trait;
use redis::{FromRedisValue, Value};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RedisConfig;
use crate::errors::StoreError;
use super::command::{KvCommand, PipelineReplies};
use super::redis::{ClusterConnectionManager, PooledBackend};

/// Key-value store topologies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    #[default]
    Single,
    Cluster,
}

impl From<&str> for Topology {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cluster" | "clustered" => Topology::Cluster,
            _ => Topology::Single,
        }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::Single => f.write_str("single"),
            Topology::Cluster => f.write_str("cluster"),
        }
    }
}

/// One logical key-value client, whatever the topology behind it.
///
/// Backends implement the transport (`execute`, `execute_pipeline`); the
/// typed operations are provided once on top of it.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
    async fn execute(&self, command: &KvCommand) -> Result<Value, StoreError>;
    /// Send `commands` in one round trip and return one outcome per command.
    ///
    /// On a cluster every command must map to the same hash slot. The outer
    /// error means the pipeline could not be sent at all.
    async fn execute_pipeline(&self, commands: &[KvCommand]) -> Result<PipelineReplies, StoreError>;
    async fn shutdown(&self) -> Result<(), StoreError>;
    fn topology(&self) -> Topology;

    async fn set(&self, key: &str, value: &str, expiry: Option<std::time::Duration>) -> Result<(), StoreError> {
        self.execute(&KvCommand::Set {
            key: key.to_string(),
            value: value.to_string(),
            expiry,
        })
        .await
        .map(drop)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.execute(&KvCommand::Get { key: key.to_string() }).await?;
        convert(&value)
    }

    async fn hset(&self, key: &str, pairs: Vec<(String, String)>) -> Result<i64, StoreError> {
        let value = self
            .execute(&KvCommand::HashSet { key: key.to_string(), pairs })
            .await?;
        convert(&value)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .execute(&KvCommand::HashGet {
                key: key.to_string(),
                field: field.to_string(),
            })
            .await?;
        convert(&value)
    }

    async fn hmset(&self, key: &str, pairs: Vec<(String, String)>) -> Result<(), StoreError> {
        self.execute(&KvCommand::HashMultiSet { key: key.to_string(), pairs })
            .await
            .map(drop)
    }

    async fn hmget(&self, key: &str, fields: Vec<String>) -> Result<Vec<Option<String>>, StoreError> {
        let value = self
            .execute(&KvCommand::HashMultiGet { key: key.to_string(), fields })
            .await?;
        convert(&value)
    }

    async fn hdel(&self, key: &str, fields: Vec<String>) -> Result<i64, StoreError> {
        let value = self
            .execute(&KvCommand::HashDelete { key: key.to_string(), fields })
            .await?;
        convert(&value)
    }

    async fn hlen(&self, key: &str) -> Result<i64, StoreError> {
        let value = self.execute(&KvCommand::HashLength { key: key.to_string() }).await?;
        convert(&value)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let value = self
            .execute(&KvCommand::ListRange { key: key.to_string(), start, stop })
            .await?;
        convert(&value)
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        self.execute(&KvCommand::ListTrim { key: key.to_string(), start, stop })
            .await
            .map(drop)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        let value = self
            .execute(&KvCommand::ListPrepend {
                key: key.to_string(),
                value: value.to_string(),
            })
            .await?;
        convert(&value)
    }

    async fn bf_add(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let value = self
            .execute(&KvCommand::FilterAdd {
                key: key.to_string(),
                value: value.to_string(),
            })
            .await?;
        convert(&value)
    }

    async fn bf_exists(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let value = self
            .execute(&KvCommand::FilterExists {
                key: key.to_string(),
                value: value.to_string(),
            })
            .await?;
        convert(&value)
    }
}

fn convert<T: FromRedisValue>(value: &Value) -> Result<T, StoreError> {
    Ok(redis::from_redis_value(value)?)
}

/// Key-value backend factory
pub struct RedisFactory;

impl RedisFactory {
    /// Create a pooled backend for the configured topology
    pub async fn create(config: &RedisConfig) -> Result<Arc<dyn KvBackend>, StoreError> {
        config.validate()?;
        let topology = config.topology();
        info!("Creating Redis backend with topology: {}", topology);

        match topology {
            Topology::Single => {
                let manager = bb8_redis::RedisConnectionManager::new(single_node_info(config)?)?;
                Ok(Arc::new(PooledBackend::connect(manager, topology).await?))
            }
            Topology::Cluster => {
                let manager = ClusterConnectionManager::new(config)?;
                Ok(Arc::new(PooledBackend::connect(manager, topology).await?))
            }
        }
    }
}

/// Connection info for a single node; accepts `host:port` or a full `redis://` URL.
pub(crate) fn single_node_info(config: &RedisConfig) -> Result<redis::ConnectionInfo, StoreError> {
    use redis::IntoConnectionInfo;

    let url = node_url(config.host.trim());
    let mut info = url.as_str().into_connection_info()?;
    info.redis.db = config.database;
    if !config.password.is_empty() {
        info.redis.password = Some(config.password.clone());
    }
    Ok(info)
}

pub(crate) fn node_url(node: &str) -> String {
    if node.starts_with("redis://") || node.starts_with("rediss://") {
        node.to_string()
    } else {
        format!("redis://{}", node)
    }
}
