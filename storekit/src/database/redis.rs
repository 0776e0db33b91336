// storekit/src/database/redis.rs
//
// Pooled Redis backend shared by both topologies.
//
// The single-node pool uses bb8-redis' manager; the cluster pool wraps a
// ClusterClient so both speak the same ConnectionLike interface and the
// backend is written once.

use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use parking_lot::RwLock;
use redis::aio::ConnectionLike;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{RedisError, Value};
use tracing::{info, warn};

use super::command::{pack_pipeline, KvCommand, PipelineReplies};
use super::factory::{node_url, KvBackend, Topology};
use crate::config::{RedisConfig, REDIS_MIN_IDLE, REDIS_POOL_SIZE};
use crate::errors::StoreError;

/// bb8 manager for cluster connections
pub struct ClusterConnectionManager {
    client: ClusterClient,
}

impl ClusterConnectionManager {
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let nodes: Vec<String> = config
            .cluster_nodes()
            .iter()
            .map(|node| node_url(node))
            .collect();
        info!("Connecting to Redis cluster nodes: {:?}", nodes);

        let mut builder = ClusterClient::builder(nodes);
        if !config.password.is_empty() {
            builder = builder.password(config.password.clone());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl ManageConnection for ClusterConnectionManager {
    type Connection = ClusterConnection;
    type Error = RedisError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.client.get_async_connection().await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        let pong: String = redis::cmd("PING").query_async(conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err((redis::ErrorKind::ResponseError, "ping request").into())
        }
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled backend over any Redis connection manager
pub struct PooledBackend<M: ManageConnection> {
    pool: RwLock<Option<Pool<M>>>,
    topology: Topology,
}

impl<M> PooledBackend<M>
where
    M: ManageConnection<Error = RedisError>,
    M::Connection: ConnectionLike + Send,
{
    /// Build the pool and warm `REDIS_MIN_IDLE` connections.
    pub async fn connect(manager: M, topology: Topology) -> Result<Self, StoreError> {
        let pool = Pool::builder()
            .max_size(REDIS_POOL_SIZE)
            .min_idle(Some(REDIS_MIN_IDLE))
            .build(manager)
            .await
            .map_err(|e| StoreError::ConnectionError(format!("Redis pool setup failed: {}", e)))?;

        info!(
            "Redis pool ready ({} topology, max {} connections, {} idle)",
            topology, REDIS_POOL_SIZE, REDIS_MIN_IDLE
        );
        Ok(Self {
            pool: RwLock::new(Some(pool)),
            topology,
        })
    }

    fn pool(&self) -> Result<Pool<M>, StoreError> {
        self.pool.read().clone().ok_or(StoreError::Closed)
    }
}

#[async_trait]
impl<M> KvBackend for PooledBackend<M>
where
    M: ManageConnection<Error = RedisError>,
    M::Connection: ConnectionLike + Send,
{
    async fn ping(&self) -> Result<(), StoreError> {
        let pool = self.pool()?;
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }

    async fn execute(&self, command: &KvCommand) -> Result<Value, StoreError> {
        let pool = self.pool()?;
        let mut conn = pool.get().await?;
        let value: Value = command.to_cmd().query_async(&mut *conn).await?;
        Ok(value)
    }

    async fn execute_pipeline(&self, commands: &[KvCommand]) -> Result<PipelineReplies, StoreError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let pipe = pack_pipeline(commands);

        let pool = self.pool()?;
        let mut conn = pool.get().await?;
        // Raw replies keep the results of commands that ran before a failing one.
        let replies = conn.req_packed_commands(&pipe, 0, commands.len()).await?;
        Ok(replies.into_iter().map(reply_outcome).collect())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        match self.pool.write().take() {
            Some(pool) => {
                let state = pool.state();
                info!(
                    "Closing Redis {} pool ({} connections, {} idle)",
                    self.topology, state.connections, state.idle_connections
                );
                Ok(())
            }
            None => {
                warn!("Redis {} pool already closed", self.topology);
                Err(StoreError::Closed)
            }
        }
    }

    fn topology(&self) -> Topology {
        self.topology
    }
}

fn reply_outcome(reply: Value) -> Result<Value, StoreError> {
    match reply {
        Value::ServerError(err) => Err(RedisError::from(err).into()),
        other => Ok(other),
    }
}
