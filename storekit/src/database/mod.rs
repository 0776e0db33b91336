pub mod analytics;
pub mod clickhouse;
pub mod command;
pub mod connection;
pub mod factory;
pub mod kv;
pub mod query_builder;
pub mod redis;

#[cfg(test)]
pub(crate) mod memory;

pub use self::analytics::ClickHouseHandler;
pub use self::clickhouse::{ClickHouseConnection, ClickHouseTransaction};
pub use self::command::{KvCommand, KvPipeline, PipelineReplies};
pub use self::connection::{AnalyticsConnection, AnalyticsTransaction};
pub use self::factory::{KvBackend, RedisFactory, Topology};
pub use self::kv::RedisHandler;
pub use self::query_builder::{InsertStatement, QueryBuilder};
pub use self::redis::{ClusterConnectionManager, PooledBackend};
