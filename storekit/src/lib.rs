//! Handlers for the two stores a service talks to: a ClickHouse analytics
//! store (query, insert, all-or-nothing batch insert) and a Redis key-value
//! store in single-node or cluster topology.
//!
//! Constructors connect and ping before returning, so a handler value always
//! has a live client behind it. Operational failures are logged through the
//! handler's tracing span.

pub mod config;
pub mod database;
pub mod errors;
pub mod metrics;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::{load_config, ClickHouseConfig, ObservabilityConfig, RedisConfig, ToolkitConfig};
pub use database::{ClickHouseHandler, KvPipeline, PipelineReplies, RedisHandler, Topology};
pub use errors::{StoreError, TxStage};
pub use redis::Value as KvValue;
pub use types::{BoundRow, ColumnValue};
