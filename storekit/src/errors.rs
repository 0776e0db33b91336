use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Transaction error at {stage}: {message}")]
    TransactionError { stage: TxStage, message: String },

    #[error("prepared statement is empty")]
    EmptyStatement,

    #[error("Batch insert requires at least one row")]
    MissingRows,

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Handler is closed")]
    Closed,

    #[error("Timeout error: operation timed out after {0:?}")]
    TimeoutError(Duration),
}

/// Step of the begin/prepare/exec/commit skeleton that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Begin,
    Prepare,
    Exec,
    Commit,
}

impl std::fmt::Display for TxStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            TxStage::Begin => "begin",
            TxStage::Prepare => "prepare",
            TxStage::Exec => "exec",
            TxStage::Commit => "commit",
        };
        f.write_str(stage)
    }
}

impl StoreError {
    pub fn transaction(stage: TxStage, message: impl Into<String>) -> Self {
        StoreError::TransactionError {
            stage,
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::CommandError(err.to_string())
    }
}

impl From<bb8::RunError<redis::RedisError>> for StoreError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::User(e) => StoreError::ConnectionError(e.to_string()),
            bb8::RunError::TimedOut => {
                StoreError::PoolError("timed out waiting for a pooled connection".to_string())
            }
        }
    }
}

impl From<clickhouse::error::Error> for StoreError {
    fn from(err: clickhouse::error::Error) -> Self {
        StoreError::QueryError(err.to_string())
    }
}

impl From<config::ConfigError> for StoreError {
    fn from(err: config::ConfigError) -> Self {
        StoreError::ConfigError(err.to_string())
    }
}
