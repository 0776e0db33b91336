use async_trait::async_trait;
use clickhouse::Client;
use serde::de::DeserializeOwned;
use tracing::info;

use super::connection::{AnalyticsConnection, AnalyticsTransaction};
use super::query_builder::InsertStatement;
use crate::config::{ClickHouseConfig, CLICKHOUSE_MAX_BLOCK_SIZE, CLICKHOUSE_READ_TIMEOUT};
use crate::errors::{StoreError, TxStage};
use crate::types::ColumnValue;

/// ClickHouse connection over the HTTP interface
#[derive(Clone)]
pub struct ClickHouseConnection {
    client: Client,
}

impl ClickHouseConnection {
    /// Build the client from config; no network traffic happens until the first call.
    pub fn new(config: &ClickHouseConfig) -> Self {
        info!(
            "Configuring ClickHouse client for {} (database: {})",
            config.connection_url(),
            config.database
        );

        let client = Client::default()
            .with_url(config.connection_url())
            .with_user(config.username.as_str())
            .with_password(config.password.as_str())
            .with_database(config.database.as_str())
            .with_option("max_block_size", CLICKHOUSE_MAX_BLOCK_SIZE.to_string())
            .with_option(
                "receive_timeout",
                CLICKHOUSE_READ_TIMEOUT.as_secs().to_string(),
            );

        Self { client }
    }
}

#[async_trait]
impl AnalyticsConnection for ClickHouseConnection {
    type Transaction = ClickHouseTransaction;

    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .query("SELECT 1")
            .execute()
            .await
            .map_err(|e| StoreError::ConnectionError(format!("ClickHouse ping failed: {}", e)))
    }

    async fn fetch_all<T>(&self, query: &str) -> Result<Vec<T>, StoreError>
    where
        T: clickhouse::Row + DeserializeOwned + Send + 'static,
    {
        Ok(self.client.query(query).fetch_all::<T>().await?)
    }

    async fn begin(&self) -> Result<ClickHouseTransaction, StoreError> {
        Ok(ClickHouseTransaction {
            client: self.client.clone(),
            statement: None,
            params: Vec::new(),
            rows: 0,
        })
    }
}

/// Pending insert block.
///
/// Nothing reaches the server before `commit`, which sends every buffered row
/// as one INSERT so the block lands whole or not at all.
pub struct ClickHouseTransaction {
    client: Client,
    statement: Option<InsertStatement>,
    params: Vec<ColumnValue>,
    rows: usize,
}

#[async_trait]
impl AnalyticsTransaction for ClickHouseTransaction {
    async fn prepare(&mut self, query: &str) -> Result<Option<InsertStatement>, StoreError> {
        if self.statement.is_some() {
            return Err(StoreError::transaction(
                TxStage::Prepare,
                "a statement is already prepared in this transaction",
            ));
        }
        let statement = InsertStatement::parse(query)?;
        self.statement = statement.clone();
        Ok(statement)
    }

    async fn exec(
        &mut self,
        statement: &InsertStatement,
        params: &[ColumnValue],
    ) -> Result<(), StoreError> {
        if self.statement.as_ref() != Some(statement) {
            return Err(StoreError::transaction(
                TxStage::Exec,
                "statement was not prepared in this transaction",
            ));
        }
        statement.check_arity(params)?;
        self.params.extend_from_slice(params);
        self.rows += 1;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let statement = match self.statement {
            Some(statement) if self.rows > 0 => statement,
            _ => return Ok(()),
        };

        let mut query = self.client.query(&statement.render_block(self.rows));
        for value in &self.params {
            query = query.bind(value);
        }
        query
            .execute()
            .await
            .map_err(|e| StoreError::transaction(TxStage::Commit, e.to_string()))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
