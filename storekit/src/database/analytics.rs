use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, Span};

use super::clickhouse::ClickHouseConnection;
use super::connection::{AnalyticsConnection, AnalyticsTransaction};
use super::query_builder::QueryBuilder;
use crate::config::{ClickHouseConfig, CLICKHOUSE_READ_TIMEOUT};
use crate::errors::{StoreError, TxStage};
use crate::metrics;
use crate::types::{BoundRow, ColumnValue};

const BACKEND: &str = "clickhouse";

/// Handler over one pooled analytics-store connection.
///
/// Every write runs in its own transaction: a failure at any step rolls the
/// whole call back, so a batch is never partially committed.
pub struct ClickHouseHandler<C: AnalyticsConnection = ClickHouseConnection> {
    config: ClickHouseConfig,
    conn: C,
    insert_sql: String,
    timeout: Duration,
    span: Span,
}

impl ClickHouseHandler<ClickHouseConnection> {
    /// Connect and ping; a handler only exists once the store answered.
    pub async fn new(config: &ClickHouseConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let conn = ClickHouseConnection::new(config);
        Self::with_connection(config, conn).await
    }
}

impl<C: AnalyticsConnection> ClickHouseHandler<C> {
    pub async fn with_connection(config: &ClickHouseConfig, conn: C) -> Result<Self, StoreError> {
        config.validate()?;
        let span = info_span!("clickhouse", database = %config.database, table = %config.table);

        match tokio::time::timeout(CLICKHOUSE_READ_TIMEOUT, conn.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(parent: &span, "ClickHouse connection failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                error!(parent: &span, "ClickHouse ping timed out");
                return Err(StoreError::TimeoutError(CLICKHOUSE_READ_TIMEOUT));
            }
        }

        let insert_sql =
            QueryBuilder::build_insert_template(&config.database, &config.table, &config.data_schema);
        info!(parent: &span, "ClickHouse connected, insert template: {}", insert_sql);
        metrics::handler_connected(BACKEND);

        Ok(Self {
            config: config.clone(),
            conn,
            insert_sql,
            timeout: CLICKHOUSE_READ_TIMEOUT,
            span,
        })
    }

    /// Route this handler's log events through a caller-supplied span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The INSERT statement rendered from the configured column list.
    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Run a read query and deserialize the result rows.
    pub async fn query<T>(&self, query: &str) -> Result<Vec<T>, StoreError>
    where
        T: clickhouse::Row + DeserializeOwned + Send + 'static,
    {
        let start = Instant::now();
        let result = self.bounded(self.conn.fetch_all(query)).await;
        if let Err(ref e) = result {
            error!(parent: &self.span, "ClickHouse query failed: {}", e);
        }
        metrics::record_operation("query", BACKEND, result.is_ok(), start.elapsed().as_secs_f64());
        result
    }

    /// Insert one row in its own transaction.
    pub async fn insert(&self, query: &str, params: &[ColumnValue]) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self
            .bounded(self.write_rows(query, std::slice::from_ref(&params)))
            .await;
        metrics::record_operation("insert", BACKEND, result.is_ok(), start.elapsed().as_secs_f64());
        result
    }

    /// Insert all rows in one transaction; the first failing row aborts the batch.
    pub async fn batch_insert(&self, query: &str, rows: &[BoundRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            error!(parent: &self.span, "ClickHouse batch insert called without rows");
            return Err(StoreError::MissingRows);
        }

        let start = Instant::now();
        let result = self.bounded(self.write_rows(query, rows)).await;
        metrics::record_operation(
            "batch_insert",
            BACKEND,
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result
    }

    async fn write_rows<R>(&self, query: &str, rows: &[R]) -> Result<(), StoreError>
    where
        R: AsRef<[ColumnValue]> + Sync,
    {
        let mut tx = self.conn.begin().await.map_err(|e| {
            error!(parent: &self.span, "ClickHouse failed to open transaction: {}", e);
            e
        })?;

        let executed = self.exec_rows(&mut tx, query, rows).await;
        match executed {
            Ok(()) => tx.commit().await.map_err(|e| {
                error!(parent: &self.span, "ClickHouse transaction commit failed: {}", e);
                e
            }),
            Err(e) => {
                // Rollback is cleanup only; its own failure is not reported.
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn exec_rows<R>(
        &self,
        tx: &mut C::Transaction,
        query: &str,
        rows: &[R],
    ) -> Result<(), StoreError>
    where
        R: AsRef<[ColumnValue]> + Sync,
    {
        let statement = match tx.prepare(query).await {
            Ok(Some(statement)) => statement,
            Ok(None) => {
                error!(parent: &self.span, "ClickHouse prepared statement is empty");
                return Err(StoreError::EmptyStatement);
            }
            Err(e) => {
                error!(parent: &self.span, "ClickHouse failed to prepare statement: {}", e);
                return Err(e);
            }
        };

        if rows.len() > 1 {
            info!(parent: &self.span, "Ready to insert {} rows", rows.len());
        }
        for (index, row) in rows.iter().enumerate() {
            tx.exec(&statement, row.as_ref()).await.map_err(|e| {
                error!(parent: &self.span, "ClickHouse write failed at row {}: {}", index, e);
                match e {
                    StoreError::TransactionError { .. } => e,
                    other => StoreError::transaction(TxStage::Exec, other.to_string()),
                }
            })?;
        }
        Ok(())
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                error!(parent: &self.span, "ClickHouse operation timed out after {:?}", self.timeout);
                Err(StoreError::TimeoutError(self.timeout))
            }
        }
    }
}

impl<C: AnalyticsConnection> Drop for ClickHouseHandler<C> {
    fn drop(&mut self) {
        metrics::handler_released(BACKEND);
    }
}
