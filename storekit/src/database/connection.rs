use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::query_builder::InsertStatement;
use crate::errors::StoreError;
use crate::types::ColumnValue;

/// Pooled connection to the columnar analytics store.
///
/// Handlers are generic over this trait; the production implementation is
/// [`ClickHouseConnection`](super::clickhouse::ClickHouseConnection).
#[async_trait]
pub trait AnalyticsConnection: Send + Sync + 'static {
    type Transaction: AnalyticsTransaction;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Run a read query and deserialize every row into `T`.
    async fn fetch_all<T>(&self, query: &str) -> Result<Vec<T>, StoreError>
    where
        T: clickhouse::Row + DeserializeOwned + Send + 'static;

    async fn begin(&self) -> Result<Self::Transaction, StoreError>;
}

/// One open transaction: prepare a statement, execute rows, then commit or roll back.
#[async_trait]
pub trait AnalyticsTransaction: Send + Sized {
    /// `Ok(None)` means the driver produced no statement without reporting an error.
    async fn prepare(&mut self, query: &str) -> Result<Option<InsertStatement>, StoreError>;

    async fn exec(
        &mut self,
        statement: &InsertStatement,
        params: &[ColumnValue],
    ) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
