//! Database boundary
//!
//! Everything in this crate talks to PostgreSQL through [`Executor`]. The sea-orm
//! implementation lives in `infra::sea_orm_executor`; tests provide their own.

use crate::error::DbResult;
use crate::sql::SqlQuery;
use crate::value::Row;
use async_trait::async_trait;

/// Executes rendered statements against a connection or an open transaction
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement that yields rows, decoded in `query.columns` order
    async fn fetch_all(&self, query: &SqlQuery) -> DbResult<Vec<Row>>;

    /// Run a statement without a result set and return the affected row count
    async fn execute(&self, query: &SqlQuery) -> DbResult<u64>;
}
