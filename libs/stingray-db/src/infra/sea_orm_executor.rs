//! sea-orm backed [`Executor`]
//!
//! Statements go through `ConnectionTrait` as raw PostgreSQL statements, so the
//! same code serves a pooled `DatabaseConnection` and an open `DatabaseTransaction`.

use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use crate::sql::SqlQuery;
use crate::value::{Row, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, QueryResult, Statement,
};
use uuid::Uuid;

fn statement(query: &SqlQuery) -> Statement {
    Statement::from_sql_and_values(DbBackend::Postgres, query.sql.as_str(), query.values.clone())
}

async fn fetch_all_on<C: ConnectionTrait>(conn: &C, query: &SqlQuery) -> DbResult<Vec<Row>> {
    tracing::debug!(sql = %query.sql, params = query.values.0.len(), "fetch");

    let rows = conn.query_all(statement(query)).await?;
    rows.iter().map(|row| decode_row(row, &query.columns)).collect()
}

async fn execute_on<C: ConnectionTrait>(conn: &C, query: &SqlQuery) -> DbResult<u64> {
    tracing::debug!(sql = %query.sql, params = query.values.0.len(), "execute");

    let result = conn.execute(statement(query)).await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl Executor for DatabaseConnection {
    async fn fetch_all(&self, query: &SqlQuery) -> DbResult<Vec<Row>> {
        fetch_all_on(self, query).await
    }

    async fn execute(&self, query: &SqlQuery) -> DbResult<u64> {
        execute_on(self, query).await
    }
}

#[async_trait]
impl Executor for DatabaseTransaction {
    async fn fetch_all(&self, query: &SqlQuery) -> DbResult<Vec<Row>> {
        fetch_all_on(self, query).await
    }

    async fn execute(&self, query: &SqlQuery) -> DbResult<u64> {
        execute_on(self, query).await
    }
}

// ===== Row decoding =====

fn decode_row(row: &QueryResult, columns: &[String]) -> DbResult<Row> {
    columns
        .iter()
        .map(|column| Ok((column.clone(), decode_column(row, column)?)))
        .collect()
}

/// Try the PostgreSQL types this layer produces, narrowest integer first.
/// NULL decodes on the first attempt regardless of the column type.
fn decode_column(row: &QueryResult, column: &str) -> DbResult<Value> {
    macro_rules! attempt {
        ($ty:ty, $map:expr) => {
            if let Ok(value) = row.try_get::<Option<$ty>>("", column) {
                return Ok(value.map_or(Value::Null, $map));
            }
        };
    }

    attempt!(i64, Value::Int);
    attempt!(i32, |v| Value::Int(v.into()));
    attempt!(i16, |v| Value::Int(v.into()));
    attempt!(bool, Value::Bool);
    attempt!(f64, Value::Float);
    attempt!(f32, |v| Value::Float(v.into()));
    attempt!(Decimal, Value::Decimal);
    attempt!(String, Value::Text);
    attempt!(Uuid, Value::Uuid);
    attempt!(DateTime<Utc>, Value::Timestamp);
    attempt!(NaiveDateTime, |v: NaiveDateTime| Value::Timestamp(v.and_utc()));
    attempt!(NaiveDate, Value::Date);
    attempt!(serde_json::Value, Value::Json);

    Err(DbError::Decode {
        column: column.to_string(),
    })
}
