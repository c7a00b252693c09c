//! Statement building on top of sea-query
//!
//! Builders here are thin wrappers over `sea_query` statements that also keep
//! track of the output column names, so the executor can decode rows without
//! guessing. Rendering always targets PostgreSQL and yields a [`SqlQuery`].
//! `NULL` goes into the text as a keyword instead of an untyped bound parameter.

use crate::error::{DbError, DbResult};
use crate::value::Value;
use sea_orm::sea_query::{
    Alias, Asterisk, Expr, Func, InsertStatement, JoinType, Keyword, Order, PostgresQueryBuilder,
    Query, SelectStatement, SimpleExpr, UpdateStatement, Values,
};

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1)
pub const POSTGRES_MAX_IDENTIFIER_LENGTH: usize = 63;

/// Server-side UTC timestamp expression used for audit columns
pub const SQL_UTC_NOW: &str = "timezone('utc'::text, now())";

/// Validate a caller supplied column reference (`column` or `alias.column`)
pub fn validate_identifier_path(path: &str) -> DbResult<()> {
    let valid = !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(DbError::validation(format!("Invalid column reference \"{path}\"")))
    }
}

/// Fail when a physical name cannot be used as a PostgreSQL identifier
pub fn check_identifier_length(name: &str) -> DbResult<()> {
    if name.len() > POSTGRES_MAX_IDENTIFIER_LENGTH {
        return Err(DbError::IdentifierLengthExceeded(name.to_string()));
    }
    Ok(())
}

// ===== Expressions =====

/// Column reference from `column` or `alias.column`
pub fn col(path: &str) -> Expr {
    match path.split_once('.') {
        Some((alias, column)) => Expr::col((Alias::new(alias), Alias::new(column))),
        None => Expr::col(Alias::new(path)),
    }
}

/// `timezone('utc'::text, now())`
pub fn utc_now() -> SimpleExpr {
    Expr::cust(SQL_UTC_NOW)
}

/// `path IN (...)`; an empty list matches nothing
pub fn in_list(path: &str, values: impl IntoIterator<Item = Value>) -> SimpleExpr {
    let values: Vec<SimpleExpr> = values.into_iter().map(SimpleExpr::from).collect();
    if values.is_empty() {
        return SimpleExpr::Constant(false.into());
    }
    col(path).is_in(values)
}

impl From<Value> for SimpleExpr {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SimpleExpr::Keyword(Keyword::Null),
            value => Expr::value(value.to_sea_value()),
        }
    }
}

/// A rendered statement ready for the executor
#[derive(Debug, Clone)]
pub struct SqlQuery {
    pub sql: String,
    pub values: Values,
    /// Output column names in select order, empty for statements without a result set
    pub columns: Vec<String>,
}

impl SqlQuery {
    fn rendered((sql, values): (String, Values), columns: Vec<String>) -> Self {
        Self {
            sql,
            values,
            columns,
        }
    }

    /// Bound parameters in placeholder order
    pub fn params(&self) -> Vec<Value> {
        self.values.iter().map(Value::from_sea_value).collect()
    }
}

// ===== Direction =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Accepts `asc`, `ascend`, `desc` and `descend` in any case
    pub fn normalize(direction: &str) -> DbResult<Self> {
        match direction.to_lowercase().as_str() {
            "asc" | "ascend" => Ok(Self::Asc),
            "desc" | "descend" => Ok(Self::Desc),
            _ => Err(DbError::validation(format!(
                "Direction \"{direction}\" cannot be normalized"
            ))),
        }
    }
}

impl From<Direction> for Order {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Asc => Order::Asc,
            Direction::Desc => Order::Desc,
        }
    }
}

// ===== SELECT =====

/// SELECT with named output columns
#[derive(Debug, Clone)]
pub struct SelectQuery {
    statement: SelectStatement,
    columns: Vec<String>,
}

impl SelectQuery {
    pub fn from(table: &str, alias: &str) -> Self {
        let mut statement = Query::select();
        statement.from_as(Alias::new(table), Alias::new(alias));
        Self {
            statement,
            columns: Vec::new(),
        }
    }

    /// Select `"alias"."column" AS "output"`
    pub fn column(&mut self, alias: &str, column: &str, output: &str) -> &mut Self {
        self.statement.expr_as(
            Expr::col((Alias::new(alias), Alias::new(column))),
            Alias::new(output),
        );
        self.columns.push(output.to_string());
        self
    }

    pub fn left_join(&mut self, table: &str, alias: &str, on: SimpleExpr) -> &mut Self {
        self.statement
            .join_as(JoinType::LeftJoin, Alias::new(table), Alias::new(alias), on);
        self
    }

    pub fn and_where(&mut self, condition: SimpleExpr) -> &mut Self {
        self.statement.and_where(condition);
        self
    }

    pub fn and_where_null(&mut self, path: &str) -> &mut Self {
        self.and_where(col(path).is_null())
    }

    pub fn and_where_eq(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
        self.and_where(col(path).eq(SimpleExpr::from(value.into())))
    }

    /// Renders `FALSE` for an empty list
    pub fn and_where_in(
        &mut self,
        path: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> &mut Self {
        self.and_where(in_list(path, values))
    }

    /// ORDER BY a validated column reference
    pub fn order_by(&mut self, path: &str, direction: Direction) -> DbResult<&mut Self> {
        validate_identifier_path(path)?;
        self.statement
            .order_by_expr(col(path).into(), direction.into());
        Ok(self)
    }

    /// Case-insensitive ORDER BY
    pub fn order_by_lower(&mut self, path: &str, direction: Direction) -> DbResult<&mut Self> {
        validate_identifier_path(path)?;
        self.statement
            .order_by_expr(Func::lower(col(path)).into(), direction.into());
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.statement.limit(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.statement.offset(offset);
        self
    }

    pub fn build(&self) -> SqlQuery {
        if self.columns.is_empty() {
            let mut statement = self.statement.clone();
            statement.column(Asterisk);
            return SqlQuery::rendered(statement.build(PostgresQueryBuilder), Vec::new());
        }
        SqlQuery::rendered(
            self.statement.build(PostgresQueryBuilder),
            self.columns.clone(),
        )
    }

    /// Same FROM/JOIN/WHERE as [`build`](Self::build) but selecting `COUNT(*)`.
    /// Ordering and paging are ignored.
    pub fn build_count(&self) -> SqlQuery {
        let mut statement = self.statement.clone();
        statement
            .clear_selects()
            .clear_order_by()
            .reset_limit()
            .reset_offset()
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"));

        SqlQuery::rendered(
            statement.build(PostgresQueryBuilder),
            vec!["count".to_string()],
        )
    }
}

// ===== INSERT / UPDATE =====

/// INSERT collecting one value per column
#[derive(Debug, Clone)]
pub struct InsertQuery {
    table: String,
    columns: Vec<String>,
    values: Vec<SimpleExpr>,
    returning: Vec<String>,
}

impl InsertQuery {
    pub fn into_table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            values: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &str, expr: impl Into<SimpleExpr>) -> &mut Self {
        self.columns.push(column.to_string());
        self.values.push(expr.into());
        self
    }

    pub fn returning(&mut self, column: &str) -> &mut Self {
        self.returning.push(column.to_string());
        self
    }

    pub fn build(&self) -> DbResult<SqlQuery> {
        let mut statement: InsertStatement = Query::insert();
        statement.into_table(Alias::new(self.table.as_str()));

        if self.columns.is_empty() {
            statement.or_default_values();
        } else {
            statement.columns(self.columns.iter().map(|c| Alias::new(c.as_str())));
            statement
                .values(self.values.iter().cloned())
                .map_err(|e| DbError::validation(format!("Insert into {}: {e}", self.table)))?;
        }

        if !self.returning.is_empty() {
            statement.returning(
                Query::returning().columns(self.returning.iter().map(|c| Alias::new(c.as_str()))),
            );
        }

        Ok(SqlQuery::rendered(
            statement.build(PostgresQueryBuilder),
            self.returning.clone(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct UpdateQuery {
    statement: UpdateStatement,
    returning: Vec<String>,
}

impl UpdateQuery {
    pub fn table(table: &str) -> Self {
        let mut statement = Query::update();
        statement.table(Alias::new(table));
        Self {
            statement,
            returning: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &str, expr: impl Into<SimpleExpr>) -> &mut Self {
        self.statement.value(Alias::new(column), expr.into());
        self
    }

    pub fn filter(&mut self, condition: SimpleExpr) -> &mut Self {
        self.statement.and_where(condition);
        self
    }

    pub fn returning(&mut self, column: &str) -> &mut Self {
        self.returning.push(column.to_string());
        self
    }

    pub fn build(&self) -> SqlQuery {
        let mut statement = self.statement.clone();
        if !self.returning.is_empty() {
            statement.returning(
                Query::returning().columns(self.returning.iter().map(|c| Alias::new(c.as_str()))),
            );
        }
        SqlQuery::rendered(
            statement.build(PostgresQueryBuilder),
            self.returning.clone(),
        )
    }
}
