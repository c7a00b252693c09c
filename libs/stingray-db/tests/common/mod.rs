//! Shared test fixtures: an in-memory executor and the order/customer/orderLine schema

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use stingray_db::sql::SqlQuery;
use stingray_db::{DbResult, Executor, ModelDescriptor, Registry, Relation, Row, Table, Value};

pub fn print_test_header(test_name: &str, purpose: &[&str]) {
    println!("\n🧪 TEST: {}", test_name);
    if let Some(first) = purpose.first() {
        println!("📋 PURPOSE: {}", first);
    }
    for line in purpose.iter().skip(1) {
        println!("   {}", line);
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

// ===== Mock executor =====

type Responder = Box<dyn Fn(&SqlQuery) -> Option<Vec<Row>> + Send + Sync>;

/// Records every statement and answers from responders, falling back to
/// defaults that behave like a table where every requested id exists:
///
/// - INSERT returns a fresh id, `guid-<id>` and the fixed timestamp
/// - `SELECT COUNT(*)` returns 1, or 0 when a bound id is marked missing
/// - UPDATE returns the fixed timestamp (NULL for a cleared `date_deleted`),
///   or no row when a bound id is marked missing
pub struct MockExecutor {
    statements: RwLock<Vec<SqlQuery>>,
    responders: RwLock<Vec<Responder>>,
    missing: RwLock<HashSet<i64>>,
    next_id: AtomicI64,
    affected: AtomicU64,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self {
            statements: RwLock::new(Vec::new()),
            responders: RwLock::new(Vec::new()),
            missing: RwLock::new(HashSet::new()),
            next_id: AtomicI64::new(100),
            affected: AtomicU64::new(1),
        }
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements for which `responder` returns `Some`
    pub fn respond<F>(&self, responder: F) -> &Self
    where
        F: Fn(&SqlQuery) -> Option<Vec<Row>> + Send + Sync + 'static,
    {
        self.responders.write().push(Box::new(responder));
        self
    }

    /// Answer every statement containing `needle` with `rows`
    pub fn respond_to(&self, needle: &str, rows: Vec<Row>) -> &Self {
        let needle = needle.to_string();
        self.respond(move |query| query.sql.contains(&needle).then(|| rows.clone()))
    }

    pub fn mark_missing(&self, id: i64) {
        self.missing.write().insert(id);
    }

    pub fn set_affected(&self, rows: u64) {
        self.affected.store(rows, Ordering::SeqCst);
    }

    pub fn statements(&self) -> Vec<SqlQuery> {
        self.statements.read().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements.read().iter().map(|q| q.sql.clone()).collect()
    }

    pub fn find(&self, needle: &str) -> Option<SqlQuery> {
        self.statements
            .read()
            .iter()
            .find(|q| q.sql.contains(needle))
            .cloned()
    }

    fn touches_missing(&self, query: &SqlQuery) -> bool {
        let missing = self.missing.read();
        query
            .params()
            .iter()
            .any(|v| matches!(v, Value::Int(id) if missing.contains(id)))
    }

    fn default_rows(&self, query: &SqlQuery) -> Vec<Row> {
        let sql = query.sql.as_str();

        if sql.starts_with("INSERT") {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let returned = query
                .columns
                .iter()
                .map(|column| {
                    let value = match column.as_str() {
                        "id" => Value::Int(id),
                        "guid" => Value::Text(format!("guid-{id}")),
                        _ => Value::Timestamp(fixed_now()),
                    };
                    (column.clone(), value)
                })
                .collect();
            return vec![returned];
        }

        if sql.starts_with("SELECT COUNT(*)") {
            let count = if self.touches_missing(query) { 0 } else { 1 };
            return vec![row(&[("count", Value::Int(count))])];
        }

        if sql.starts_with("UPDATE") {
            if self.touches_missing(query) {
                return Vec::new();
            }
            let returned = query
                .columns
                .iter()
                .map(|column| {
                    let cleared = column == "date_deleted"
                        && sql.contains("\"date_deleted\" = NULL");
                    let value = if cleared {
                        Value::Null
                    } else {
                        Value::Timestamp(fixed_now())
                    };
                    (column.clone(), value)
                })
                .collect();
            return vec![returned];
        }

        Vec::new()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn fetch_all(&self, query: &SqlQuery) -> DbResult<Vec<Row>> {
        self.statements.write().push(query.clone());

        let answer = self
            .responders
            .read()
            .iter()
            .find_map(|responder| responder(query));

        Ok(answer.unwrap_or_else(|| self.default_rows(query)))
    }

    async fn execute(&self, query: &SqlQuery) -> DbResult<u64> {
        self.statements.write().push(query.clone());

        if self.touches_missing(query) {
            return Ok(0);
        }
        Ok(self.affected.load(Ordering::SeqCst))
    }
}

// ===== Schema =====

/// order (ord) -> belongsToOne customer, hasMany orderLine -> hasMany shipment
pub fn order_registry() -> Arc<Registry> {
    Arc::new(Registry::new(vec![
        Table::new("order", "ord")
            .with_columns(&["id", "customer_id", "date_deleted"])
            .with_relation(Relation::belongs_to_one("customer"))
            .with_relation(Relation::has_many("order_line").named("orderLine")),
        Table::new("customer", "cust").with_columns(&["id", "name"]),
        Table::new("order_line", "ol")
            .named("orderLine")
            .with_columns(&["id", "order_id", "qty"])
            .with_relation(Relation::has_many("shipment")),
        Table::new("shipment", "shp").with_columns(&["id", "order_line_id", "carrier"]),
    ]))
}

pub fn order_row(id: i64, customer: Option<(i64, &str)>) -> Row {
    let (customer_id, name) = match customer {
        Some((id, name)) => (Value::Int(id), Value::Text(name.to_string())),
        None => (Value::Null, Value::Null),
    };
    row(&[
        ("order_id", Value::Int(id)),
        ("order_customer_id", customer_id.clone()),
        ("order_date_deleted", Value::Null),
        ("customer_id", customer_id),
        ("customer_name", name),
    ])
}

pub fn order_line_row(id: i64, order_id: i64, qty: i64) -> Row {
    row(&[
        ("order_line_id", Value::Int(id)),
        ("order_line_order_id", Value::Int(order_id)),
        ("order_line_qty", Value::Int(qty)),
    ])
}

// ===== Records =====

/// `order_line` with the full set of audit columns and a foreign key to `order`
pub fn order_line_descriptor() -> Arc<ModelDescriptor> {
    let table = Table::new("order_line", "ol")
        .with_columns(&[
            "id",
            "guid",
            "order_id",
            "qty",
            "note",
            "date_creation",
            "date_changes",
            "date_deleted",
            "usr_acc_creation_id",
            "usr_acc_changes_id",
        ])
        .with_relation(Relation::belongs_to_one("order"));
    Arc::new(ModelDescriptor::from_table(&table))
}

/// Tag link table without audit columns beyond the soft delete
pub fn order_tag_descriptor() -> Arc<ModelDescriptor> {
    let table = Table::new("order_tag", "otg").with_columns(&["id", "order_id", "tag", "date_deleted"]);
    Arc::new(ModelDescriptor::from_table(&table))
}
