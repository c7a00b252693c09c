//! Record lifecycle: insert, update, soft delete and restore

use super::descriptor::{fields, ModelDescriptor};
use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use crate::sql::{col, in_list, utc_now, InsertQuery, SelectQuery, UpdateQuery};
use crate::util::{is_guid_field, is_id_field};
use sea_orm::sea_query::SimpleExpr;
use crate::value::{Row, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// One row of a table, keyed by camelCase field name.
///
/// Only fields that were explicitly set are present; absent fields are never
/// written. Identifier fields are kept as strings and bound as bigint when numeric.
#[derive(Debug, Clone)]
pub struct Record {
    descriptor: Arc<ModelDescriptor>,
    values: IndexMap<String, Value>,
}

impl Record {
    pub fn new(descriptor: Arc<ModelDescriptor>) -> Self {
        Self {
            descriptor,
            values: IndexMap::new(),
        }
    }

    /// Copy the descriptor's fields out of a JSON object, ignoring unknown keys.
    /// RFC 3339 strings become timestamps only in `date*` fields.
    pub fn from_json(descriptor: Arc<ModelDescriptor>, json: &serde_json::Value) -> Self {
        let mut record = Self::new(descriptor);
        if let Some(object) = json.as_object() {
            let known: Vec<String> = record.descriptor.fields().map(str::to_string).collect();
            for field in known {
                if let Some(value) = object.get(&field) {
                    let value = Value::from_json(value);
                    let value = if is_date_field(&field) {
                        value.parse_timestamp()
                    } else {
                        value
                    };
                    record.put(&field, value);
                }
            }
        }
        record
    }

    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .values
            .iter()
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(object)
    }

    pub fn descriptor(&self) -> &Arc<ModelDescriptor> {
        &self.descriptor
    }

    pub fn table_name(&self) -> &str {
        self.descriptor.table_name()
    }

    pub fn id(&self) -> Option<&str> {
        match self.values.get(fields::ID) {
            Some(Value::Text(id)) => Some(id.as_str()),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> DbResult<&mut Self> {
        if !self.descriptor.has_field(field) {
            return Err(DbError::validation(format!(
                "Table {} does not have field {field}",
                self.descriptor.table_name()
            )));
        }
        self.put(field, value.into());
        Ok(self)
    }

    pub fn is_deleted(&self) -> bool {
        self.values
            .get(fields::DATE_DELETED)
            .is_some_and(Value::is_truthy)
    }

    /// Translate a field to `alias.column`, or to the bare column without the alias
    pub fn column_by_name(&self, field: &str, with_alias: bool) -> Option<String> {
        let column = if with_alias {
            self.descriptor.qualified_column(field)
        } else {
            self.descriptor.physical_column(field)
        };
        column.map(str::to_string)
    }

    /// Deep comparison of the given columns (`alias.column` or bare names).
    /// An empty list compares every non-system field set on this record.
    pub fn differs(&self, compare: &Record, columns: &[&str]) -> DbResult<bool> {
        for field in self.compared_fields(columns)? {
            let source = self.values.get(&field).ok_or_else(|| DbError::MissingProperty {
                side: "source",
                property: field.clone(),
            })?;
            let other = compare.values.get(&field).ok_or_else(|| DbError::MissingProperty {
                side: "compare",
                property: field.clone(),
            })?;

            if source.canonical() != other.canonical() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ===== Persistence =====

    pub async fn insert(&mut self, db: &dyn Executor, user_id: Option<&str>) -> DbResult<()> {
        let descriptor = self.descriptor.clone();
        let id_column = self.require_column(fields::ID)?;

        let mut query = InsertQuery::into_table(descriptor.table_name());
        for (column, value) in self.writable_columns(&[]) {
            query.set(&column, value);
        }
        for field in [fields::USR_ACC_CREATION_ID, fields::USR_ACC_CHANGES_ID] {
            if let Some(column) = descriptor.physical_column(field) {
                query.set(column, user_param(user_id));
            }
        }

        query.returning(&id_column);
        let returned = [fields::GUID, fields::DATE_CREATION, fields::DATE_CHANGES];
        for field in returned {
            if let Some(column) = descriptor.physical_column(field) {
                query.returning(column);
            }
        }

        let rows = db.fetch_all(&query.build()?).await?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::Decode {
            column: id_column.clone(),
        })?;

        let id = row.get(&id_column).cloned().unwrap_or_default();
        self.put(fields::ID, id);
        self.copy_returned(&row, &returned);

        tracing::debug!(table = descriptor.table_name(), id = ?self.id(), "Record inserted");
        Ok(())
    }

    /// Update the given columns by identifier. With `existing`, nothing is written
    /// when no column is named or the named columns are unchanged; without it an
    /// empty list writes every set field. Returns whether an UPDATE ran.
    pub async fn update(
        &mut self,
        db: &dyn Executor,
        existing: Option<&Record>,
        user_id: Option<&str>,
        columns: &[&str],
    ) -> DbResult<bool> {
        if let Some(existing) = existing {
            if columns.is_empty() || !self.differs(existing, columns)? {
                return Ok(false);
            }
        }

        let descriptor = self.descriptor.clone();
        let id = self.require_id()?;

        let mut query = UpdateQuery::table(descriptor.table_name());
        let mut assignments = 0;
        for (column, value) in self.writable_columns(columns) {
            query.set(&column, value);
            assignments += 1;
        }
        if let Some(column) = descriptor.physical_column(fields::USR_ACC_CHANGES_ID) {
            query.set(column, user_param(user_id));
            assignments += 1;
        }
        if let Some(column) = descriptor.physical_column(fields::DATE_CHANGES) {
            query.set(column, utc_now()).returning(column);
            assignments += 1;
        }
        if assignments == 0 {
            return Err(DbError::validation(format!(
                "Nothing to update in {}",
                descriptor.table_name()
            )));
        }

        if self.count_by_id(db, &id).await? == 0 {
            return Err(DbError::RecordNotFound {
                table: descriptor.table_name().to_string(),
                id,
            });
        }

        query.filter(self.id_condition(&id)?);
        self.run_returning(db, query, &[fields::DATE_CHANGES]).await?;

        tracing::debug!(table = descriptor.table_name(), id = %id, "Record updated");
        Ok(true)
    }

    /// Soft delete: stamp the deletion timestamp with the server time
    pub async fn delete(&mut self, db: &dyn Executor, user_id: Option<&str>) -> DbResult<()> {
        self.set_deleted(db, user_id, utc_now()).await
    }

    /// Clear the deletion timestamp
    pub async fn restore(&mut self, db: &dyn Executor, user_id: Option<&str>) -> DbResult<()> {
        self.set_deleted(db, user_id, Value::Null.into()).await
    }

    pub async fn bulk_delete(
        &self,
        db: &dyn Executor,
        ids: &[String],
        user_id: Option<&str>,
    ) -> DbResult<u64> {
        self.bulk_set_deleted(db, ids, user_id, utc_now()).await
    }

    pub async fn bulk_restore(
        &self,
        db: &dyn Executor,
        ids: &[String],
        user_id: Option<&str>,
    ) -> DbResult<u64> {
        self.bulk_set_deleted(db, ids, user_id, Value::Null.into())
            .await
    }

    /// Re-read the globally unique id by identifier. Empty when the row is gone.
    pub async fn fetch_guid(&mut self, db: &dyn Executor) -> DbResult<String> {
        let id_column = self.require_column(fields::ID)?;
        let guid_column = self.require_column(fields::GUID)?;
        let id = self.require_id()?;

        let alias = self.descriptor.alias().to_string();
        let mut query = SelectQuery::from(self.descriptor.table_name(), &alias);
        query
            .column(&alias, &guid_column, &guid_column)
            .and_where_eq(&format!("{alias}.{id_column}"), Value::id_param(&id));

        let rows = db.fetch_all(&query.build()).await?;
        let guid = match rows.as_slice() {
            [row] => row
                .get(&guid_column)
                .and_then(Value::to_id_string)
                .unwrap_or_default(),
            _ => String::new(),
        };

        self.put(fields::GUID, Value::Text(guid.clone()));
        Ok(guid)
    }

    // ===== Internals =====

    fn put(&mut self, field: &str, value: Value) {
        let value = if is_id_field(field) {
            value.normalize_id()
        } else {
            value
        };
        self.values.insert(field.to_string(), value);
    }

    fn require_column(&self, field: &str) -> DbResult<String> {
        self.descriptor
            .physical_column(field)
            .map(str::to_string)
            .ok_or_else(|| {
                DbError::validation(format!(
                    "Table {} does not have field {field}",
                    self.descriptor.table_name()
                ))
            })
    }

    fn require_id(&self) -> DbResult<String> {
        self.id().map(str::to_string).ok_or_else(|| {
            DbError::validation(format!(
                "Record of {} does not have an id",
                self.descriptor.table_name()
            ))
        })
    }

    fn id_condition(&self, id: &str) -> DbResult<SimpleExpr> {
        let column = self.require_column(fields::ID)?;
        Ok(col(&column).eq(SimpleExpr::from(Value::id_param(id))))
    }

    fn compared_fields(&self, columns: &[&str]) -> DbResult<Vec<String>> {
        if columns.is_empty() {
            return Ok(self
                .values
                .keys()
                .filter(|field| !fields::SYSTEM.contains(&field.as_str()))
                .cloned()
                .collect());
        }

        columns
            .iter()
            .map(|column| {
                self.descriptor
                    .field_for_column(column)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        DbError::validation(format!(
                            "Table {} does not have column {column}",
                            self.descriptor.table_name()
                        ))
                    })
            })
            .collect()
    }

    /// Physical column and bind value of every set, non-system field accepted by `accept`
    fn writable_columns(&self, accept: &[&str]) -> Vec<(String, Value)> {
        let descriptor = &self.descriptor;
        descriptor
            .fields()
            .filter(|field| !fields::SYSTEM.contains(field))
            .filter_map(|field| {
                let value = self.values.get(field)?;
                if field == fields::GUID && !value.is_truthy() {
                    return None;
                }

                let qualified = descriptor.qualified_column(field)?;
                let column = descriptor.physical_column(field)?;
                if !accept.is_empty() && !accept.iter().any(|a| *a == qualified || *a == column) {
                    return None;
                }

                Some((column.to_string(), bind_value(field, value)))
            })
            .collect()
    }

    async fn count_by_id(&self, db: &dyn Executor, id: &str) -> DbResult<i64> {
        let id_column = self.require_column(fields::ID)?;
        let alias = self.descriptor.alias();
        let mut query = SelectQuery::from(self.descriptor.table_name(), alias);
        query.and_where_eq(&format!("{alias}.{id_column}"), Value::id_param(id));

        let rows = db.fetch_all(&query.build_count()).await?;
        match rows.first().and_then(|row| row.get("count")) {
            Some(Value::Int(count)) => Ok(*count),
            _ => Err(DbError::Decode {
                column: "count".to_string(),
            }),
        }
    }

    async fn set_deleted(
        &mut self,
        db: &dyn Executor,
        user_id: Option<&str>,
        date_deleted: SimpleExpr,
    ) -> DbResult<()> {
        let descriptor = self.descriptor.clone();
        let deleted_column = self.require_column(fields::DATE_DELETED)?;
        let id = self.require_id()?;

        let mut query = UpdateQuery::table(descriptor.table_name());
        query.set(&deleted_column, date_deleted).returning(&deleted_column);
        if let Some(column) = descriptor.physical_column(fields::USR_ACC_CHANGES_ID) {
            query.set(column, user_param(user_id));
        }
        if let Some(column) = descriptor.physical_column(fields::DATE_CHANGES) {
            query.set(column, utc_now()).returning(column);
        }
        query.filter(self.id_condition(&id)?);

        let found = self
            .run_returning(db, query, &[fields::DATE_DELETED, fields::DATE_CHANGES])
            .await?;
        if !found {
            return Err(DbError::RecordNotFound {
                table: descriptor.table_name().to_string(),
                id,
            });
        }
        Ok(())
    }

    async fn bulk_set_deleted(
        &self,
        db: &dyn Executor,
        ids: &[String],
        user_id: Option<&str>,
        date_deleted: SimpleExpr,
    ) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let descriptor = &self.descriptor;
        let deleted_column = self.require_column(fields::DATE_DELETED)?;
        let id_column = self.require_column(fields::ID)?;

        let mut query = UpdateQuery::table(descriptor.table_name());
        query.set(&deleted_column, date_deleted);
        if let Some(column) = descriptor.physical_column(fields::USR_ACC_CHANGES_ID) {
            query.set(column, user_param(user_id));
        }
        if let Some(column) = descriptor.physical_column(fields::DATE_CHANGES) {
            query.set(column, utc_now());
        }
        query.filter(in_list(&id_column, ids.iter().map(|id| Value::id_param(id))));

        db.execute(&query.build()).await
    }

    /// Run an UPDATE and copy returned fields back. False when no row matched.
    async fn run_returning(
        &mut self,
        db: &dyn Executor,
        query: UpdateQuery,
        returned: &[&str],
    ) -> DbResult<bool> {
        let built = query.build();
        if built.columns.is_empty() {
            return Ok(db.execute(&built).await? > 0);
        }

        let rows = db.fetch_all(&built).await?;
        match rows.into_iter().next() {
            Some(row) => {
                self.copy_returned(&row, returned);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn copy_returned(&mut self, row: &Row, returned: &[&str]) {
        for field in returned {
            let column = match self.descriptor.physical_column(field) {
                Some(column) => column.to_string(),
                None => continue,
            };
            if let Some(value) = row.get(&column) {
                self.put(field, value.clone());
            }
        }
    }
}

/// Identifiers bind as bigint when numeric, guids as uuid when they parse as one
fn bind_value(field: &str, value: &Value) -> Value {
    match value {
        Value::Text(id) if is_id_field(field) => Value::id_param(id),
        Value::Text(_) if is_guid_field(field) => value.clone().parse_uuid(),
        other => other.clone(),
    }
}

fn is_date_field(field: &str) -> bool {
    field.starts_with("date")
}

fn user_param(user_id: Option<&str>) -> Value {
    user_id.map_or(Value::Null, Value::id_param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> Arc<ModelDescriptor> {
        Arc::new(
            ModelDescriptor::new("order_line", "ol")
                .column("id", "id")
                .column("orderId", "order_id")
                .column("qty", "qty")
                .column("note", "note")
                .column("dateDeleted", "date_deleted"),
        )
    }

    #[test]
    fn test_from_json_keeps_known_fields_and_normalizes_ids() {
        let record = Record::from_json(
            descriptor(),
            &json!({"id": 7, "orderId": "3", "qty": 2, "unknown": true}),
        );
        assert_eq!(record.id(), Some("7"));
        assert_eq!(record.get("orderId"), Some(&Value::Text("3".into())));
        assert!(record.get("unknown").is_none());
        assert_eq!(record.to_json(), json!({"id": "7", "orderId": "3", "qty": 2}));
    }

    #[test]
    fn test_differs_by_column() {
        let a = Record::from_json(descriptor(), &json!({"id": "1", "qty": 2, "note": "x"}));
        let b = Record::from_json(descriptor(), &json!({"id": "1", "qty": 2, "note": "y"}));

        assert!(!a.differs(&b, &["ol.qty"]).unwrap());
        assert!(a.differs(&b, &["ol.qty", "note"]).unwrap());
    }

    #[test]
    fn test_differs_missing_property_is_an_error() {
        let a = Record::from_json(descriptor(), &json!({"id": "1", "qty": 2}));
        let b = Record::from_json(descriptor(), &json!({"id": "1"}));

        let err = b.differs(&a, &["ol.qty"]).unwrap_err();
        assert_eq!(err.to_string(), "source model does not have property qty");
        let err = a.differs(&b, &["ol.qty"]).unwrap_err();
        assert_eq!(err.to_string(), "compare model does not have property qty");
    }

    #[test]
    fn test_column_by_name() {
        let record = Record::new(descriptor());
        assert_eq!(record.column_by_name("orderId", true).as_deref(), Some("ol.order_id"));
        assert_eq!(record.column_by_name("orderId", false).as_deref(), Some("order_id"));
        assert_eq!(record.column_by_name("missing", true), None);
    }

    #[test]
    fn test_set_rejects_unknown_field() {
        let mut record = Record::new(descriptor());
        assert!(record.set("qty", 3).is_ok());
        assert!(record.set("price", 3).is_err());
    }

    #[test]
    fn test_writable_columns_skip_system_fields() {
        let mut record = Record::from_json(
            descriptor(),
            &json!({"id": "1", "orderId": "12", "qty": 2, "dateDeleted": null}),
        );
        let all = record.writable_columns(&[]);
        assert_eq!(
            all,
            vec![
                ("order_id".to_string(), Value::Int(12)),
                ("qty".to_string(), Value::Int(2)),
            ]
        );

        record.set("note", "hello").unwrap();
        let only_note = record.writable_columns(&["ol.note"]);
        assert_eq!(only_note, vec![("note".to_string(), Value::Text("hello".into()))]);
    }

    #[test]
    fn test_is_deleted() {
        let live = Record::from_json(descriptor(), &json!({"dateDeleted": null}));
        let gone = Record::from_json(
            descriptor(),
            &json!({"dateDeleted": "2024-01-01T00:00:00.000Z"}),
        );
        assert!(!live.is_deleted());
        assert!(gone.is_deleted());
    }
}
