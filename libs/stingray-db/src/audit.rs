//! Edit bodies for the audit log
//!
//! Foreign key fields are reported by the referenced row's guid instead of its
//! numeric id, so log entries stay meaningful across databases.

use crate::error::DbResult;
use crate::executor::Executor;
use crate::model::Record;
use crate::sql::SelectQuery;
use crate::sync::{SyncResultItem, SyncState};
use crate::util::guid_field_name;
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

pub type EditBody = IndexMap<String, FieldChange>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditOp {
    Add,
    Remove,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationEdit {
    pub guid: String,
    pub op: EditOp,
    pub entity: EditBody,
}

/// Changed fields among `columns` between two versions of a record.
/// Either side may be absent (insert or removal).
pub async fn edit_body(
    db: &dyn Executor,
    existing: Option<&Record>,
    desirable: Option<&Record>,
    columns: &[&str],
) -> DbResult<EditBody> {
    let mut body = EditBody::new();

    for column in columns {
        let Some(field) = [existing, desirable]
            .into_iter()
            .flatten()
            .find_map(|r| r.descriptor().field_for_column(column))
            .map(str::to_string)
        else {
            continue;
        };

        let old = existing.and_then(|r| r.get(&field));
        let new = desirable.and_then(|r| r.get(&field));

        let changed = match (old, new) {
            (Some(a), Some(b)) => a.canonical() != b.canonical(),
            (None, None) => false,
            _ => true,
        };
        if !changed {
            continue;
        }

        let foreign_table = match (old, new) {
            (Some(_), _) => existing.and_then(|r| r.descriptor().foreigns().get(&field)),
            (None, Some(_)) => desirable.and_then(|r| r.descriptor().foreigns().get(&field)),
            (None, None) => None,
        };

        match foreign_table {
            None => {
                body.insert(
                    field,
                    FieldChange {
                        old: old.map_or(serde_json::Value::Null, Value::to_json),
                        new: new.map_or(serde_json::Value::Null, Value::to_json),
                    },
                );
            }
            Some(table) => {
                let old_guid = foreign_guid(db, table, old).await?;
                let new_guid = foreign_guid(db, table, new).await?;
                body.insert(
                    guid_field_name(&field)?,
                    FieldChange {
                        old: old_guid.map_or(serde_json::Value::Null, serde_json::Value::String),
                        new: new_guid.map_or(serde_json::Value::Null, serde_json::Value::String),
                    },
                );
            }
        }
    }

    Ok(body)
}

/// One entry per touched relation item; untouched items are skipped
pub async fn edit_body_by_relation(
    db: &dyn Executor,
    results: &[SyncResultItem],
    columns: &[&str],
) -> DbResult<Vec<RelationEdit>> {
    let mut edits = Vec::new();

    for item in results {
        let op = match item.state {
            SyncState::Untouched => continue,
            SyncState::Inserted | SyncState::Restored => EditOp::Add,
            SyncState::Deleted => EditOp::Remove,
            SyncState::Updated => EditOp::Edit,
        };

        let entity = edit_body(db, item.from.as_ref(), item.to.as_ref(), columns).await?;

        let guid = match &item.to {
            Some(to) => to.clone().fetch_guid(db).await?,
            None => String::new(),
        };

        edits.push(RelationEdit { guid, op, entity });
    }

    Ok(edits)
}

async fn foreign_guid(
    db: &dyn Executor,
    table: &str,
    id: Option<&Value>,
) -> DbResult<Option<String>> {
    let Some(id) = id.filter(|v| v.is_truthy()).and_then(Value::to_id_string) else {
        return Ok(None);
    };

    let mut query = SelectQuery::from(table, table);
    query
        .column(table, "guid", "guid")
        .and_where_eq(&format!("{table}.id"), Value::id_param(&id));

    let rows = db.fetch_all(&query.build()).await?;
    let guid = match rows.as_slice() {
        [row] => row
            .get("guid")
            .and_then(Value::to_id_string)
            .unwrap_or_default(),
        _ => String::new(),
    };
    Ok(Some(guid))
}
