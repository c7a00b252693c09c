//! Small helpers shared by the record layer and the searcher

use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use crate::sql::{Direction, SqlQuery};
use sea_orm::sea_query::{Alias, Expr, PostgresQueryBuilder, Query};
use crate::value::Value;
use chrono::{DateTime, Utc};
use heck::ToLowerCamelCase;

/// `customer_id` -> `customerId`
pub fn snake_to_camel(value: &str) -> String {
    value.to_lower_camel_case()
}

pub fn normalize_direction(direction: &str) -> DbResult<Direction> {
    Direction::normalize(direction)
}

/// Fields named `id` or ending in `Id` carry identifiers and travel as strings
pub fn is_id_field(field: &str) -> bool {
    field == "id" || field.ends_with("Id")
}

/// `guid` itself and fields such as `customerGuid`
pub fn is_guid_field(field: &str) -> bool {
    field == "guid" || field.ends_with("Guid")
}

/// `customerId` -> `customerGuid`
pub fn guid_field_name(id_field: &str) -> DbResult<String> {
    match id_field.strip_suffix("Id") {
        Some(base) => Ok(format!("{base}Guid")),
        None => Err(DbError::validation(format!(
            "Foreign field {id_field} should be an Id field"
        ))),
    }
}

/// Current database time
pub async fn sql_now(db: &dyn Executor) -> DbResult<DateTime<Utc>> {
    let (sql, values) = Query::select()
        .expr_as(Expr::cust("NOW()"), Alias::new("now"))
        .build(PostgresQueryBuilder);
    let query = SqlQuery {
        sql,
        values,
        columns: vec!["now".to_string()],
    };
    let rows = db.fetch_all(&query).await?;

    match rows.first().and_then(|row| row.get("now")) {
        Some(Value::Timestamp(now)) if rows.len() == 1 => Ok(*now),
        _ => Err(DbError::Decode {
            column: "now".to_string(),
        }),
    }
}

/// Drop hydrated items whose nested object under `key` is missing or empty
pub fn items_with_required_object(
    items: Vec<serde_json::Value>,
    key: &str,
) -> Vec<serde_json::Value> {
    items
        .into_iter()
        .filter(|item| item.get(key).is_some_and(json_truthy))
        .collect()
}

fn json_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value as J;
    match value {
        J::Null => false,
        J::Bool(b) => *b,
        J::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        J::String(s) => !s.is_empty(),
        J::Array(_) | J::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("customer_id"), "customerId");
        assert_eq!(snake_to_camel("usr_acc_creation_id"), "usrAccCreationId");
        assert_eq!(snake_to_camel("id"), "id");
        assert_eq!(snake_to_camel("orderLine"), "orderLine");
    }

    #[test]
    fn test_guid_field_name() {
        assert_eq!(guid_field_name("customerId").unwrap(), "customerGuid");
        assert!(guid_field_name("customer").is_err());
    }

    #[test]
    fn test_is_id_field() {
        assert!(is_id_field("id"));
        assert!(is_id_field("customerId"));
        assert!(!is_id_field("identity"));
    }

    #[test]
    fn test_is_guid_field() {
        assert!(is_guid_field("guid"));
        assert!(is_guid_field("customerGuid"));
        assert!(!is_guid_field("guidance"));
    }

    #[test]
    fn test_items_with_required_object() {
        let items = vec![
            json!({"id": "1", "customer": {"id": "5"}}),
            json!({"id": "2", "customer": null}),
            json!({"id": "3"}),
        ];
        let kept = items_with_required_object(items, "customer");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["id"], "1");
    }
}
