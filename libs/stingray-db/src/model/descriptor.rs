//! Per-table column descriptor shared by every record of that table

use crate::metadata::{RelationType, Table};
use crate::util::snake_to_camel;
use indexmap::IndexMap;

/// Field names of the audit columns maintained by the record layer
pub(crate) mod fields {
    pub const ID: &str = "id";
    pub const GUID: &str = "guid";
    pub const DATE_CREATION: &str = "dateCreation";
    pub const DATE_CHANGES: &str = "dateChanges";
    pub const DATE_DELETED: &str = "dateDeleted";
    pub const USR_ACC_CREATION_ID: &str = "usrAccCreationId";
    pub const USR_ACC_CHANGES_ID: &str = "usrAccChangesId";

    /// Never copied from user data on insert or update
    pub const SYSTEM: [&str; 6] = [
        ID,
        DATE_CREATION,
        DATE_CHANGES,
        DATE_DELETED,
        USR_ACC_CREATION_ID,
        USR_ACC_CHANGES_ID,
    ];
}

/// Maps camelCase fields to `alias.column` and records which fields reference other tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    table_name: String,
    alias: String,
    columns: IndexMap<String, String>,
    foreigns: IndexMap<String, String>,
}

impl ModelDescriptor {
    pub fn new(table_name: &str, alias: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            alias: alias.to_string(),
            columns: IndexMap::new(),
            foreigns: IndexMap::new(),
        }
    }

    /// Register a field backed by `column` of this table
    pub fn column(mut self, field: &str, column: &str) -> Self {
        self.columns
            .insert(field.to_string(), format!("{}.{}", self.alias, column));
        self
    }

    /// Mark `field` as a foreign key into `table_name`
    pub fn foreign(mut self, field: &str, table_name: &str) -> Self {
        self.foreigns
            .insert(field.to_string(), table_name.to_string());
        self
    }

    /// Derive fields from table metadata. Plain belongsToOne relations with a
    /// `<target>_id` column become foreign fields.
    pub fn from_table(table: &Table) -> Self {
        let mut descriptor = Self::new(&table.table_name, &table.alias);
        for column in &table.columns {
            descriptor = descriptor.column(&snake_to_camel(column), column);
        }

        for relation in &table.relations {
            if relation.relation_type != RelationType::BelongsToOne || relation.extra.is_some() {
                continue;
            }
            let column = format!("{}_id", relation.table_name);
            if table.has_column(&column) {
                descriptor = descriptor.foreign(&snake_to_camel(&column), &relation.table_name);
            }
        }

        descriptor
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn foreigns(&self) -> &IndexMap<String, String> {
        &self.foreigns
    }

    /// `alias.column` for a field
    pub fn qualified_column(&self, field: &str) -> Option<&str> {
        self.columns.get(field).map(String::as_str)
    }

    /// Bare physical column for a field
    pub fn physical_column(&self, field: &str) -> Option<&str> {
        self.qualified_column(field).map(|q| self.strip_alias(q))
    }

    /// Reverse lookup accepting `alias.column` or a bare column name
    pub fn field_for_column(&self, column: &str) -> Option<&str> {
        let bare = self.strip_alias(column);
        self.columns
            .iter()
            .find(|(_, qualified)| qualified.as_str() == column || self.strip_alias(qualified) == bare)
            .map(|(field, _)| field.as_str())
    }

    fn strip_alias<'c>(&self, column: &'c str) -> &'c str {
        column
            .strip_prefix(self.alias.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Relation;

    fn order_table() -> Table {
        Table::new("order", "ord")
            .with_columns(&["id", "customer_id", "billing_address_id", "date_deleted"])
            .with_relation(Relation::belongs_to_one("customer"))
            .with_relation(
                Relation::belongs_to_one("address")
                    .named("billingAddress")
                    .with_extra("ba", "billing_address"),
            )
            .with_relation(Relation::has_many("order_line"))
    }

    #[test]
    fn test_from_table() {
        let d = ModelDescriptor::from_table(&order_table());
        assert_eq!(d.qualified_column("customerId"), Some("ord.customer_id"));
        assert_eq!(d.physical_column("dateDeleted"), Some("date_deleted"));
        assert_eq!(d.foreigns().get("customerId").map(String::as_str), Some("customer"));
        assert_eq!(d.foreigns().len(), 1);
    }

    #[test]
    fn test_field_for_column() {
        let d = ModelDescriptor::from_table(&order_table());
        assert_eq!(d.field_for_column("ord.customer_id"), Some("customerId"));
        assert_eq!(d.field_for_column("customer_id"), Some("customerId"));
        assert_eq!(d.field_for_column("ord.unknown"), None);
    }
}
