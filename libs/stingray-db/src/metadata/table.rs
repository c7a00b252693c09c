//! Table and relation descriptors

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationType {
    HasOne,
    BelongsToOne,
    HasMany,
}

impl RelationType {
    /// hasOne and belongsToOne can share a statement with their parent
    pub fn is_one_to_one(self) -> bool {
        matches!(self, Self::HasOne | Self::BelongsToOne)
    }
}

/// Alias override for a table joined more than once under different foreign keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationExtra {
    pub alias: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub table_name: String,
    pub relation_type: RelationType,
    /// Raw SQL predicate replacing the default identity join
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<RelationExtra>,
}

impl Relation {
    pub fn new(table_name: &str, relation_type: RelationType) -> Self {
        Self {
            name: None,
            table_name: table_name.to_string(),
            relation_type,
            condition: None,
            extra: None,
        }
    }

    pub fn has_one(table_name: &str) -> Self {
        Self::new(table_name, RelationType::HasOne)
    }

    pub fn belongs_to_one(table_name: &str) -> Self {
        Self::new(table_name, RelationType::BelongsToOne)
    }

    pub fn has_many(table_name: &str) -> Self {
        Self::new(table_name, RelationType::HasMany)
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn with_extra(mut self, alias: &str, prefix: &str) -> Self {
        self.extra = Some(RelationExtra {
            alias: alias.to_string(),
            prefix: prefix.to_string(),
        });
        self
    }

    /// Matches by logical name or by target table name
    pub fn matches(&self, key: &str) -> bool {
        self.name.as_deref() == Some(key) || self.table_name == key
    }
}

/// Physical table metadata as produced by the tables generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub table_name: String,
    /// Default SQL alias, unique among the tables of one query
    pub alias: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Table {
    pub fn new(table_name: &str, alias: &str) -> Self {
        Self {
            name: None,
            table_name: table_name.to_string(),
            alias: alias.to_string(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn matches(&self, key: &str) -> bool {
        self.name.as_deref() == Some(key) || self.table_name == key
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Logical name, falling back to the physical one
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.table_name)
    }
}
