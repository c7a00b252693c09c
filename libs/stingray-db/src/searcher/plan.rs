//! Query planning
//!
//! A resolved join tree is cut at every hasMany edge. Each piece becomes one
//! SELECT whose one-to-one relations are LEFT JOINed; hasMany children start a
//! new unit one depth further down, filtered by the parent identifiers.

use super::join_tree::ResolvedNode;
use crate::error::{DbError, DbResult};
use crate::metadata::{RelationType, Table};
use crate::sql::{check_identifier_length, SelectQuery, POSTGRES_MAX_IDENTIFIER_LENGTH};
use crate::value::Value;
use sea_orm::sea_query::{Alias, Expr, SimpleExpr};
use std::collections::HashSet;
use std::sync::Arc;

const DATE_DELETED: &str = "date_deleted";

/// One SELECT of the plan
#[derive(Debug, Clone)]
pub(crate) struct QueryUnit {
    /// Unit root with its one-to-one subtree only
    pub node: ResolvedNode,
    /// Fan-out nesting level, 0 for the root query
    pub depth: usize,
    /// Join keys leading to the parent entity, empty for the root query
    pub previous_path: Vec<String>,
    /// Table owning the hasMany relation, `None` for the root query
    pub parent_table: Option<Arc<Table>>,
}

impl QueryUnit {
    /// Dotted cache path of the unit's root entities
    pub fn path(&self) -> String {
        join_path(&self.previous_path, &self.node.key)
    }

    pub fn parent_path(&self) -> String {
        self.previous_path.join(".")
    }

    /// Column of the unit's root table referencing the parent, e.g. `order_id`
    pub fn parent_key_column(&self) -> Option<String> {
        self.parent_table
            .as_ref()
            .map(|parent| format!("{}_id", parent.table_name))
    }
}

pub(crate) fn join_path(previous: &[String], key: &str) -> String {
    if previous.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", previous.join("."), key)
    }
}

/// Split the tree into query units ordered by depth
pub(crate) fn partition(root: &ResolvedNode) -> Vec<QueryUnit> {
    let mut units = Vec::new();
    push_unit(root, 0, Vec::new(), None, &mut units);
    units.sort_by_key(|unit| unit.depth);
    units
}

fn push_unit(
    node: &ResolvedNode,
    depth: usize,
    previous_path: Vec<String>,
    parent_table: Option<Arc<Table>>,
    units: &mut Vec<QueryUnit>,
) {
    let path = {
        let mut path = previous_path.clone();
        path.push(node.key.clone());
        path
    };
    let local = split(node, depth, &path, units);
    units.push(QueryUnit {
        node: local,
        depth,
        previous_path,
        parent_table,
    });
}

/// Keep one-to-one children in place and hand hasMany children to new units
fn split(
    node: &ResolvedNode,
    depth: usize,
    path: &[String],
    units: &mut Vec<QueryUnit>,
) -> ResolvedNode {
    let mut local = node.without_children();

    for child in node.children.iter().filter(|c| c.is_one_to_one()) {
        let mut child_path = path.to_vec();
        child_path.push(child.key.clone());
        local.children.push(split(child, depth, &child_path, units));
    }

    for child in node.children.iter().filter(|c| !c.is_one_to_one()) {
        push_unit(
            child,
            depth + 1,
            path.to_vec(),
            Some(node.table.clone()),
            units,
        );
    }

    local
}

/// SELECT for one unit before root-only modifiers are applied
#[derive(Debug, Clone)]
pub(crate) struct UnitQuery {
    pub select: SelectQuery,
    /// `short_<n>` output names and the `<prefix>_<column>` names they stand for
    pub short_columns: Vec<(String, String)>,
}

pub(crate) fn plan_unit(
    unit: &QueryUnit,
    parent_ids: Option<Vec<Value>>,
    show_deleted: bool,
) -> DbResult<UnitQuery> {
    let root = &unit.node;
    let (alias, _) = root.naming();
    check_identifier_length(&root.table.table_name)?;
    check_identifier_length(alias)?;

    let mut select = SelectQuery::from(&root.table.table_name, alias);

    if !show_deleted && root.table.has_column(DATE_DELETED) {
        select.and_where_null(&format!("{alias}.{DATE_DELETED}"));
    }

    if let (Some(ids), Some(column)) = (parent_ids, unit.parent_key_column()) {
        if !root.table.has_column(&column) {
            return Err(DbError::ShapeViolation(format!(
                "Table {} has no column {column} referencing its parent",
                root.table.table_name
            )));
        }
        select.and_where_in(&format!("{alias}.{column}"), ids);
    }

    let mut builder = UnitBuilder {
        select,
        short_columns: Vec::new(),
        aliases: HashSet::new(),
        show_deleted,
    };
    builder.add_columns(root)?;
    builder.add_joins(root)?;

    Ok(UnitQuery {
        select: builder.select,
        short_columns: builder.short_columns,
    })
}

struct UnitBuilder {
    select: SelectQuery,
    short_columns: Vec<(String, String)>,
    aliases: HashSet<String>,
    show_deleted: bool,
}

impl UnitBuilder {
    /// Alias every column as `<prefix>_<column>`, or `short_<n>` when that would
    /// not fit into a PostgreSQL identifier
    fn add_columns(&mut self, node: &ResolvedNode) -> DbResult<()> {
        let (alias, prefix) = node.naming();
        if !self.aliases.insert(alias.to_string()) {
            return Err(DbError::ShapeViolation(format!(
                "alias {alias} is used more than once in one query"
            )));
        }

        for column in &node.table.columns {
            check_identifier_length(column)?;

            let output = format!("{prefix}_{column}");
            if output.len() <= POSTGRES_MAX_IDENTIFIER_LENGTH {
                self.select.column(alias, column, &output);
                continue;
            }

            let short = format!("short_{}", self.short_columns.len() + 1);
            self.select.column(alias, column, &short);
            self.short_columns.push((short, output));
        }
        Ok(())
    }

    fn add_joins(&mut self, parent: &ResolvedNode) -> DbResult<()> {
        for child in &parent.children {
            let (child_alias, _) = child.naming();
            check_identifier_length(&child.table.table_name)?;
            check_identifier_length(child_alias)?;

            self.add_columns(child)?;
            let on = self.join_condition(parent, child)?;
            self.select
                .left_join(&child.table.table_name, child_alias, on);
            self.add_joins(child)?;
        }
        Ok(())
    }

    fn join_condition(&self, parent: &ResolvedNode, child: &ResolvedNode) -> DbResult<SimpleExpr> {
        let relation = child.relation.as_ref().ok_or_else(|| {
            DbError::ShapeViolation(format!("{} is joined without a relation", child.key))
        })?;

        if let Some(condition) = &relation.condition {
            return Ok(Expr::cust(condition.as_str()));
        }

        let (parent_alias, _) = parent.naming();
        let (child_alias, child_prefix) = child.naming();

        let cannot_join = || {
            DbError::ShapeViolation(format!(
                "Unable to build join condition between {} and {}",
                parent.table.table_name, child.table.table_name
            ))
        };

        let qualified = |alias: &str, column: &str| (Alias::new(alias), Alias::new(column));

        let on = match relation.relation_type {
            RelationType::BelongsToOne => {
                let foreign_key = [
                    format!("{child_prefix}_id"),
                    format!("{}_id", child.table.table_name),
                ]
                .into_iter()
                .find(|column| parent.table.has_column(column))
                .ok_or_else(cannot_join)?;
                if !child.table.has_column("id") {
                    return Err(cannot_join());
                }
                Expr::col(qualified(child_alias, "id")).equals(qualified(parent_alias, &foreign_key))
            }
            RelationType::HasOne => {
                let foreign_key = format!("{}_id", parent.table.table_name);
                if !child.table.has_column(&foreign_key) || !parent.table.has_column("id") {
                    return Err(cannot_join());
                }
                Expr::col(qualified(child_alias, &foreign_key)).equals(qualified(parent_alias, "id"))
            }
            RelationType::HasMany => return Err(cannot_join()),
        };

        if !self.show_deleted && child.table.has_column(DATE_DELETED) {
            return Ok(on.and(Expr::col(qualified(child_alias, DATE_DELETED)).is_null()));
        }
        Ok(on)
    }
}
