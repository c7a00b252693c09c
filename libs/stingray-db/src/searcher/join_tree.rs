//! Join specification tree
//!
//! Callers describe what to load as a nested mapping such as
//! `{"order": {"customer": null, "orderLine": {"product": null}}}`. Keys are table
//! names at the root and relation names below it.

use crate::error::{DbError, DbResult};
use crate::metadata::{Registry, Relation, Table};
use crate::util::snake_to_camel;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinNode {
    pub key: String,
    pub children: Vec<JoinNode>,
}

impl JoinNode {
    pub fn leaf(key: &str) -> Self {
        Self {
            key: key.to_string(),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut JoinNode> {
        self.children.iter_mut().find(|c| c.key == key)
    }

    fn from_json(key: &str, value: &serde_json::Value) -> DbResult<Self> {
        let mut node = Self::leaf(key);
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Object(children) => {
                for (child_key, child) in children {
                    node.children.push(Self::from_json(child_key, child)?);
                }
            }
            other => {
                return Err(DbError::ShapeViolation(format!(
                    "join key {key} must map to null or an object, got {other}"
                )))
            }
        }
        Ok(node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTree {
    root: JoinNode,
}

impl JoinTree {
    pub fn new(root_key: &str) -> Self {
        Self {
            root: JoinNode::leaf(root_key),
        }
    }

    /// Parse a nested mapping with exactly one root key
    pub fn parse(spec: &serde_json::Value) -> DbResult<Self> {
        let object = spec.as_object().ok_or_else(|| {
            DbError::ShapeViolation("join tree must be an object".to_string())
        })?;

        let mut entries = object.iter();
        match (entries.next(), entries.next()) {
            (Some((key, value)), None) => Ok(Self {
                root: JoinNode::from_json(key, value)?,
            }),
            _ => Err(DbError::ShapeViolation(format!(
                "join tree must have exactly one root key, got {}",
                object.len()
            ))),
        }
    }

    pub fn root(&self) -> &JoinNode {
        &self.root
    }

    /// Extend the tree with a dotted path. Every prefix of the path must already
    /// be present; an existing final node keeps its subtree.
    pub fn insert_path(&mut self, path: &str) -> DbResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        let (last, prefix) = match segments.split_last() {
            Some((last, prefix)) if !prefix.is_empty() && !last.is_empty() => (*last, prefix),
            _ => {
                return Err(DbError::ShapeViolation(format!(
                    "join path \"{path}\" must start at the root and name a relation"
                )))
            }
        };

        if prefix[0] != self.root.key {
            return Err(DbError::ShapeViolation(format!(
                "Property {} is not presented in current join graph",
                prefix[0]
            )));
        }

        let mut node = &mut self.root;
        for segment in &prefix[1..] {
            node = node.child_mut(segment).ok_or_else(|| {
                DbError::ShapeViolation(format!(
                    "Property {segment} is not presented in current join graph"
                ))
            })?;
        }

        if node.child_mut(last).is_none() {
            node.children.push(JoinNode::leaf(last));
        }
        Ok(())
    }

    /// Bind every key to its table and relation
    pub(crate) fn resolve(&self, registry: &Registry) -> DbResult<ResolvedNode> {
        let table = match registry.find_table(&self.root.key) {
            Ok(table) => table.clone(),
            Err(err) => registry
                .tables()
                .iter()
                .find(|t| snake_to_camel(&t.table_name) == self.root.key)
                .cloned()
                .ok_or(err)?,
        };

        ResolvedNode::build(&self.root, table, None, registry)
    }
}

/// A join node bound to metadata
#[derive(Debug, Clone)]
pub(crate) struct ResolvedNode {
    pub key: String,
    pub table: Arc<Table>,
    /// Relation from the parent node, `None` at the root
    pub relation: Option<Relation>,
    pub children: Vec<ResolvedNode>,
}

impl ResolvedNode {
    fn build(
        node: &JoinNode,
        table: Arc<Table>,
        relation: Option<Relation>,
        registry: &Registry,
    ) -> DbResult<Self> {
        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let child_relation = registry
                .find_relation(&table, &child.key)
                .map_err(|err| DbError::ShapeViolation(err.to_string()))?
                .clone();
            let child_table = registry.find_table(&child_relation.table_name)?.clone();
            children.push(Self::build(child, child_table, Some(child_relation), registry)?);
        }

        Ok(Self {
            key: node.key.clone(),
            table,
            relation,
            children,
        })
    }

    /// SQL alias and column prefix, honoring a relation's alias override
    pub fn naming(&self) -> (&str, &str) {
        match self.relation.as_ref().and_then(|r| r.extra.as_ref()) {
            Some(extra) => (extra.alias.as_str(), extra.prefix.as_str()),
            None => (self.table.alias.as_str(), self.table.table_name.as_str()),
        }
    }

    pub fn is_one_to_one(&self) -> bool {
        self.relation
            .as_ref()
            .is_some_and(|r| r.relation_type.is_one_to_one())
    }

    /// A childless copy, used when partitioning into query units
    pub fn without_children(&self) -> Self {
        Self {
            key: self.key.clone(),
            table: self.table.clone(),
            relation: self.relation.clone(),
            children: Vec::new(),
        }
    }
}
