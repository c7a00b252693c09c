//! Folding flat rows into nested entities
//!
//! Entities live in an arena and are referenced by index. Every dotted join path
//! maps to the entities materialized under it, which is where fan-out units find
//! their parents. Within one unit, entities are de-duplicated per path by id.

use super::join_tree::ResolvedNode;
use super::plan::QueryUnit;
use crate::util::{is_id_field, snake_to_camel};
use crate::value::{Row, Value};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

type EntityId = usize;

#[derive(Debug)]
enum Link {
    One(EntityId),
    Many(Vec<EntityId>),
}

#[derive(Debug, Default)]
struct Entity {
    fields: IndexMap<String, Value>,
    links: IndexMap<String, Link>,
}

impl Entity {
    fn id(&self) -> Option<String> {
        self.fields.get("id").and_then(Value::to_id_string)
    }
}

/// Path-keyed entity cache for one execution
#[derive(Debug, Default)]
pub(crate) struct HydrationCache {
    entities: Vec<Entity>,
    paths: HashMap<String, Vec<EntityId>>,
}

/// Per-unit lookup: path -> id -> entity
type LocalCache = HashMap<String, HashMap<String, EntityId>>;

impl HydrationCache {
    /// Register empty buckets for a unit's root and all of its one-to-one paths
    pub fn init_paths(&mut self, unit: &QueryUnit) {
        fn walk(cache: &mut HydrationCache, node: &ResolvedNode, path: String) {
            for child in &node.children {
                walk(cache, child, format!("{path}.{}", child.key));
            }
            cache.paths.entry(path).or_default();
        }
        walk(self, &unit.node, unit.path());
    }

    /// Identifiers of the entities a fan-out unit hangs under, without duplicates
    pub fn parent_ids(&self, unit: &QueryUnit) -> Vec<Value> {
        let mut seen = HashSet::new();
        self.paths
            .get(&unit.parent_path())
            .into_iter()
            .flatten()
            .filter_map(|&eid| self.entities[eid].id())
            .filter(|id| seen.insert(id.clone()))
            .map(|id| Value::id_param(&id))
            .collect()
    }

    /// Hydrate one unit's rows and attach its root entities to their parents
    pub fn absorb(&mut self, unit: &QueryUnit, rows: &[Row]) {
        let unit_path = unit.path();
        let mut local = LocalCache::new();
        let mut roots = Vec::new();
        let mut seen_roots = HashSet::new();

        for row in rows {
            let Some(root) = self.entity_for(&unit.node, row, &unit_path, &mut local) else {
                continue;
            };
            if seen_roots.insert(root) {
                roots.push(root);
            }
            self.link_children(&unit.node, root, row, &unit_path, &mut local);
        }

        let Some(parent_table) = &unit.parent_table else {
            self.paths.insert(unit_path, roots);
            return;
        };

        let parents = self
            .paths
            .get(&unit.parent_path())
            .cloned()
            .unwrap_or_default();

        let mut parents_by_id: HashMap<String, Vec<EntityId>> = HashMap::new();
        for &parent in &parents {
            self.entities[parent]
                .links
                .entry(unit.node.key.clone())
                .or_insert_with(|| Link::Many(Vec::new()));
            if let Some(id) = self.entities[parent].id() {
                parents_by_id.entry(id).or_default().push(parent);
            }
        }

        let key_field = snake_to_camel(&format!("{}_id", parent_table.table_name));
        for &root in &roots {
            self.paths.entry(unit_path.clone()).or_default().push(root);

            let Some(parent_id) = self.entities[root]
                .fields
                .get(&key_field)
                .and_then(Value::to_id_string)
            else {
                continue;
            };

            for &parent in parents_by_id.get(&parent_id).into_iter().flatten() {
                if let Some(Link::Many(children)) =
                    self.entities[parent].links.get_mut(&unit.node.key)
                {
                    children.push(root);
                }
            }
        }
    }

    pub fn render(&self, path: &str) -> Vec<serde_json::Value> {
        self.paths
            .get(path)
            .into_iter()
            .flatten()
            .map(|&eid| self.render_entity(eid))
            .collect()
    }

    fn render_entity(&self, eid: EntityId) -> serde_json::Value {
        let entity = &self.entities[eid];
        let mut object = serde_json::Map::new();

        for (field, value) in &entity.fields {
            object.insert(field.clone(), value.to_json());
        }
        for (key, link) in &entity.links {
            let rendered = match link {
                Link::One(child) => self.render_entity(*child),
                Link::Many(children) => serde_json::Value::Array(
                    children.iter().map(|&c| self.render_entity(c)).collect(),
                ),
            };
            object.insert(key.clone(), rendered);
        }

        serde_json::Value::Object(object)
    }

    fn link_children(
        &mut self,
        node: &ResolvedNode,
        parent: EntityId,
        row: &Row,
        path: &str,
        local: &mut LocalCache,
    ) {
        for child in &node.children {
            let child_path = format!("{path}.{}", child.key);

            // A LEFT JOIN without a match yields a child whose id is NULL
            let Some(eid) = self.entity_for(child, row, &child_path, local) else {
                continue;
            };

            self.entities[parent]
                .links
                .insert(child.key.clone(), Link::One(eid));

            let bucket = self.paths.entry(child_path.clone()).or_default();
            if !bucket.contains(&eid) {
                bucket.push(eid);
            }

            self.link_children(child, eid, row, &child_path, local);
        }
    }

    /// Reuse the entity already built for this id on this path, or build it from
    /// the row. `None` when the row carries no entity for the node.
    fn entity_for(
        &mut self,
        node: &ResolvedNode,
        row: &Row,
        path: &str,
        local: &mut LocalCache,
    ) -> Option<EntityId> {
        let (_, prefix) = node.naming();

        let id = if node.table.has_column("id") {
            match row.get(&format!("{prefix}_id")) {
                None | Some(Value::Null) => return None,
                Some(value) => value.to_id_string(),
            }
        } else {
            None
        };

        if let Some(id) = &id {
            if let Some(&eid) = local.get(path).and_then(|bucket| bucket.get(id)) {
                return Some(eid);
            }
        }

        let mut entity = Entity::default();
        for column in &node.table.columns {
            let field = snake_to_camel(column);
            let value = row
                .get(&format!("{prefix}_{column}"))
                .cloned()
                .unwrap_or_default();
            let value = if is_id_field(&field) {
                value.normalize_id()
            } else {
                value
            };
            entity.fields.insert(field, value);
        }

        let eid = self.entities.len();
        self.entities.push(entity);
        if let Some(id) = id {
            local.entry(path.to_string()).or_default().insert(id, eid);
        }
        Some(eid)
    }
}
