//! Table registry and the process-wide snapshot

use super::table::{Relation, Table};
use crate::error::{DbError, DbResult};
use anyhow::Context;
use arc_swap::ArcSwapOption;
use std::path::Path;
use std::sync::Arc;

static TABLES: ArcSwapOption<Registry> = ArcSwapOption::const_empty();

/// Install the process-wide table list, replacing any previous one.
///
/// Must happen before the first [`registry`] lookup. Searchers already holding a
/// snapshot keep using it.
pub fn set_tables(tables: Vec<Table>) -> Arc<Registry> {
    install(Registry::new(tables))
}

/// Install an already built registry, e.g. one loaded from generator output
pub fn install(registry: Registry) -> Arc<Registry> {
    let registry = Arc::new(registry);
    TABLES.store(Some(registry.clone()));
    tracing::info!(tables = registry.len(), "Table registry installed");
    registry
}

/// Current process-wide registry snapshot
pub fn registry() -> DbResult<Arc<Registry>> {
    TABLES.load_full().ok_or(DbError::RegistryNotInitialized)
}

/// Immutable set of table descriptors
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tables: Vec<Arc<Table>>,
}

impl Registry {
    pub fn new(tables: Vec<Table>) -> Self {
        Self {
            tables: tables.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_json_str(input: &str) -> DbResult<Self> {
        let tables: Vec<Table> = serde_json::from_str(input)?;
        Ok(Self::new(tables))
    }

    pub fn from_yaml_str(input: &str) -> anyhow::Result<Self> {
        let tables: Vec<Table> =
            serde_yaml::from_str(input).context("Failed to parse table metadata YAML")?;
        Ok(Self::new(tables))
    }

    /// Load generator output from disk; `.yaml`/`.yml` files are YAML, anything else JSON
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read table metadata from {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );

        if is_yaml {
            Self::from_yaml_str(&raw)
        } else {
            Self::from_json_str(&raw)
                .with_context(|| format!("Failed to parse table metadata in {}", path.display()))
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    /// Find by logical name or physical table name
    pub fn find_table(&self, name: &str) -> DbResult<&Arc<Table>> {
        self.tables
            .iter()
            .find(|t| t.matches(name))
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn find_relation<'t>(&self, table: &'t Table, name: &str) -> DbResult<&'t Relation> {
        if table.relations.is_empty() {
            return Err(DbError::NoRelations {
                table: table.table_name.clone(),
            });
        }

        table
            .relations
            .iter()
            .find(|r| r.matches(name))
            .ok_or_else(|| DbError::RelationNotFound {
                table: table.table_name.clone(),
                relation: name.to_string(),
            })
    }

    /// Resolve the table at the end of a join path. The first segment names a
    /// table, every following segment a relation of the previous one.
    pub fn resolve_table_by_path<S: AsRef<str>>(&self, path: &[S]) -> DbResult<&Arc<Table>> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| DbError::ShapeViolation("empty join path".to_string()))?;

        let mut table = self.find_table(first.as_ref())?;
        for segment in rest {
            let relation = self.find_relation(table, segment.as_ref())?;
            table = self.find_table(&relation.table_name)?;
        }
        Ok(table)
    }
}
