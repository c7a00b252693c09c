//! Join-graph searcher
//!
//! A [`Searcher`] turns a [`JoinTree`] into one SELECT per hasMany boundary,
//! runs them depth by depth and folds the flat rows back into nested JSON.
//!
//! ```ignore
//! let orders = Searcher::new(&db, "order")?
//!     .join("order.customer")?
//!     .join("order.orderLine")?
//!     .sort("ord.date_creation", Some("desc"), false)?
//!     .page(20, 1)?
//!     .execute()
//!     .await?;
//! ```

mod hydrate;
mod join_tree;
mod plan;

pub use join_tree::{JoinNode, JoinTree};

use crate::batch::run_bounded;
use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use crate::metadata::{registry, Registry};
use crate::sql::{validate_identifier_path, Direction, SelectQuery};
use crate::util::{normalize_direction, snake_to_camel};
use crate::value::{Row, Value};
use hydrate::HydrationCache;
use plan::{partition, plan_unit, QueryUnit, UnitQuery};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Caller-supplied change to a generated SELECT
pub type QueryModifier = Arc<dyn Fn(&mut SelectQuery) + Send + Sync>;

/// Execution knobs shared by every query of one search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Disable every soft-delete predicate
    pub show_deleted: bool,
    /// Maximum fan-out queries in flight per depth
    pub concurrency: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            show_deleted: false,
            concurrency: 8,
        }
    }
}

impl From<&Config> for SearchOptions {
    fn from(config: &Config) -> Self {
        Self {
            show_deleted: config.show_deleted,
            concurrency: config.fan_out_concurrency,
        }
    }
}

#[derive(Debug, Clone)]
struct Sort {
    column: String,
    direction: Direction,
    as_string: bool,
}

#[derive(Debug, Clone, Copy)]
struct Page {
    size: u64,
    offset: u64,
}

impl Page {
    /// 1-based page; the offset must fit into a bigint
    fn new(size: u64, number: u64) -> DbResult<Self> {
        let invalid = || DbError::validation(format!("Invalid page: size {size}, number {number}"));
        if size == 0 || number == 0 {
            return Err(invalid());
        }
        let offset = size
            .checked_mul(number - 1)
            .filter(|offset| i64::try_from(*offset).is_ok() && i64::try_from(size).is_ok())
            .ok_or_else(invalid)?;
        Ok(Self { size, offset })
    }
}

/// Join-graph query over a registry snapshot
pub struct Searcher<'a> {
    db: &'a dyn Executor,
    registry: Arc<Registry>,
    options: SearchOptions,
    join_tree: JoinTree,
    join_modifiers: Vec<(String, QueryModifier)>,
    modifiers: Vec<QueryModifier>,
    sorts: Vec<Sort>,
    page: Option<Page>,
}

impl<'a> Searcher<'a> {
    /// Search `table` using the process-wide registry
    pub fn new(db: &'a dyn Executor, table: &str) -> DbResult<Self> {
        Ok(Self::with_registry(db, registry()?, table))
    }

    pub fn with_registry(db: &'a dyn Executor, registry: Arc<Registry>, table: &str) -> Self {
        Self::from_join_tree(db, registry, JoinTree::new(&snake_to_camel(table)))
    }

    /// Start from a nested mapping like `{"order": {"customer": null}}`
    pub fn from_spec(
        db: &'a dyn Executor,
        registry: Arc<Registry>,
        spec: &serde_json::Value,
    ) -> DbResult<Self> {
        Ok(Self::from_join_tree(db, registry, JoinTree::parse(spec)?))
    }

    pub fn from_join_tree(db: &'a dyn Executor, registry: Arc<Registry>, join_tree: JoinTree) -> Self {
        Self {
            db,
            registry,
            options: SearchOptions::default(),
            join_tree,
            join_modifiers: Vec::new(),
            modifiers: Vec::new(),
            sorts: Vec::new(),
            page: None,
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn join_tree(&self) -> &JoinTree {
        &self.join_tree
    }

    // ===== Builders =====

    /// Add a dotted join path such as `order.orderLine.product`
    pub fn join(&mut self, path: &str) -> DbResult<&mut Self> {
        self.join_tree.insert_path(path)?;
        Ok(self)
    }

    /// Add a join path and modify the fan-out query rooted at it
    pub fn join_with<F>(&mut self, path: &str, modifier: F) -> DbResult<&mut Self>
    where
        F: Fn(&mut SelectQuery) + Send + Sync + 'static,
    {
        self.join_tree.insert_path(path)?;
        self.join_modifiers
            .push((path.to_string(), Arc::new(modifier)));
        Ok(self)
    }

    /// Modify the root query, e.g. to add filters
    pub fn modify_query<F>(&mut self, modifier: F) -> &mut Self
    where
        F: Fn(&mut SelectQuery) + Send + Sync + 'static,
    {
        self.modifiers.push(Arc::new(modifier));
        self
    }

    /// 1-based page of the root query
    pub fn page(&mut self, page_size: u64, page_number: u64) -> DbResult<&mut Self> {
        self.page = Some(Page::new(page_size, page_number)?);
        Ok(self)
    }

    /// Order the root query by `alias.column`. Direction defaults to ascending;
    /// `as_string` orders case-insensitively.
    pub fn sort(
        &mut self,
        column: &str,
        direction: Option<&str>,
        as_string: bool,
    ) -> DbResult<&mut Self> {
        validate_identifier_path(column)?;
        let direction = direction
            .map(normalize_direction)
            .transpose()?
            .unwrap_or(Direction::Asc);

        self.sorts.push(Sort {
            column: column.to_string(),
            direction,
            as_string,
        });
        Ok(self)
    }

    // ===== Execution =====

    pub async fn execute(&self) -> DbResult<Vec<serde_json::Value>> {
        self.run(self.page).await
    }

    /// Execute and deserialize every root entity
    pub async fn execute_as<T: DeserializeOwned>(&self) -> DbResult<Vec<T>> {
        self.execute()
            .await?
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(DbError::from))
            .collect()
    }

    /// Walk every page until one comes back empty
    pub async fn execute_by_pages(&self, page_size: u64) -> DbResult<Vec<serde_json::Value>> {
        if page_size == 0 {
            return Err(DbError::validation("Page size must be positive"));
        }

        let mut items = Vec::new();
        for number in 1.. {
            let page = self.run(Some(Page::new(page_size, number)?)).await?;
            if page.is_empty() {
                break;
            }
            items.extend(page);
        }
        Ok(items)
    }

    /// At most one root entity
    pub async fn execute_for_one(&self) -> DbResult<Option<serde_json::Value>> {
        let mut items = self.execute().await?;
        match items.len() {
            0 | 1 => Ok(items.pop()),
            n => Err(DbError::AmbiguousRecordSet(n)),
        }
    }

    /// Number of root rows; ignores sorting and paging
    pub async fn count(&self) -> DbResult<u64> {
        let resolved = self.join_tree.resolve(&self.registry)?;
        let units = partition(&resolved);
        let Some(root) = units.first() else {
            return Ok(0);
        };

        let mut planned = plan_unit(root, None, self.options.show_deleted)?;
        for modifier in &self.modifiers {
            modifier(&mut planned.select);
        }

        let rows = self.db.fetch_all(&planned.select.build_count()).await?;
        match rows.first().and_then(|row| row.get("count")) {
            Some(Value::Int(count)) => u64::try_from(*count).map_err(|_| DbError::Decode {
                column: "count".to_string(),
            }),
            _ => Err(DbError::Decode {
                column: "count".to_string(),
            }),
        }
    }

    async fn run(&self, page: Option<Page>) -> DbResult<Vec<serde_json::Value>> {
        let resolved = self.join_tree.resolve(&self.registry)?;
        let units = partition(&resolved);
        let Some((root, fan_outs)) = units.split_first() else {
            return Ok(Vec::new());
        };
        let max_depth = units.last().map_or(0, |unit| unit.depth);
        tracing::debug!(
            root = %root.path(),
            units = units.len(),
            max_depth,
            "Planned search"
        );

        let mut cache = HydrationCache::default();
        for unit in &units {
            cache.init_paths(unit);
        }

        let mut root_query = plan_unit(root, None, self.options.show_deleted)?;
        self.apply_root_modifiers(&mut root_query.select, page)?;
        let rows = self.fetch(&root_query).await?;
        cache.absorb(root, &rows);

        for depth in 1..=max_depth {
            let level: Vec<&QueryUnit> = fan_outs.iter().filter(|u| u.depth == depth).collect();

            let mut planned = Vec::with_capacity(level.len());
            for unit in &level {
                let parent_ids = cache.parent_ids(unit);
                if parent_ids.is_empty() {
                    tracing::trace!(path = %unit.path(), "Skipping fan-out without parents");
                    planned.push(None);
                    continue;
                }

                let mut query = plan_unit(unit, Some(parent_ids), self.options.show_deleted)?;
                let path = unit.path();
                for (_, modifier) in self.join_modifiers.iter().filter(|(p, _)| *p == path) {
                    modifier(&mut query.select);
                }
                planned.push(Some(query));
            }

            let results = run_bounded(
                planned.iter().map(|query| async move {
                    match query {
                        Some(query) => self.fetch(query).await,
                        None => Ok(Vec::new()),
                    }
                }),
                self.options.concurrency,
            )
            .await;

            // Hydrate after the whole depth has finished
            for (unit, rows) in level.iter().zip(results) {
                cache.absorb(unit, &rows?);
            }
        }

        Ok(cache.render(&root.path()))
    }

    fn apply_root_modifiers(&self, select: &mut SelectQuery, page: Option<Page>) -> DbResult<()> {
        for modifier in &self.modifiers {
            modifier(select);
        }

        for sort in &self.sorts {
            if sort.as_string {
                select.order_by_lower(&sort.column, sort.direction)?;
            } else {
                select.order_by(&sort.column, sort.direction)?;
            }
        }

        if let Some(page) = page {
            select.limit(page.size).offset(page.offset);
        }
        Ok(())
    }

    /// Run one unit and restore the column names shortened for PostgreSQL
    async fn fetch(&self, unit: &UnitQuery) -> DbResult<Vec<Row>> {
        let mut rows = self.db.fetch_all(&unit.select.build()).await?;
        if unit.short_columns.is_empty() {
            return Ok(rows);
        }

        for row in &mut rows {
            for (short, real) in &unit.short_columns {
                if let Some(value) = row.shift_remove(short) {
                    row.insert(real.clone(), value);
                }
            }
        }
        Ok(rows)
    }
}
