//! Stingray DB
//!
//! PostgreSQL data access layer: a table/relation metadata registry, records with
//! a soft-delete lifecycle, relation synchronization and a join-graph searcher
//! that hydrates nested JSON from flat rows.

pub mod audit;
pub mod batch;
pub mod config;
pub mod error;
pub mod executor;
pub mod metadata;
pub mod model;
pub mod module;
pub mod searcher;
pub mod sql;
pub mod sync;
pub mod util;
pub mod value;

#[doc(hidden)]
pub mod infra;

pub use config::Config;
pub use error::{DbError, DbResult, ErrorKind};
pub use executor::Executor;
pub use metadata::{registry, set_tables, Registry, Relation, RelationExtra, RelationType, Table};
pub use model::{ModelDescriptor, Record};
pub use module::DataModule;
pub use searcher::{JoinTree, QueryModifier, SearchOptions, Searcher};
pub use sync::{many_to_many_sync, one_to_many_sync, SyncResultItem, SyncState};
pub use value::{Row, Value};
