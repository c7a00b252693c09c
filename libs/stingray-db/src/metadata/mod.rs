//! Table and relation metadata
//!
//! Tables are produced by an external generator and installed once at startup via
//! [`set_tables`]. Lookups accept either the logical name or the physical table name.

pub mod registry;
pub mod table;

pub use registry::{install, registry, set_tables, Registry};
pub use table::{Relation, RelationExtra, RelationType, Table};
