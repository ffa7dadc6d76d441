//! Catalog model shared by every phase.
//!
//! - [`schema`]: entity types (tables, columns, keys, constraints, routines)
//! - [`catalog`]: the frozen per-database aggregate with its lookup maps
//! - [`identifier`]: bracket quoting and qualified names
//! - [`value`]: decoded row values and literal rendering
//! - [`traits`]: the [`CatalogReader`] seam

pub mod catalog;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::{Catalog, CatalogData};
pub use schema::{
    Column, Constraint, ConstraintKind, Database, DefaultConstraint, ForeignKey, GeneratedRole,
    HistoryTable, Index, KeyColumn, ObjectId, ObjectKind, Routine, RoutineKind, Schema, Table,
    TableType,
};
pub use traits::{CatalogReader, RowValues, TableScope};
pub use value::{SqlValue, TypeCategory};
