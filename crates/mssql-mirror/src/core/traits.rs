//! The catalog reader seam.
//!
//! [`CatalogReader`] is everything the loader and the data phases need from a
//! live database: read-only introspection scoped by schema id, plus full
//! table reads. The tiberius implementation lives in `drivers::mssql`; tests
//! substitute in-memory readers.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;

use super::schema::{
    Column, Constraint, Database, ForeignKey, Index, ObjectId, Routine, RoutineKind, Schema,
    Table, TableType,
};
use super::value::SqlValue;

/// Which tables the table query returns.
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    /// Schemas whose tables are all selected.
    pub schema_ids: Vec<ObjectId>,
    /// Qualified names selected regardless of schema.
    pub include: BTreeSet<String>,
    /// Qualified names never selected.
    pub exclude: BTreeSet<String>,
}

impl TableScope {
    pub fn admits(&self, table: &Table) -> bool {
        let name = table.qualified_name();
        (self.schema_ids.contains(&table.schema_id) || self.include.contains(&name))
            && !self.exclude.contains(&name)
    }
}

/// One decoded row, values in the order of the requested columns.
pub type RowValues = Vec<SqlValue>;

/// Read-only access to one database's system catalog and rows.
///
/// Child queries (columns, keys, constraints, indexes) return everything in
/// the given schemas; callers discard rows whose parent table was not loaded.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Database id and name. `None` when the configured database is absent.
    async fn database(&self) -> Result<Option<Database>>;

    /// All user schema names.
    async fn schema_names(&self) -> Result<Vec<String>>;

    /// Schemas with the given names.
    async fn schemas(&self, names: &BTreeSet<String>) -> Result<Vec<Schema>>;

    /// User tables in scope. History tables of temporal pairs are omitted.
    async fn tables(&self, scope: &TableScope) -> Result<Vec<Table>>;

    async fn columns(&self, schema_ids: &[ObjectId]) -> Result<Vec<Column>>;

    async fn foreign_keys(&self, schema_ids: &[ObjectId]) -> Result<Vec<ForeignKey>>;

    /// Primary key, unique, default and check constraints.
    async fn constraints(&self, schema_ids: &[ObjectId]) -> Result<Vec<Constraint>>;

    /// Non-unique secondary indexes.
    async fn indexes(&self, schema_ids: &[ObjectId]) -> Result<Vec<Index>>;

    async fn table_types(&self, schema_ids: &[ObjectId]) -> Result<Vec<TableType>>;

    async fn routines(&self, kinds: &[RoutineKind], schema_ids: &[ObjectId]) -> Result<Vec<Routine>>;

    /// Last observed write per table, keyed by qualified name. Tables with no
    /// recorded activity are absent.
    async fn last_changes(&self, schema_ids: &[ObjectId]) -> Result<BTreeMap<String, NaiveDateTime>>;

    /// Every row of `table`, restricted to `columns`.
    async fn rows(&self, table: &Table, columns: &[&Column]) -> Result<Vec<RowValues>>;

    /// Open a connection and run a trivial query.
    async fn ping(&self) -> Result<()>;
}
