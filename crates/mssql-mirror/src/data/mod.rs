//! Row reconciliation: the seed and update phases.
//!
//! Seed fills empty target tables with every source row. Update upserts
//! source rows into tables the target already has, when the source saw
//! writes at or after the target's last recorded write. Both only touch
//! tables with a primary key and at least one source row.

pub mod ordering;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::schema::{Column, ObjectKind, Table};
use crate::core::traits::CatalogReader;
use crate::core::value::NULL_LITERAL;
use crate::core::Catalog;
use crate::drivers::mssql::dialect;
use crate::error::Result;
use crate::script::{Phase, Script};
use crate::selector::Selection;

/// Maximum rows per INSERT ... VALUES statement.
pub const INSERT_CHUNK_ROWS: usize = 1000;

/// One row: column name to rendered literal.
pub type Row = BTreeMap<String, String>;

/// Rows per qualified table name.
pub type RowBucket = BTreeMap<String, Vec<Row>>;

/// Rows read by the seed and update phases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSet {
    #[serde(default)]
    pub seed: RowBucket,
    #[serde(default)]
    pub update: RowBucket,
}

impl DataSet {
    pub fn is_empty(&self) -> bool {
        self.seed.is_empty() && self.update.is_empty()
    }
}

/// Where source rows come from.
#[derive(Clone, Copy)]
pub enum RowSource<'a> {
    /// Query the source database.
    Live(&'a dyn CatalogReader),
    /// Rows captured in a snapshot.
    Snapshot(&'a DataSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Seed,
    Update,
}

/// Builds the seed and update scripts and records the rows it read.
pub struct DataReconciler<'a> {
    source: &'a Catalog,
    target: &'a Catalog,
    selection: &'a Selection,
    rows: RowSource<'a>,
    recorded: DataSet,
}

impl<'a> DataReconciler<'a> {
    pub fn new(
        source: &'a Catalog,
        target: &'a Catalog,
        selection: &'a Selection,
        rows: RowSource<'a>,
    ) -> Self {
        Self {
            source,
            target,
            selection,
            rows,
            recorded: DataSet::default(),
        }
    }

    /// Rows read so far, for the snapshot dump.
    pub fn into_data_set(self) -> DataSet {
        self.recorded
    }

    /// Source tables selected for data mirroring, parents first.
    fn data_tables(&self) -> Vec<&'a Table> {
        let source = self.source;
        let selected: Vec<&Table> = source
            .tables()
            .iter()
            .filter(|t| self.selection.is_data_table(&t.schema, &t.qualified_name()))
            .collect();
        let weights = ordering::dependency_weights(source.tables(), source.foreign_keys());
        ordering::order_tables(selected, &weights)
    }

    /// Writable columns of a table, in ordinal order.
    fn insertable_columns(&self, table: &Table) -> Vec<&'a Column> {
        let source = self.source;
        source
            .columns_of(table.id)
            .into_iter()
            .filter(|c| c.is_insertable())
            .collect()
    }

    async fn read_rows(&mut self, table: &Table, columns: &[&Column], bucket: Bucket) -> Result<Vec<Row>> {
        let name = table.qualified_name();
        let rows: Vec<Row> = match self.rows {
            RowSource::Live(reader) => reader
                .rows(table, columns)
                .await?
                .into_iter()
                .map(|values| {
                    columns
                        .iter()
                        .zip(values.iter())
                        .map(|(c, v)| (c.name.clone(), v.to_literal()))
                        .collect()
                })
                .collect(),
            // A table that was fresh at dump time has no update rows; its
            // seed rows are the same source rows.
            RowSource::Snapshot(data) => {
                let stored = match bucket {
                    Bucket::Seed => data.seed.get(&name),
                    Bucket::Update => data.update.get(&name).or_else(|| data.seed.get(&name)),
                };
                stored.cloned().unwrap_or_default()
            }
        };

        let recorded = match bucket {
            Bucket::Seed => &mut self.recorded.seed,
            Bucket::Update => &mut self.recorded.update,
        };
        recorded.entry(name).or_insert_with(|| rows.clone());
        Ok(rows)
    }

    /// Seed script: one guarded bulk insert per eligible table.
    pub async fn seed(&mut self) -> Result<Script> {
        let mut script = Script::new(Phase::Seed, self.target.database_name());
        let mut body = Vec::new();
        let mut seeded = 0usize;

        for table in self.data_tables() {
            let name = table.qualified_name();
            if !self.source.has_primary_key(table.id) {
                warn!("{}: no primary key, skipping seed", name);
                continue;
            }
            let columns = self.insertable_columns(table);
            let rows = self.read_rows(table, &columns, Bucket::Seed).await?;
            if rows.is_empty() {
                debug!("{}: no source rows to seed", name);
                continue;
            }

            let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            let inserts: Vec<String> = rows
                .chunks(INSERT_CHUNK_ROWS)
                .map(|chunk| {
                    let values: Vec<Vec<String>> = chunk.iter().map(|row| literals(row, &names)).collect();
                    dialect::insert_values(&name, &names, &values)
                })
                .collect();

            debug!("{}: seeding {} rows", name, rows.len());
            wrap_identity(&mut body, table, dialect::if_empty(&name, &inserts));
            seeded += 1;
        }

        if seeded > 0 {
            script.push(dialect::reset_identity_inserts());
            script.push(dialect::disable_all_constraints());
            script.extend(body);
            script.push(dialect::enable_all_constraints());
        }
        info!("Seed: {} tables", seeded);
        Ok(script)
    }

    /// Whether the target should receive upserts for `table`.
    fn is_stale(&self, table: &Table) -> bool {
        let name = table.qualified_name();
        let Some(source_change) = self.source.last_change(&name) else {
            debug!("{}: no source activity recorded", name);
            return false;
        };
        let exists = self
            .target
            .id_of(&name)
            .and_then(|id| self.target.kind_of(id))
            == Some(ObjectKind::Table);
        if !exists {
            debug!("{}: not created on target yet", name);
            return false;
        }
        match self.target.last_change(&name) {
            Some(target_change) => source_change >= target_change,
            None => {
                debug!("{}: target never written, left to seed", name);
                false
            }
        }
    }

    /// Update script: a conditional upsert per source row of every stale,
    /// eligible table.
    pub async fn update(&mut self) -> Result<Script> {
        let mut script = Script::new(Phase::Update, self.target.database_name());
        let mut body = Vec::new();
        let mut updated = 0usize;

        for table in self.data_tables() {
            if !self.is_stale(table) {
                continue;
            }
            let name = table.qualified_name();
            if !self.source.has_primary_key(table.id) {
                warn!("{}: no primary key, skipping update", name);
                continue;
            }
            let columns = self.insertable_columns(table);
            let rows = self.read_rows(table, &columns, Bucket::Update).await?;
            if rows.is_empty() {
                continue;
            }

            let (keys, values): (Vec<&Column>, Vec<&Column>) =
                columns.iter().copied().partition(|c| c.primary_key.is_some());

            if table.has_identity {
                body.push(dialect::identity_insert(&name, true));
            }
            for row in &rows {
                body.push(dialect::upsert(&name, &pairs(&keys, row), &pairs(&values, row)));
            }
            if table.has_identity {
                body.push(dialect::identity_insert(&name, false));
            }

            debug!("{}: {} upserts", name, rows.len());
            updated += 1;
        }

        if updated > 0 {
            script.push(dialect::reset_identity_inserts());
            script.push(dialect::disable_all_constraints());
            script.extend(body);
            script.push(dialect::enable_all_constraints());
        }
        info!("Update: {} tables", updated);
        Ok(script)
    }
}

fn literal(row: &Row, column: &str) -> String {
    row.get(column)
        .cloned()
        .unwrap_or_else(|| NULL_LITERAL.to_string())
}

/// (column, literal) pairs for an upsert.
fn pairs(columns: &[&Column], row: &Row) -> Vec<(String, String)> {
    columns
        .iter()
        .map(|c| (c.name.clone(), literal(row, &c.name)))
        .collect()
}

fn literals(row: &Row, columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| literal(row, c)).collect()
}

fn wrap_identity(body: &mut Vec<String>, table: &Table, batch: String) {
    let name = table.qualified_name();
    if table.has_identity {
        body.push(dialect::identity_insert(&name, true));
    }
    body.push(batch);
    if table.has_identity {
        body.push(dialect::identity_insert(&name, false));
    }
}
