//! Catalog loading.
//!
//! Builds a frozen [`Catalog`] from a [`CatalogReader`]. Both sides are
//! loaded with the same [`Selection`], resolved once against the source's
//! schema names, so the differ compares like with like.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info};

use crate::config::MirrorPolicy;
use crate::core::identifier::parse_qualified;
use crate::core::schema::{ObjectId, RoutineKind, Schema};
use crate::core::traits::{CatalogReader, TableScope};
use crate::core::{Catalog, CatalogData};
use crate::error::{MirrorError, Result};
use crate::selector::Selection;

/// Every routine kind, functions first.
const ROUTINE_KINDS: [RoutineKind; 5] = [
    RoutineKind::ScalarFunction,
    RoutineKind::InlineFunction,
    RoutineKind::TableFunction,
    RoutineKind::View,
    RoutineKind::Procedure,
];

/// Schema names that must be loaded for `selection`: the selected schemas
/// plus the schemas owning explicitly included tables.
pub fn schema_names(selection: &Selection) -> Result<BTreeSet<String>> {
    let mut names = selection.schemas();
    for table in selection.table_includes() {
        let (schema, _) = parse_qualified(&table)?;
        names.insert(schema);
    }
    Ok(names)
}

/// Table query scope: every table of a selected schema, plus included
/// tables from elsewhere, minus model exclusions.
pub fn table_scope(selection: &Selection, schemas: &[Schema]) -> TableScope {
    let selected = selection.schemas();
    TableScope {
        schema_ids: schemas
            .iter()
            .filter(|s| selected.contains(&s.name))
            .map(|s| s.id)
            .collect(),
        include: selection.table_includes(),
        exclude: selection.table_excludes().clone(),
    }
}

/// Load the catalog of one side.
///
/// `side` only labels log lines and errors ("source", "target").
pub async fn load_catalog(
    reader: &dyn CatalogReader,
    selection: &Selection,
    side: &str,
) -> Result<Catalog> {
    let database = reader.database().await?.ok_or_else(|| {
        MirrorError::Config(format!("{} database identity could not be read", side))
    })?;
    info!("Loading {} catalog from database {}", side, database.name);

    let names = schema_names(selection)?;
    let schemas = reader.schemas(&names).await?;
    let schema_ids: Vec<ObjectId> = schemas.iter().map(|s| s.id).collect();

    let scope = table_scope(selection, &schemas);

    let tables: Vec<_> = reader
        .tables(&scope)
        .await?
        .into_iter()
        .filter(|t| scope.admits(t))
        .collect();
    let table_ids: HashSet<ObjectId> = tables.iter().map(|t| t.id).collect();
    let table_names: HashSet<String> = tables.iter().map(|t| t.qualified_name()).collect();

    let columns: Vec<_> = reader
        .columns(&schema_ids)
        .await?
        .into_iter()
        .filter(|c| table_ids.contains(&c.table_id))
        .collect();
    let constraints: Vec<_> = reader
        .constraints(&schema_ids)
        .await?
        .into_iter()
        .filter(|c| table_ids.contains(&c.parent_table_id))
        .collect();
    let foreign_keys: Vec<_> = reader
        .foreign_keys(&schema_ids)
        .await?
        .into_iter()
        .filter(|fk| table_ids.contains(&fk.parent_table_id))
        .collect();
    let indexes: Vec<_> = reader
        .indexes(&schema_ids)
        .await?
        .into_iter()
        .filter(|i| table_ids.contains(&i.table_id))
        .collect();
    let table_types = reader.table_types(&schema_ids).await?;
    let routines = reader.routines(&ROUTINE_KINDS, &schema_ids).await?;
    let last_changes = reader
        .last_changes(&schema_ids)
        .await?
        .into_iter()
        .filter(|(name, _)| table_names.contains(name))
        .collect();

    info!(
        "Loaded {} catalog: {} schemas, {} tables, {} columns, {} foreign keys, {} constraints, {} indexes, {} routines",
        side,
        schemas.len(),
        tables.len(),
        columns.len(),
        foreign_keys.len(),
        constraints.len(),
        indexes.len(),
        routines.len()
    );
    for table in &tables {
        debug!("{} table: {}", side, table.qualified_name());
    }

    Ok(Catalog::new(CatalogData {
        database: Some(database),
        schemas,
        tables,
        columns,
        foreign_keys,
        constraints,
        indexes,
        table_types,
        routines,
        last_changes,
    }))
}

/// Resolve the selection against the reader's schema names.
pub async fn discover_selection(
    reader: &dyn CatalogReader,
    model: Option<&MirrorPolicy>,
    data: Option<&MirrorPolicy>,
) -> Result<Selection> {
    let discovered = reader.schema_names().await?;
    debug!("Discovered schemas: {:?}", discovered);
    Selection::resolve(model, data, &discovered)
}
