//! Structural diff between two catalogs (the patch phase).
//!
//! Objects are matched by qualified name only. The resulting [`Patch`]
//! drops what the target has and the source does not, and reshapes the
//! columns of tables present on both sides. Creating missing objects is left
//! to the create and alter phases.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::core::schema::{Column, Constraint, ConstraintKind, ForeignKey, KeyColumn, ObjectKind, Table};
use crate::core::value::TypeCategory;
use crate::core::Catalog;
use crate::drivers::mssql::dialect;
use crate::script::{Phase, Script};

/// Column-level differences of one table present in both catalogs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDiff {
    /// Target columns missing from the source.
    pub to_drop: Vec<Column>,
    /// Source columns missing from the target.
    pub to_add: Vec<Column>,
    /// Source definitions of columns whose signature differs.
    pub to_alter: Vec<Column>,
    /// Names present on both sides with the same signature.
    pub unchanged: Vec<String>,
}

impl ColumnDiff {
    /// Compare column lists by name.
    pub fn between(source: &[&Column], target: &[&Column]) -> Self {
        let target_by_name: BTreeMap<&str, &Column> =
            target.iter().map(|c| (c.name.as_str(), *c)).collect();
        let source_names: BTreeSet<&str> = source.iter().map(|c| c.name.as_str()).collect();

        let mut diff = ColumnDiff {
            to_drop: target
                .iter()
                .filter(|c| !source_names.contains(c.name.as_str()))
                .map(|c| (*c).clone())
                .collect(),
            ..Default::default()
        };

        for column in source {
            match target_by_name.get(column.name.as_str()) {
                None => diff.to_add.push((*column).clone()),
                Some(existing) if existing.signature() != column.signature() => {
                    diff.to_alter.push((*column).clone())
                }
                Some(_) => diff.unchanged.push(column.name.clone()),
            }
        }
        diff
    }
}

/// One column-level operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    DropColumn(Column),
    /// Add with the full source definition.
    AddColumn(Column),
    /// Add a NOT NULL column as nullable ahead of a backfill.
    AddColumnNullable(Column),
    Backfill { column: Column, value: String },
    DropPrimaryKey(Constraint),
    AlterColumn(Column),
}

impl Change {
    pub fn render(&self) -> String {
        match self {
            Change::DropColumn(c) => dialect::drop_column(c),
            Change::AddColumn(c) => dialect::add_column(c, false),
            Change::AddColumnNullable(c) => dialect::add_column(c, true),
            Change::Backfill { column, value } => dialect::backfill(column, value),
            Change::DropPrimaryKey(pk) => dialect::drop_primary_key(pk),
            Change::AlterColumn(c) => dialect::alter_column(c),
        }
    }
}

/// Ordered changes for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePatch {
    pub table: String,
    pub changes: Vec<Change>,
}

/// Everything the patch phase emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub keys_to_drop: Vec<ForeignKey>,
    pub tables: Vec<TablePatch>,
    pub tables_to_drop: Vec<Table>,
    pub schemas_to_drop: Vec<String>,
}

/// Value written into existing rows for a newly added NOT NULL column.
fn backfill_value(column: &Column) -> String {
    match &column.default {
        Some(default) => default.definition.clone(),
        None => TypeCategory::of(&column.data_type).default_literal().to_string(),
    }
}

/// The target table's primary key, falling back to the key name carried by
/// its columns when the constraint itself was not loaded.
fn primary_key_of(target: &Catalog, table: &Table) -> Option<Constraint> {
    if let Some(pk) = target.primary_key_of(table.id) {
        return Some(pk.clone());
    }
    let columns = target.columns_of(table.id);
    let first = columns.iter().find(|c| c.primary_key.is_some())?;
    Some(Constraint {
        id: 0,
        name: first.primary_key.clone()?,
        schema: table.schema.clone(),
        parent_table_id: table.id,
        table: table.name.clone(),
        kind: ConstraintKind::PrimaryKey,
        columns: columns
            .iter()
            .filter(|c| c.primary_key.is_some())
            .map(|c| KeyColumn {
                name: c.name.clone(),
                descending: false,
            })
            .collect(),
        index_type: first.primary_key_type.clone(),
        definition: None,
        trusted: true,
    })
}

/// Turn a column diff into ordered changes: drops, adds, then alters.
pub fn plan_table(diff: ColumnDiff, target_pk: Option<&Constraint>) -> Vec<Change> {
    let mut drops = Vec::new();
    let mut adds = Vec::new();
    let mut alters = Vec::new();

    for column in diff.to_drop {
        drops.push(Change::DropColumn(column));
    }

    for column in diff.to_alter {
        if column.is_computed {
            // Computed columns cannot be altered in place.
            drops.push(Change::DropColumn(column.clone()));
            adds.push(Change::AddColumn(column));
        } else {
            alters.push(column);
        }
    }

    for column in diff.to_add {
        if column.is_nullable || column.is_identity || column.is_computed {
            adds.push(Change::AddColumn(column));
        } else {
            let value = backfill_value(&column);
            adds.push(Change::AddColumnNullable(column.clone()));
            adds.push(Change::Backfill {
                column: column.clone(),
                value,
            });
            alters.push(column);
        }
    }

    let mut changes = drops;
    changes.extend(adds);

    let mut pk_dropped = false;
    for column in alters {
        if let Some(pk) = target_pk {
            if !pk_dropped && pk.covers(&column.name) {
                changes.push(Change::DropPrimaryKey(pk.clone()));
                pk_dropped = true;
            }
        }
        changes.push(Change::AlterColumn(column));
    }
    changes
}

impl Patch {
    /// Diff `target` toward `source`.
    pub fn between(source: &Catalog, target: &Catalog) -> Self {
        let source_keys: BTreeSet<String> = source
            .foreign_keys()
            .iter()
            .map(ForeignKey::qualified_name)
            .collect();
        let keys_to_drop = target
            .foreign_keys()
            .iter()
            .filter(|fk| !source_keys.contains(&fk.qualified_name()))
            .cloned()
            .collect();

        let tables_to_drop = target
            .tables()
            .iter()
            .filter(|t| source.id_of(&t.qualified_name()).is_none())
            .cloned()
            .collect();

        let schemas_to_drop = target
            .schemas()
            .iter()
            .filter(|s| !source.has_schema(&s.name))
            .map(|s| s.name.clone())
            .collect();

        let mut tables = Vec::new();
        for table in source.tables() {
            let name = table.qualified_name();
            let Some(target_id) = target.id_of(&name) else {
                continue;
            };
            if target.kind_of(target_id) != Some(ObjectKind::Table) {
                continue;
            }
            let Some(target_table) = target.table(&name) else {
                continue;
            };

            let diff = ColumnDiff::between(
                &source.columns_of(table.id),
                &target.columns_of(target_id),
            );
            let pk = primary_key_of(target, target_table);
            let changes = plan_table(diff, pk.as_ref());
            if changes.is_empty() {
                continue;
            }
            debug!("{}: {} column changes", name, changes.len());
            tables.push(TablePatch {
                table: name,
                changes,
            });
        }

        Patch {
            keys_to_drop,
            tables,
            tables_to_drop,
            schemas_to_drop,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys_to_drop.is_empty()
            && self.tables.is_empty()
            && self.tables_to_drop.is_empty()
            && self.schemas_to_drop.is_empty()
    }

    /// Render in execution order: foreign key drops, table patches, table
    /// drops, schema drops.
    pub fn script(&self, database: &str) -> Script {
        let mut script = Script::new(Phase::Patch, database);
        script.extend(self.keys_to_drop.iter().map(dialect::drop_foreign_key));
        for table in &self.tables {
            script.extend(table.changes.iter().map(Change::render));
        }
        script.extend(self.tables_to_drop.iter().map(dialect::drop_table));
        script.extend(self.schemas_to_drop.iter().map(|s| dialect::drop_schema(s)));

        info!(
            "Patch: {} foreign keys to drop, {} tables to patch, {} tables to drop, {} schemas to drop",
            self.keys_to_drop.len(),
            self.tables.len(),
            self.tables_to_drop.len(),
            self.schemas_to_drop.len()
        );
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Database, DefaultConstraint, Schema};
    use crate::core::CatalogData;

    fn make_column(table_id: i32, name: &str, data_type: &str, max_length: i32, nullable: bool) -> Column {
        Column {
            table_id,
            schema: "dbo".to_string(),
            table: "Widget".to_string(),
            name: name.to_string(),
            ordinal: 1,
            data_type: data_type.to_string(),
            max_length,
            precision: 0,
            scale: 0,
            is_nullable: nullable,
            is_identity: false,
            is_computed: false,
            computed_definition: None,
            default: None,
            primary_key: None,
            primary_key_type: None,
            generated: None,
        }
    }

    fn make_id(table_id: i32) -> Column {
        let mut id = make_column(table_id, "Id", "int", 4, false);
        id.is_identity = true;
        id.primary_key = Some("PK_Widget".to_string());
        id.primary_key_type = Some("CLUSTERED".to_string());
        id
    }

    fn make_catalog(table_id: i32, columns: Vec<Column>) -> Catalog {
        Catalog::new(CatalogData {
            database: Some(Database {
                id: 5,
                name: "Shop".to_string(),
            }),
            schemas: vec![Schema {
                id: 1,
                name: "dbo".to_string(),
            }],
            tables: vec![Table {
                id: table_id,
                schema_id: 1,
                schema: "dbo".to_string(),
                name: "Widget".to_string(),
                has_identity: true,
                history: None,
            }],
            columns,
            ..Default::default()
        })
    }

    #[test]
    fn test_column_diff_partitions_names() {
        let a = make_column(1, "A", "int", 4, false);
        let b_src = make_column(1, "B", "varchar", 10, true);
        let b_tgt = make_column(1, "B", "varchar", 20, true);
        let c = make_column(1, "C", "int", 4, true);
        let d = make_column(1, "D", "int", 4, true);

        let diff = ColumnDiff::between(&[&a, &b_src, &c], &[&a, &b_tgt, &d]);
        assert_eq!(diff.unchanged, vec!["A".to_string()]);
        assert_eq!(diff.to_alter[0].name, "B");
        assert_eq!(diff.to_add[0].name, "C");
        assert_eq!(diff.to_drop[0].name, "D");
        assert_eq!(
            diff.unchanged.len() + diff.to_alter.len() + diff.to_add.len() + diff.to_drop.len(),
            4
        );
    }

    #[test]
    fn test_drop_then_widen_without_pk_drop() {
        let source = make_catalog(
            1,
            vec![make_id(1), make_column(1, "Name", "varchar", 100, false)],
        );
        let target = make_catalog(
            7,
            vec![
                make_id(7),
                make_column(7, "Name", "varchar", 50, false),
                make_column(7, "Legacy", "int", 4, true),
            ],
        );

        let patch = Patch::between(&source, &target);
        assert_eq!(patch.tables.len(), 1);
        let changes = &patch.tables[0].changes;
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], Change::DropColumn(c) if c.name == "Legacy"));
        assert!(matches!(&changes[1], Change::AlterColumn(c) if c.name == "Name" && c.max_length == 100));
    }

    #[test]
    fn test_not_null_add_is_split() {
        let source = make_catalog(1, vec![make_id(1), make_column(1, "Flag", "bit", 1, false)]);
        let target = make_catalog(1, vec![make_id(1)]);

        let changes = &Patch::between(&source, &target).tables[0].changes;
        assert_eq!(changes.len(), 3);
        assert!(matches!(&changes[0], Change::AddColumnNullable(c) if c.name == "Flag"));
        assert!(matches!(&changes[1], Change::Backfill { column, value } if column.name == "Flag" && value == "0"));
        assert!(matches!(&changes[2], Change::AlterColumn(c) if c.name == "Flag"));
    }

    #[test]
    fn test_backfill_prefers_default_definition() {
        let mut created = make_column(1, "CreatedAt", "datetime2", 8, false);
        created.default = Some(DefaultConstraint {
            name: "DF_Widget_CreatedAt".to_string(),
            definition: "(sysutcdatetime())".to_string(),
        });
        let changes = plan_table(
            ColumnDiff {
                to_add: vec![created, make_column(1, "Born", "date", 3, false)],
                ..Default::default()
            },
            None,
        );
        assert!(matches!(&changes[1], Change::Backfill { value, .. } if value == "(sysutcdatetime())"));
        assert!(matches!(&changes[3], Change::Backfill { value, .. } if value == "'1970-01-01 00:00:00.000'"));
    }

    #[test]
    fn test_pk_dropped_once_before_first_key_alter() {
        let pk = Constraint {
            id: 11,
            name: "PK_Rate".to_string(),
            schema: "dbo".to_string(),
            parent_table_id: 1,
            table: "Widget".to_string(),
            kind: ConstraintKind::PrimaryKey,
            columns: vec![
                KeyColumn {
                    name: "From".to_string(),
                    descending: false,
                },
                KeyColumn {
                    name: "To".to_string(),
                    descending: false,
                },
            ],
            index_type: Some("CLUSTERED".to_string()),
            definition: None,
            trusted: true,
        };
        let diff = ColumnDiff {
            to_alter: vec![
                make_column(1, "Note", "varchar", 20, true),
                make_column(1, "From", "char", 4, false),
                make_column(1, "To", "char", 4, false),
            ],
            ..Default::default()
        };

        let changes = plan_table(diff, Some(&pk));
        assert_eq!(changes.len(), 4);
        assert!(matches!(&changes[0], Change::AlterColumn(c) if c.name == "Note"));
        assert!(matches!(&changes[1], Change::DropPrimaryKey(k) if k.name == "PK_Rate"));
        assert!(matches!(&changes[2], Change::AlterColumn(c) if c.name == "From"));
        assert!(matches!(&changes[3], Change::AlterColumn(c) if c.name == "To"));
    }

    #[test]
    fn test_changed_computed_column_is_recreated() {
        let mut old = make_column(1, "Total", "int", 4, true);
        old.is_computed = true;
        old.computed_definition = Some("([A]+[B])".to_string());
        let mut new = old.clone();
        new.computed_definition = Some("([A]*[B])".to_string());

        let changes = plan_table(ColumnDiff::between(&[&new], &[&old]), None);
        assert!(matches!(&changes[0], Change::DropColumn(_)));
        assert!(matches!(&changes[1], Change::AddColumn(c) if c.computed_definition.as_deref() == Some("([A]*[B])")));
    }

    #[test]
    fn test_dropped_objects_and_placeholder() {
        let source = make_catalog(1, vec![make_id(1)]);
        assert!(Patch::between(&source, &source).is_empty());
        assert!(Patch::between(&source, &source)
            .script("Shop")
            .render()
            .ends_with("-- Nothing to patch. --\n"));

        let mut data = source.data().clone();
        data.schemas.push(Schema {
            id: 2,
            name: "legacy".to_string(),
        });
        data.tables.push(Table {
            id: 2,
            schema_id: 2,
            schema: "legacy".to_string(),
            name: "Old".to_string(),
            has_identity: false,
            history: None,
        });
        let target = Catalog::new(data);

        let patch = Patch::between(&source, &target);
        assert_eq!(patch.tables_to_drop[0].qualified_name(), "[legacy].[Old]");
        assert_eq!(patch.schemas_to_drop, vec!["legacy".to_string()]);

        let batches = patch.script("Shop");
        let batches = batches.batches();
        assert!(batches[0].contains("DROP TABLE [legacy].[Old]"));
        assert!(batches[1].contains("DROP SCHEMA [legacy]"));
    }
}
