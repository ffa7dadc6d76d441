//! The in-memory catalog of one database.
//!
//! A [`Catalog`] is assembled from a [`CatalogData`] (live introspection or a
//! decoded snapshot) and frozen: entities are sorted and the qualified-name
//! and id lookup maps are built once in [`Catalog::new`]. Only `&self`
//! accessors are exposed afterwards.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::schema::{
    Column, Constraint, ConstraintKind, Database, ForeignKey, Index, ObjectId, ObjectKind,
    Routine, RoutineKind, Schema, Table, TableType,
};

/// Raw, unindexed catalog contents. This is also the snapshot wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogData {
    pub database: Option<Database>,
    #[serde(default)]
    pub schemas: Vec<Schema>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub table_types: Vec<TableType>,
    #[serde(default)]
    pub routines: Vec<Routine>,
    /// Last observed write per table, keyed by qualified name.
    #[serde(default)]
    pub last_changes: BTreeMap<String, NaiveDateTime>,
}

/// Frozen catalog with lookup maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CatalogData", into = "CatalogData")]
pub struct Catalog {
    data: CatalogData,
    columns_by_table: BTreeMap<ObjectId, Vec<usize>>,
    objects: BTreeMap<String, ObjectId>,
    kinds: BTreeMap<ObjectId, ObjectKind>,
}

impl Catalog {
    /// Sort every entity list deterministically and build the lookup maps.
    pub fn new(mut data: CatalogData) -> Self {
        data.schemas.sort_by(|a, b| a.name.cmp(&b.name));
        data.tables.sort_by_key(Table::qualified_name);
        data.columns
            .sort_by(|a, b| (a.table_id, a.ordinal).cmp(&(b.table_id, b.ordinal)));
        data.foreign_keys.sort_by_key(ForeignKey::qualified_name);
        data.constraints
            .sort_by(|a, b| (a.kind, a.qualified_name()).cmp(&(b.kind, b.qualified_name())));
        data.indexes
            .sort_by(|a, b| (a.table_qualified_name(), a.index_id).cmp(&(b.table_qualified_name(), b.index_id)));
        data.table_types.sort_by_key(TableType::qualified_name);
        // Creation order keeps views that reference other views creatable.
        data.routines
            .sort_by(|a, b| (a.created, a.id).cmp(&(b.created, b.id)));

        let mut columns_by_table: BTreeMap<ObjectId, Vec<usize>> = BTreeMap::new();
        for (idx, column) in data.columns.iter().enumerate() {
            columns_by_table.entry(column.table_id).or_default().push(idx);
        }

        let mut objects = BTreeMap::new();
        let mut kinds = BTreeMap::new();
        for table in &data.tables {
            objects.insert(table.qualified_name(), table.id);
            kinds.insert(table.id, ObjectKind::Table);
        }
        for fk in &data.foreign_keys {
            objects.insert(fk.qualified_name(), fk.id);
            kinds.insert(fk.id, ObjectKind::ForeignKey);
        }
        for routine in &data.routines {
            objects.insert(routine.qualified_name(), routine.id);
            kinds.insert(routine.id, routine.kind.object_kind());
        }

        Self {
            data,
            columns_by_table,
            objects,
            kinds,
        }
    }

    pub fn database(&self) -> Option<&Database> {
        self.data.database.as_ref()
    }

    /// Database name, or an empty string for a catalog with no identity.
    pub fn database_name(&self) -> &str {
        self.data.database.as_ref().map_or("", |d| d.name.as_str())
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.data.schemas
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.data.schemas.iter().any(|s| s.name == name)
    }

    pub fn tables(&self) -> &[Table] {
        &self.data.tables
    }

    pub fn table(&self, qualified_name: &str) -> Option<&Table> {
        let id = self.id_of(qualified_name)?;
        self.data.tables.iter().find(|t| t.id == id)
    }

    /// Columns of a table in ordinal order.
    pub fn columns_of(&self, table_id: ObjectId) -> Vec<&Column> {
        self.columns_by_table
            .get(&table_id)
            .map(|idxs| idxs.iter().map(|&i| &self.data.columns[i]).collect())
            .unwrap_or_default()
    }

    /// Whether any column of the table carries a primary key name.
    pub fn has_primary_key(&self, table_id: ObjectId) -> bool {
        self.columns_of(table_id)
            .iter()
            .any(|c| c.primary_key.is_some())
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.data.foreign_keys
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.data.constraints
    }

    pub fn constraints_of_kind(&self, kind: ConstraintKind) -> impl Iterator<Item = &Constraint> {
        self.data.constraints.iter().filter(move |c| c.kind == kind)
    }

    pub fn primary_key_of(&self, table_id: ObjectId) -> Option<&Constraint> {
        self.constraints_of_kind(ConstraintKind::PrimaryKey)
            .find(|c| c.parent_table_id == table_id)
    }

    pub fn indexes(&self) -> &[Index] {
        &self.data.indexes
    }

    pub fn table_types(&self) -> &[TableType] {
        &self.data.table_types
    }

    pub fn routines(&self) -> &[Routine] {
        &self.data.routines
    }

    pub fn functions(&self) -> impl Iterator<Item = &Routine> {
        self.data
            .routines
            .iter()
            .filter(|r| RoutineKind::FUNCTIONS.contains(&r.kind))
    }

    pub fn views(&self) -> impl Iterator<Item = &Routine> {
        self.data
            .routines
            .iter()
            .filter(|r| r.kind == RoutineKind::View)
    }

    pub fn procedures(&self) -> impl Iterator<Item = &Routine> {
        self.data
            .routines
            .iter()
            .filter(|r| r.kind == RoutineKind::Procedure)
    }

    pub fn routine(&self, qualified_name: &str) -> Option<&Routine> {
        let id = self.id_of(qualified_name)?;
        self.data.routines.iter().find(|r| r.id == id)
    }

    /// Qualified name to internal id.
    pub fn id_of(&self, qualified_name: &str) -> Option<ObjectId> {
        self.objects.get(qualified_name).copied()
    }

    /// Internal id to coarse object kind.
    pub fn kind_of(&self, id: ObjectId) -> Option<ObjectKind> {
        self.kinds.get(&id).copied()
    }

    pub fn last_change(&self, qualified_name: &str) -> Option<NaiveDateTime> {
        self.data.last_changes.get(qualified_name).copied()
    }

    /// The raw contents, e.g. for encoding a snapshot.
    pub fn data(&self) -> &CatalogData {
        &self.data
    }
}

impl From<CatalogData> for Catalog {
    fn from(data: CatalogData) -> Self {
        Catalog::new(data)
    }
}

impl From<Catalog> for CatalogData {
    fn from(catalog: Catalog) -> Self {
        catalog.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::KeyColumn;
    use chrono::NaiveDate;

    fn make_table(id: ObjectId, schema: &str, name: &str) -> Table {
        Table {
            id,
            schema_id: 1,
            schema: schema.to_string(),
            name: name.to_string(),
            has_identity: false,
            history: None,
        }
    }

    fn make_column(table_id: ObjectId, name: &str, ordinal: i32, pk: bool) -> Column {
        Column {
            table_id,
            schema: "dbo".to_string(),
            table: "Widget".to_string(),
            name: name.to_string(),
            ordinal,
            data_type: "int".to_string(),
            max_length: 4,
            precision: 10,
            scale: 0,
            is_nullable: !pk,
            is_identity: false,
            is_computed: false,
            computed_definition: None,
            default: None,
            primary_key: pk.then(|| "PK_Widget".to_string()),
            primary_key_type: pk.then(|| "CLUSTERED".to_string()),
            generated: None,
        }
    }

    fn sample() -> Catalog {
        let created = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Catalog::new(CatalogData {
            database: Some(Database {
                id: 5,
                name: "Shop".to_string(),
            }),
            schemas: vec![Schema {
                id: 1,
                name: "dbo".to_string(),
            }],
            tables: vec![make_table(20, "dbo", "Widget"), make_table(10, "dbo", "Gadget")],
            columns: vec![
                make_column(20, "Name", 2, false),
                make_column(20, "Id", 1, true),
                make_column(10, "Code", 1, false),
            ],
            constraints: vec![Constraint {
                id: 21,
                name: "PK_Widget".to_string(),
                schema: "dbo".to_string(),
                parent_table_id: 20,
                table: "Widget".to_string(),
                kind: ConstraintKind::PrimaryKey,
                columns: vec![KeyColumn {
                    name: "Id".to_string(),
                    descending: false,
                }],
                index_type: Some("CLUSTERED".to_string()),
                definition: None,
                trusted: true,
            }],
            routines: vec![Routine {
                id: 30,
                schema: "dbo".to_string(),
                name: "ActiveWidgets".to_string(),
                kind: RoutineKind::View,
                definition: "CREATE VIEW dbo.ActiveWidgets AS SELECT 1 AS x".to_string(),
                created,
                modified: None,
            }],
            last_changes: BTreeMap::from([("[dbo].[Widget]".to_string(), created)]),
            ..Default::default()
        })
    }

    #[test]
    fn test_lookup_maps() {
        let catalog = sample();
        assert_eq!(catalog.id_of("[dbo].[Widget]"), Some(20));
        assert_eq!(catalog.kind_of(20), Some(ObjectKind::Table));
        assert_eq!(catalog.kind_of(30), Some(ObjectKind::View));
        assert_eq!(catalog.id_of("[dbo].[Missing]"), None);
        assert_eq!(catalog.id_of("[dbo].[Gadget]"), Some(10));
        assert_eq!(catalog.id_of("[dbo].[ActiveWidgets]"), Some(30));
    }

    #[test]
    fn test_tables_sorted_and_columns_in_ordinal_order() {
        let catalog = sample();
        let names: Vec<_> = catalog.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Gadget", "Widget"]);

        let cols: Vec<_> = catalog
            .columns_of(20)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(cols, vec!["Id", "Name"]);
        assert!(catalog.columns_of(99).is_empty());
    }

    #[test]
    fn test_primary_key_queries() {
        let catalog = sample();
        assert!(catalog.has_primary_key(20));
        assert!(!catalog.has_primary_key(10));
        assert_eq!(catalog.primary_key_of(20).unwrap().name, "PK_Widget");
        assert!(catalog.primary_key_of(10).is_none());
    }

    #[test]
    fn test_serde_round_trip_rebuilds_maps() {
        let catalog = sample();
        let json = serde_json::to_string(&catalog).unwrap();
        let decoded: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, catalog);
        assert_eq!(decoded.id_of("[dbo].[ActiveWidgets]"), Some(30));
        assert!(decoded.last_change("[dbo].[Widget]").is_some());
    }
}
