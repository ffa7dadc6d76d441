//! Catalog entity types: schemas, tables, columns, keys, constraints, indexes,
//! table types and routines.
//!
//! Internal ids are catalog-local. Anything that compares two catalogs goes
//! through [`qualified`] names instead.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::identifier::{bracket, qualified};

/// SQL Server `object_id` / `schema_id` value.
pub type ObjectId = i32;

/// Database identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub id: ObjectId,
    pub name: String,
}

/// A schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub id: ObjectId,
    pub name: String,
}

/// History table linked to a system-versioned table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTable {
    pub schema: String,
    pub name: String,
}

impl HistoryTable {
    pub fn qualified_name(&self) -> String {
        qualified(&self.schema, &self.name)
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Object id.
    pub id: ObjectId,

    /// Owning schema id.
    pub schema_id: ObjectId,

    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Whether any column is an identity column.
    pub has_identity: bool,

    /// History table when this table is system-versioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryTable>,
}

impl Table {
    /// `[schema].[name]`
    pub fn qualified_name(&self) -> String {
        qualified(&self.schema, &self.name)
    }
}

/// Role of a generated period column in a temporal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedRole {
    RowStart,
    RowEnd,
}

impl GeneratedRole {
    fn clause(self) -> &'static str {
        match self {
            GeneratedRole::RowStart => "GENERATED ALWAYS AS ROW START",
            GeneratedRole::RowEnd => "GENERATED ALWAYS AS ROW END",
        }
    }
}

/// Named default constraint bound to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultConstraint {
    pub name: String,
    pub definition: String,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Owning table id.
    pub table_id: ObjectId,

    /// Owning table's schema name.
    pub schema: String,

    /// Owning table name.
    pub table: String,

    /// Column name.
    pub name: String,

    /// Ordinal position (1-based).
    pub ordinal: i32,

    /// Data type name (e.g. "varchar").
    pub data_type: String,

    /// Maximum length in characters for character types, bytes for binary
    /// types (-1 = max).
    pub max_length: i32,

    /// Numeric precision.
    pub precision: i32,

    /// Numeric or fractional-seconds scale.
    pub scale: i32,

    pub is_nullable: bool,
    pub is_identity: bool,
    pub is_computed: bool,

    /// Expression for computed columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_definition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultConstraint>,

    /// Name of the primary key constraint this column belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,

    /// CLUSTERED or NONCLUSTERED, alongside `primary_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<GeneratedRole>,
}

impl Column {
    /// Owning table's qualified name.
    pub fn table_qualified_name(&self) -> String {
        qualified(&self.schema, &self.table)
    }

    /// Bracketed type with its size suffix, e.g. `[varchar](50)`,
    /// `[decimal](18, 2)`, `[nvarchar](max)`.
    pub fn type_definition(&self) -> String {
        let ty = self.data_type.to_lowercase();
        let base = bracket(&self.data_type);

        let sized = ty.contains("char") || ty == "varbinary" || ty == "binary";
        if sized {
            if self.max_length == -1 {
                format!("{}(max)", base)
            } else {
                format!("{}({})", base, self.max_length)
            }
        } else if ty == "decimal" || ty == "numeric" {
            format!("{}({}, {})", base, self.precision, self.scale)
        } else if ty == "float" {
            format!("{}({})", base, self.precision)
        } else if ty == "datetime2" || ty == "time" || ty == "datetimeoffset" {
            format!("{}({})", base, self.scale)
        } else {
            base
        }
    }

    pub fn nullability(&self) -> &'static str {
        if self.is_nullable {
            "NULL"
        } else {
            "NOT NULL"
        }
    }

    /// Normalised signature compared when diffing: type, size and nullability,
    /// or the expression for computed columns.
    pub fn signature(&self) -> String {
        match (self.is_computed, &self.computed_definition) {
            (true, Some(def)) => format!("AS {}", def),
            _ => format!("{} {}", self.type_definition(), self.nullability()),
        }
    }

    /// Full column definition as used inside CREATE TABLE and ADD.
    pub fn definition(&self) -> String {
        if let (true, Some(def)) = (self.is_computed, &self.computed_definition) {
            return format!("{} AS {}", bracket(&self.name), def);
        }

        let mut out = format!("{} {}", bracket(&self.name), self.type_definition());
        if self.is_identity {
            out.push_str(" IDENTITY(1, 1)");
        }
        if let Some(role) = self.generated {
            out.push(' ');
            out.push_str(role.clause());
        }
        out.push(' ');
        out.push_str(self.nullability());
        if let Some(default) = &self.default {
            out.push_str(&format!(
                " CONSTRAINT {} DEFAULT {}",
                bracket(&default.name),
                default.definition
            ));
        }
        out
    }

    /// Whether explicit values can be written to this column.
    pub fn is_insertable(&self) -> bool {
        let ty = self.data_type.to_lowercase();
        !self.is_computed && self.generated.is_none() && ty != "timestamp" && ty != "rowversion"
    }
}

/// Foreign key metadata. Composite keys list columns pairwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub id: ObjectId,
    pub name: String,
    pub schema: String,
    pub parent_table_id: ObjectId,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    /// False when the key exists but was created or re-enabled WITH NOCHECK.
    pub trusted: bool,
}

impl ForeignKey {
    pub fn qualified_name(&self) -> String {
        qualified(&self.schema, &self.name)
    }

    pub fn parent_qualified_name(&self) -> String {
        qualified(&self.schema, &self.parent_table)
    }

    pub fn referenced_qualified_name(&self) -> String {
        qualified(&self.referenced_schema, &self.referenced_table)
    }
}

/// Constraint type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintKind {
    #[serde(rename = "PK")]
    PrimaryKey,
    #[serde(rename = "UQ")]
    Unique,
    #[serde(rename = "D")]
    Default,
    #[serde(rename = "C")]
    Check,
}

impl ConstraintKind {
    /// Parse the `sys.objects.type` code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "PK" => Some(ConstraintKind::PrimaryKey),
            "UQ" => Some(ConstraintKind::Unique),
            "D" => Some(ConstraintKind::Default),
            "C" => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

/// A key or index column with its sort direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    pub name: String,
    #[serde(default)]
    pub descending: bool,
}

impl KeyColumn {
    pub fn render(&self) -> String {
        format!(
            "{} {}",
            bracket(&self.name),
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

/// Primary key, unique, default or check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ObjectId,
    pub name: String,
    pub schema: String,
    pub parent_table_id: ObjectId,
    pub table: String,
    pub kind: ConstraintKind,

    /// Key columns for PK/UQ; the bound column for defaults; empty for
    /// table-level checks.
    pub columns: Vec<KeyColumn>,

    /// CLUSTERED / NONCLUSTERED for PK and UQ.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,

    /// Expression for defaults and checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    /// Check constraint trust state.
    #[serde(default = "default_true")]
    pub trusted: bool,
}

impl Constraint {
    pub fn qualified_name(&self) -> String {
        qualified(&self.schema, &self.name)
    }

    pub fn table_qualified_name(&self) -> String {
        qualified(&self.schema, &self.table)
    }

    /// Whether `column` is one of this constraint's columns.
    pub fn covers(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }
}

/// Non-unique secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub table_id: ObjectId,
    pub index_id: i32,
    pub name: String,
    pub schema: String,
    pub table: String,
    /// CLUSTERED / NONCLUSTERED.
    pub type_desc: String,
    pub columns: Vec<KeyColumn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<String>,
    /// Predicate of a filtered index, e.g. `([Active]=(1))`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Index {
    pub fn table_qualified_name(&self) -> String {
        qualified(&self.schema, &self.table)
    }
}

/// User-defined table type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableType {
    pub id: ObjectId,
    pub schema: String,
    pub name: String,
    /// Rendered column definitions, in order.
    pub columns: Vec<String>,
}

impl TableType {
    pub fn qualified_name(&self) -> String {
        qualified(&self.schema, &self.name)
    }
}

/// Routine type, by `sys.objects.type` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoutineKind {
    #[serde(rename = "FN")]
    ScalarFunction,
    #[serde(rename = "IF")]
    InlineFunction,
    #[serde(rename = "TF")]
    TableFunction,
    #[serde(rename = "V")]
    View,
    #[serde(rename = "P")]
    Procedure,
}

impl RoutineKind {
    pub const FUNCTIONS: [RoutineKind; 3] = [
        RoutineKind::ScalarFunction,
        RoutineKind::InlineFunction,
        RoutineKind::TableFunction,
    ];

    pub fn code(self) -> &'static str {
        match self {
            RoutineKind::ScalarFunction => "FN",
            RoutineKind::InlineFunction => "IF",
            RoutineKind::TableFunction => "TF",
            RoutineKind::View => "V",
            RoutineKind::Procedure => "P",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "FN" => Some(RoutineKind::ScalarFunction),
            "IF" => Some(RoutineKind::InlineFunction),
            "TF" => Some(RoutineKind::TableFunction),
            "V" => Some(RoutineKind::View),
            "P" => Some(RoutineKind::Procedure),
            _ => None,
        }
    }

    /// DDL keyword following CREATE/ALTER.
    pub fn keyword(self) -> &'static str {
        match self {
            RoutineKind::View => "VIEW",
            RoutineKind::Procedure => "PROCEDURE",
            _ => "FUNCTION",
        }
    }

    pub fn object_kind(self) -> ObjectKind {
        match self {
            RoutineKind::View => ObjectKind::View,
            RoutineKind::Procedure => ObjectKind::Procedure,
            _ => ObjectKind::Function,
        }
    }
}

/// Function, view or procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub id: ObjectId,
    pub schema: String,
    pub name: String,
    pub kind: RoutineKind,
    /// Full module text as stored in `sys.sql_modules`.
    pub definition: String,
    pub created: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<NaiveDateTime>,
}

impl Routine {
    pub fn qualified_name(&self) -> String {
        qualified(&self.schema, &self.name)
    }
}

/// Coarse type tag held in a catalog's id lookup map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Table,
    ForeignKey,
    Function,
    View,
    Procedure,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_column(name: &str, data_type: &str, max_length: i32, nullable: bool) -> Column {
        Column {
            table_id: 1,
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

    #[test]
    fn test_type_definition_sizes() {
        assert_eq!(
            make_column("Name", "varchar", 50, false).type_definition(),
            "[varchar](50)"
        );
        assert_eq!(
            make_column("Body", "nvarchar", -1, true).type_definition(),
            "[nvarchar](max)"
        );
        assert_eq!(
            make_column("Blob", "varbinary", -1, true).type_definition(),
            "[varbinary](max)"
        );
        assert_eq!(make_column("Id", "int", 4, false).type_definition(), "[int]");

        let mut price = make_column("Price", "decimal", 9, false);
        price.precision = 18;
        price.scale = 2;
        assert_eq!(price.type_definition(), "[decimal](18, 2)");

        let mut stamp = make_column("At", "datetime2", 8, false);
        stamp.scale = 7;
        assert_eq!(stamp.type_definition(), "[datetime2](7)");
    }

    #[test]
    fn test_signature_tracks_size_and_nullability() {
        let narrow = make_column("Name", "varchar", 50, false);
        let wide = make_column("Name", "varchar", 100, false);
        let nullable = make_column("Name", "varchar", 50, true);
        assert_ne!(narrow.signature(), wide.signature());
        assert_ne!(narrow.signature(), nullable.signature());
        assert_eq!(narrow.signature(), "[varchar](50) NOT NULL");
    }

    #[test]
    fn test_definition_identity_and_default() {
        let mut id = make_column("Id", "int", 4, false);
        id.is_identity = true;
        assert_eq!(id.definition(), "[Id] [int] IDENTITY(1, 1) NOT NULL");

        let mut flag = make_column("Active", "bit", 1, false);
        flag.default = Some(DefaultConstraint {
            name: "DF_Widget_Active".to_string(),
            definition: "((1))".to_string(),
        });
        assert_eq!(
            flag.definition(),
            "[Active] [bit] NOT NULL CONSTRAINT [DF_Widget_Active] DEFAULT ((1))"
        );
    }

    #[test]
    fn test_definition_computed_and_period() {
        let mut total = make_column("Total", "decimal", 9, true);
        total.is_computed = true;
        total.computed_definition = Some("([Qty]*[Price])".to_string());
        assert_eq!(total.definition(), "[Total] AS ([Qty]*[Price])");
        assert_eq!(total.signature(), "AS ([Qty]*[Price])");
        assert!(!total.is_insertable());

        let mut start = make_column("ValidFrom", "datetime2", 8, false);
        start.scale = 7;
        start.generated = Some(GeneratedRole::RowStart);
        assert_eq!(
            start.definition(),
            "[ValidFrom] [datetime2](7) GENERATED ALWAYS AS ROW START NOT NULL"
        );
        assert!(!start.is_insertable());
    }

    #[test]
    fn test_rowversion_not_insertable() {
        assert!(!make_column("Version", "timestamp", 8, false).is_insertable());
        assert!(make_column("Name", "varchar", 50, false).is_insertable());
    }

    #[test]
    fn test_routine_kind_codes() {
        for code in ["FN", "IF", "TF", "V", "P"] {
            assert_eq!(RoutineKind::from_code(code).unwrap().code(), code);
        }
        assert_eq!(RoutineKind::from_code("U"), None);
        assert_eq!(RoutineKind::TableFunction.keyword(), "FUNCTION");
    }
}
