//! T-SQL statement renderers.
//!
//! Every creating or dropping statement carries its own existence guard so a
//! script can be re-run against a partially migrated database. Each function
//! returns one batch; callers separate batches with `GO`.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::identifier::{bracket, qualified, string_literal};
use crate::core::schema::{
    Column, Constraint, ConstraintKind, ForeignKey, GeneratedRole, Index, KeyColumn, Routine,
    Table, TableType,
};

static CREATE_ROUTINE_RE: OnceLock<Regex> = OnceLock::new();

fn key_list(columns: &[KeyColumn]) -> String {
    columns
        .iter()
        .map(KeyColumn::render)
        .collect::<Vec<_>>()
        .join(", ")
}

fn name_list<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| bracket(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `OBJECT_ID('[schema].[name]')`
fn object_id(qualified_name: &str) -> String {
    format!("OBJECT_ID({})", string_literal(qualified_name))
}

fn trust_clause(trusted: bool) -> &'static str {
    if trusted {
        "WITH CHECK"
    } else {
        "WITH NOCHECK"
    }
}

pub fn use_database(name: &str) -> String {
    format!("USE {};", bracket(name))
}

// =============================================================================
// Create
// =============================================================================

pub fn create_schema(name: &str) -> String {
    let create = format!("CREATE SCHEMA {}", bracket(name));
    format!(
        "IF NOT EXISTS (SELECT schema_id FROM sys.schemas WHERE name = {})\nBEGIN\n    EXEC sp_executesql N{}\nEND",
        string_literal(name),
        string_literal(&create)
    )
}

/// CREATE TABLE with inline column definitions, the primary key, and the
/// system-versioning clause for temporal tables.
pub fn create_table(table: &Table, columns: &[&Column], primary_key: Option<&Constraint>) -> String {
    let name = table.qualified_name();
    let mut lines: Vec<String> = columns.iter().map(|c| c.definition()).collect();

    let pk_columns: Vec<&&Column> = columns.iter().filter(|c| c.primary_key.is_some()).collect();
    if let Some(first) = pk_columns.first() {
        let pk_name = first.primary_key.as_deref().unwrap_or_default();
        let keys = match primary_key {
            Some(pk) if !pk.columns.is_empty() => pk.columns.clone(),
            _ => pk_columns
                .iter()
                .map(|c| KeyColumn {
                    name: c.name.clone(),
                    descending: false,
                })
                .collect(),
        };
        let index_type = first
            .primary_key_type
            .as_deref()
            .or_else(|| primary_key.and_then(|pk| pk.index_type.as_deref()))
            .unwrap_or("CLUSTERED");
        lines.push(format!(
            "CONSTRAINT {} PRIMARY KEY {} ({})",
            bracket(pk_name),
            index_type,
            key_list(&keys)
        ));
    }

    let period = |role| {
        columns
            .iter()
            .find(|c| c.generated == Some(role))
            .map(|c| bracket(&c.name))
    };
    let mut options = String::new();
    if let Some(history) = &table.history {
        if let (Some(start), Some(end)) = (period(GeneratedRole::RowStart), period(GeneratedRole::RowEnd)) {
            lines.push(format!("PERIOD FOR SYSTEM_TIME ({}, {})", start, end));
        }
        options = format!(
            " WITH (SYSTEM_VERSIONING = ON (HISTORY_TABLE = {}))",
            history.qualified_name()
        );
    }

    format!(
        "IF ({} IS NULL)\nBEGIN\n    CREATE TABLE {} (\n        {}\n    ){}\nEND",
        object_id(&name),
        name,
        lines.join(",\n        "),
        options
    )
}

pub fn create_index(index: &Index) -> String {
    let table = index.table_qualified_name();
    let mut stmt = format!(
        "IF NOT EXISTS (SELECT * FROM sys.indexes WHERE name = {} AND object_id = {})\n    CREATE {} INDEX {} ON {} ({})",
        string_literal(&index.name),
        object_id(&table),
        index.type_desc,
        bracket(&index.name),
        table,
        key_list(&index.columns)
    );
    if !index.included.is_empty() {
        stmt.push_str(&format!(" INCLUDE ({})", name_list(&index.included)));
    }
    if let Some(filter) = &index.filter {
        stmt.push_str(&format!(" WHERE {}", filter));
    }
    stmt
}

pub fn create_table_type(table_type: &TableType) -> String {
    let name = table_type.qualified_name();
    format!(
        "IF (TYPE_ID({}) IS NULL)\n    CREATE TYPE {} AS TABLE (\n        {}\n    )",
        string_literal(&name),
        name,
        table_type.columns.join(",\n        ")
    )
}

/// Create a routine only when it is missing. The definition must be the
/// first statement of its batch, so the guard toggles NOEXEC around it.
pub fn create_routine(routine: &Routine) -> Vec<String> {
    vec![
        format!(
            "IF ({} IS NOT NULL) SET NOEXEC ON",
            object_id(&routine.qualified_name())
        ),
        routine.definition.trim().to_string(),
        "SET NOEXEC OFF".to_string(),
    ]
}

// =============================================================================
// Alter
// =============================================================================

/// Rewrite a module's leading `CREATE <kind>` into `ALTER <kind>`, skipping
/// leading comments.
pub fn rewrite_create_as_alter(definition: &str) -> String {
    let re = CREATE_ROUTINE_RE.get_or_init(|| {
        Regex::new(r"(?is)^((?:\s|--[^\n]*\n|/\*.*?\*/)*)CREATE(\s+)(PROC(?:EDURE)?|FUNCTION|VIEW)\b")
            .expect("valid regex")
    });
    re.replace(definition, "${1}ALTER${2}${3}").into_owned()
}

/// Replace a routine's definition when it already exists.
pub fn alter_routine(routine: &Routine) -> Vec<String> {
    vec![
        format!(
            "IF ({} IS NULL) SET NOEXEC ON",
            object_id(&routine.qualified_name())
        ),
        rewrite_create_as_alter(routine.definition.trim()),
        "SET NOEXEC OFF".to_string(),
    ]
}

/// Guarded ADD CONSTRAINT for a primary key, unique, default or check
/// constraint.
pub fn add_constraint(constraint: &Constraint) -> String {
    let table = constraint.table_qualified_name();
    let name = bracket(&constraint.name);
    let definition = constraint.definition.as_deref().unwrap_or_default();

    let alter = match constraint.kind {
        ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
            let keyword = if constraint.kind == ConstraintKind::PrimaryKey {
                "PRIMARY KEY"
            } else {
                "UNIQUE"
            };
            let index_type = constraint.index_type.as_deref().unwrap_or("NONCLUSTERED");
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {} {} ({})",
                table,
                name,
                keyword,
                index_type,
                key_list(&constraint.columns)
            )
        }
        ConstraintKind::Default => {
            let column = constraint
                .columns
                .first()
                .map(|c| bracket(&c.name))
                .unwrap_or_default();
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                table, name, definition, column
            )
        }
        ConstraintKind::Check => format!(
            "ALTER TABLE {} {} ADD CONSTRAINT {} CHECK {}",
            table,
            trust_clause(constraint.trusted),
            name,
            definition
        ),
    };

    format!(
        "IF ({} IS NULL)\nBEGIN\n    {}\nEND",
        object_id(&constraint.qualified_name()),
        alter
    )
}

pub fn add_foreign_key(fk: &ForeignKey) -> String {
    format!(
        "IF ({} IS NULL)\nBEGIN\n    ALTER TABLE {} {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})\nEND",
        object_id(&fk.qualified_name()),
        fk.parent_qualified_name(),
        trust_clause(fk.trusted),
        bracket(&fk.name),
        name_list(&fk.parent_columns),
        fk.referenced_qualified_name(),
        name_list(&fk.referenced_columns)
    )
}

// =============================================================================
// Patch
// =============================================================================

pub fn drop_foreign_key(fk: &ForeignKey) -> String {
    drop_table_constraint(&fk.schema, &fk.name, &fk.parent_qualified_name())
}

pub fn drop_primary_key(pk: &Constraint) -> String {
    drop_table_constraint(&pk.schema, &pk.name, &pk.table_qualified_name())
}

fn drop_table_constraint(schema: &str, name: &str, table: &str) -> String {
    format!(
        "IF ({} IS NOT NULL)\nBEGIN\n    ALTER TABLE {} DROP CONSTRAINT {}\nEND",
        object_id(&qualified(schema, name)),
        table,
        bracket(name)
    )
}

/// Drop a table; a system-versioned table is unlinked from its history
/// table, which is dropped with it.
pub fn drop_table(table: &Table) -> String {
    let name = table.qualified_name();
    let body = match &table.history {
        Some(history) => format!(
            "ALTER TABLE {} SET (SYSTEM_VERSIONING = OFF);\n    DROP TABLE {};\n    DROP TABLE {};",
            name,
            name,
            history.qualified_name()
        ),
        None => format!("DROP TABLE {};", name),
    };
    format!(
        "IF EXISTS (SELECT object_id FROM sys.tables WHERE object_id = {})\nBEGIN\n    {}\nEND",
        object_id(&name),
        body
    )
}

pub fn drop_schema(name: &str) -> String {
    format!(
        "IF EXISTS (SELECT schema_id FROM sys.schemas WHERE name = {})\n    DROP SCHEMA {}",
        string_literal(name),
        bracket(name)
    )
}

/// Add a column if it is missing. `force_nullable` adds a NOT NULL column
/// as nullable so existing rows can be backfilled first.
pub fn add_column(column: &Column, force_nullable: bool) -> String {
    let table = column.table_qualified_name();
    let definition = if force_nullable && !column.is_nullable {
        let mut relaxed = column.clone();
        relaxed.is_nullable = true;
        relaxed.definition()
    } else {
        column.definition()
    };
    format!(
        "IF COL_LENGTH({}, {}) IS NULL\n    ALTER TABLE {} ADD {}",
        string_literal(&table),
        string_literal(&column.name),
        table,
        definition
    )
}

pub fn alter_column(column: &Column) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} {} {}",
        column.table_qualified_name(),
        bracket(&column.name),
        column.type_definition(),
        column.nullability()
    )
}

/// Drop a column and the default constraint bound to it.
pub fn drop_column(column: &Column) -> String {
    let table = column.table_qualified_name();
    let mut body = String::new();
    if let Some(default) = &column.default {
        body.push_str(&format!(
            "IF ({} IS NOT NULL)\n        ALTER TABLE {} DROP CONSTRAINT {};\n    ",
            object_id(&qualified(&column.schema, &default.name)),
            table,
            bracket(&default.name)
        ));
    }
    body.push_str(&format!(
        "ALTER TABLE {} DROP COLUMN {};",
        table,
        bracket(&column.name)
    ));
    format!(
        "IF COL_LENGTH({}, {}) IS NOT NULL\nBEGIN\n    {}\nEND",
        string_literal(&table),
        string_literal(&column.name),
        body
    )
}

pub fn backfill(column: &Column, value: &str) -> String {
    let name = bracket(&column.name);
    format!(
        "UPDATE {} SET {} = {} WHERE {} IS NULL",
        column.table_qualified_name(),
        name,
        value,
        name
    )
}

// =============================================================================
// Data
// =============================================================================

pub fn identity_insert(table: &str, on: bool) -> String {
    format!(
        "SET IDENTITY_INSERT {} {}",
        table,
        if on { "ON" } else { "OFF" }
    )
}

/// Clear identity insert on every user table that has an identity column.
pub fn reset_identity_inserts() -> String {
    "EXEC sp_msforeachtable @command1 = 'SET IDENTITY_INSERT ? OFF',\n    \
     @whereand = ' AND EXISTS (SELECT 1 FROM sys.columns WHERE object_id = o.id AND is_identity = 1) AND o.type = ''U'''"
        .to_string()
}

pub fn disable_all_constraints() -> String {
    "EXEC sp_msforeachtable 'ALTER TABLE ? NOCHECK CONSTRAINT all'".to_string()
}

pub fn enable_all_constraints() -> String {
    "EXEC sp_msforeachtable 'ALTER TABLE ? WITH CHECK CHECK CONSTRAINT all'".to_string()
}

/// One multi-row INSERT. `rows` hold rendered literals in `columns` order.
pub fn insert_values<S: AsRef<str>>(table: &str, columns: &[S], rows: &[Vec<String>]) -> String {
    let values = rows
        .iter()
        .map(|row| format!("({})", row.join(", ")))
        .collect::<Vec<_>>()
        .join(",\n        ");
    format!(
        "INSERT INTO {} ({}) VALUES\n        {};",
        table,
        name_list(columns),
        values
    )
}

/// Run `statements` only when `table` has no rows.
pub fn if_empty(table: &str, statements: &[String]) -> String {
    format!(
        "IF NOT EXISTS (SELECT * FROM {})\nBEGIN\n    {}\nEND",
        table,
        statements.join("\n    ")
    )
}

/// Insert the row when no row with the same key exists, otherwise update
/// every non-key column. Pairs are (column, literal).
pub fn upsert(table: &str, keys: &[(String, String)], values: &[(String, String)]) -> String {
    let matches = keys
        .iter()
        .map(|(col, lit)| format!("{} = {}", bracket(col), lit))
        .collect::<Vec<_>>()
        .join(" AND ");

    let all: Vec<&(String, String)> = keys.iter().chain(values.iter()).collect();
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        all.iter()
            .map(|(c, _)| bracket(c))
            .collect::<Vec<_>>()
            .join(", "),
        all.iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut stmt = format!(
        "IF NOT EXISTS (SELECT * FROM {} WHERE {})\n    {}",
        table, matches, insert
    );
    if !values.is_empty() {
        let sets = values
            .iter()
            .map(|(col, lit)| format!("{} = {}", bracket(col), lit))
            .collect::<Vec<_>>()
            .join(", ");
        stmt.push_str(&format!(
            "\nELSE\n    UPDATE {} SET {} WHERE {}",
            table, sets, matches
        ));
    }
    stmt
}
