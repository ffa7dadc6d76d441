//! System catalog introspection queries.
//!
//! Each query returns one row per leaf item (one row per key column, per index
//! column, and so on); the reader folds consecutive rows into entities. Narrow
//! integer and bit columns are cast so they decode uniformly.

use std::collections::BTreeSet;

use crate::core::identifier::{bracket, string_literal};
use crate::core::schema::{ObjectId, RoutineKind};
use crate::core::traits::TableScope;

pub const DATABASE: &str = "SELECT database_id, name FROM sys.databases WHERE name = @P1";

pub const PING: &str = "SELECT 1";

pub const SCHEMA_NAMES: &str = r#"
    SELECT s.name
    FROM sys.schemas s
    WHERE s.schema_id < 16384
      AND s.name NOT IN ('sys', 'INFORMATION_SCHEMA', 'guest')
    ORDER BY s.name
"#;

/// `IN (...)` list for schema ids. An empty list matches nothing.
fn id_list(ids: &[ObjectId]) -> String {
    if ids.is_empty() {
        return "NULL".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn literal_list<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let list: Vec<_> = names.into_iter().map(|n| string_literal(n)).collect();
    if list.is_empty() {
        "NULL".to_string()
    } else {
        list.join(", ")
    }
}

pub fn schemas(names: &BTreeSet<String>) -> String {
    format!(
        "SELECT schema_id, name FROM sys.schemas WHERE name IN ({}) ORDER BY name",
        literal_list(names)
    )
}

pub fn tables(scope: &TableScope) -> String {
    // NOT IN (NULL) would reject every row
    let exclude = if scope.exclude.is_empty() {
        String::new()
    } else {
        format!(
            "\n      AND QUOTENAME(s.name) + '.' + QUOTENAME(t.name) NOT IN ({})",
            literal_list(&scope.exclude)
        )
    };
    format!(
        r#"
    SELECT
        t.object_id,
        t.schema_id,
        s.name,
        t.name,
        CAST(OBJECTPROPERTY(t.object_id, 'TableHasIdentity') AS INT),
        OBJECT_SCHEMA_NAME(t.history_table_id),
        OBJECT_NAME(t.history_table_id)
    FROM sys.tables t
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    WHERE t.is_ms_shipped = 0
      AND t.temporal_type <> 1
      AND (t.schema_id IN ({ids}) OR QUOTENAME(s.name) + '.' + QUOTENAME(t.name) IN ({include})){exclude}
    ORDER BY s.name, t.name
"#,
        ids = id_list(&scope.schema_ids),
        include = literal_list(&scope.include),
        exclude = exclude,
    )
}

pub fn columns(schema_ids: &[ObjectId]) -> String {
    format!(
        r#"
    SELECT
        c.object_id,
        s.name,
        t.name,
        c.name,
        c.column_id,
        ty.name,
        CAST(CASE
            WHEN ty.name IN ('nchar', 'nvarchar') AND c.max_length > 0 THEN c.max_length / 2
            ELSE c.max_length
        END AS INT),
        CAST(c.precision AS INT),
        CAST(c.scale AS INT),
        CAST(c.is_nullable AS INT),
        CAST(c.is_identity AS INT),
        CAST(c.is_computed AS INT),
        cc.definition,
        dc.name,
        dc.definition,
        pk.name,
        pk.type_desc,
        CAST(c.generated_always_type AS INT)
    FROM sys.columns c
    JOIN sys.tables t ON t.object_id = c.object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.types ty ON ty.user_type_id = c.user_type_id
    LEFT JOIN sys.computed_columns cc
        ON cc.object_id = c.object_id AND cc.column_id = c.column_id
    LEFT JOIN sys.default_constraints dc ON dc.object_id = c.default_object_id
    LEFT JOIN (
        SELECT ic.object_id, ic.column_id, kc.name, i.type_desc
        FROM sys.key_constraints kc
        JOIN sys.indexes i
            ON i.object_id = kc.parent_object_id AND i.index_id = kc.unique_index_id
        JOIN sys.index_columns ic
            ON ic.object_id = i.object_id AND ic.index_id = i.index_id
        WHERE kc.type = 'PK'
    ) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id
    WHERE t.schema_id IN ({})
    ORDER BY c.object_id, c.column_id
"#,
        id_list(schema_ids)
    )
}

pub fn foreign_keys(schema_ids: &[ObjectId]) -> String {
    format!(
        r#"
    SELECT
        fk.object_id,
        fk.name,
        s.name,
        fk.parent_object_id,
        OBJECT_NAME(fk.parent_object_id),
        pc.name,
        OBJECT_SCHEMA_NAME(fk.referenced_object_id),
        OBJECT_NAME(fk.referenced_object_id),
        rc.name,
        CAST(fk.is_not_trusted AS INT)
    FROM sys.foreign_keys fk
    JOIN sys.schemas s ON s.schema_id = fk.schema_id
    JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
    JOIN sys.columns pc
        ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
    JOIN sys.columns rc
        ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
    WHERE fk.schema_id IN ({})
    ORDER BY fk.object_id, fkc.constraint_column_id
"#,
        id_list(schema_ids)
    )
}

pub fn constraints(schema_ids: &[ObjectId]) -> String {
    let ids = id_list(schema_ids);
    format!(
        r#"
    SELECT
        kc.object_id,
        kc.name,
        s.name,
        kc.parent_object_id,
        OBJECT_NAME(kc.parent_object_id),
        CAST(kc.type AS VARCHAR(2)),
        c.name,
        CAST(ic.is_descending_key AS INT),
        CAST(i.type_desc AS NVARCHAR(60)),
        CAST(NULL AS NVARCHAR(MAX)),
        1,
        CAST(ic.key_ordinal AS INT)
    FROM sys.key_constraints kc
    JOIN sys.schemas s ON s.schema_id = kc.schema_id
    JOIN sys.indexes i ON i.object_id = kc.parent_object_id AND i.index_id = kc.unique_index_id
    JOIN sys.index_columns ic
        ON ic.object_id = i.object_id AND ic.index_id = i.index_id AND ic.key_ordinal > 0
    JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    WHERE kc.schema_id IN ({ids})
    UNION ALL
    SELECT
        dc.object_id,
        dc.name,
        s.name,
        dc.parent_object_id,
        OBJECT_NAME(dc.parent_object_id),
        CAST(dc.type AS VARCHAR(2)),
        c.name,
        0,
        CAST(NULL AS NVARCHAR(60)),
        dc.definition,
        1,
        1
    FROM sys.default_constraints dc
    JOIN sys.schemas s ON s.schema_id = dc.schema_id
    JOIN sys.columns c ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id
    WHERE dc.schema_id IN ({ids})
    UNION ALL
    SELECT
        cc.object_id,
        cc.name,
        s.name,
        cc.parent_object_id,
        OBJECT_NAME(cc.parent_object_id),
        CAST(cc.type AS VARCHAR(2)),
        c.name,
        0,
        CAST(NULL AS NVARCHAR(60)),
        cc.definition,
        CASE WHEN cc.is_not_trusted = 1 THEN 0 ELSE 1 END,
        1
    FROM sys.check_constraints cc
    JOIN sys.schemas s ON s.schema_id = cc.schema_id
    LEFT JOIN sys.columns c ON c.object_id = cc.parent_object_id AND c.column_id = cc.parent_column_id
    WHERE cc.schema_id IN ({ids})
    ORDER BY 1, 12
"#
    )
}

pub fn indexes(schema_ids: &[ObjectId]) -> String {
    format!(
        r#"
    SELECT
        i.object_id,
        i.index_id,
        i.name,
        s.name,
        t.name,
        i.type_desc,
        c.name,
        CAST(ic.is_descending_key AS INT),
        CAST(ic.is_included_column AS INT),
        i.filter_definition
    FROM sys.indexes i
    JOIN sys.tables t ON t.object_id = i.object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    WHERE i.type IN (1, 2)
      AND i.is_unique = 0
      AND i.is_primary_key = 0
      AND i.is_unique_constraint = 0
      AND t.schema_id IN ({})
    ORDER BY i.object_id, i.index_id, ic.is_included_column, ic.key_ordinal, ic.index_column_id
"#,
        id_list(schema_ids)
    )
}

pub fn table_types(schema_ids: &[ObjectId]) -> String {
    format!(
        r#"
    SELECT
        tt.type_table_object_id,
        s.name,
        tt.name,
        c.name,
        c.column_id,
        ty.name,
        CAST(CASE
            WHEN ty.name IN ('nchar', 'nvarchar') AND c.max_length > 0 THEN c.max_length / 2
            ELSE c.max_length
        END AS INT),
        CAST(c.precision AS INT),
        CAST(c.scale AS INT),
        CAST(c.is_nullable AS INT),
        CAST(c.is_identity AS INT)
    FROM sys.table_types tt
    JOIN sys.schemas s ON s.schema_id = tt.schema_id
    JOIN sys.columns c ON c.object_id = tt.type_table_object_id
    JOIN sys.types ty ON ty.user_type_id = c.user_type_id
    WHERE tt.schema_id IN ({})
    ORDER BY tt.type_table_object_id, c.column_id
"#,
        id_list(schema_ids)
    )
}

pub fn routines(kinds: &[RoutineKind], schema_ids: &[ObjectId]) -> String {
    let codes: Vec<String> = kinds.iter().map(|k| k.code().to_string()).collect();
    format!(
        r#"
    SELECT
        o.object_id,
        s.name,
        o.name,
        CAST(o.type AS VARCHAR(2)),
        m.definition,
        o.create_date,
        o.modify_date
    FROM sys.objects o
    JOIN sys.schemas s ON s.schema_id = o.schema_id
    JOIN sys.sql_modules m ON m.object_id = o.object_id
    WHERE o.is_ms_shipped = 0
      AND o.type IN ({})
      AND o.schema_id IN ({})
    ORDER BY o.create_date, o.object_id
"#,
        literal_list(&codes),
        id_list(schema_ids)
    )
}

/// Last write per table: the later of the last user update and the last
/// statistics refresh.
pub fn last_changes(schema_ids: &[ObjectId]) -> String {
    format!(
        r#"
    SELECT s.name, t.name, MAX(x.changed)
    FROM sys.tables t
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    CROSS APPLY (
        SELECT us.last_user_update AS changed
        FROM sys.dm_db_index_usage_stats us
        WHERE us.database_id = DB_ID() AND us.object_id = t.object_id
        UNION ALL
        SELECT STATS_DATE(st.object_id, st.stats_id)
        FROM sys.stats st
        WHERE st.object_id = t.object_id
    ) x
    WHERE t.schema_id IN ({})
    GROUP BY s.name, t.name
    HAVING MAX(x.changed) IS NOT NULL
"#,
        id_list(schema_ids)
    )
}

/// Full read of the given columns.
pub fn select_rows(schema: &str, table: &str, columns: &[&str]) -> String {
    let cols = columns
        .iter()
        .map(|c| bracket(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}.{}", cols, bracket(schema), bracket(table))
}
