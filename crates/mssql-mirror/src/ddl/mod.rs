//! DDL synthesis for the create and alter phases.
//!
//! Both phases only read the source catalog (plus the target's routine
//! timestamps under [`RoutinePolicy::WhenNewer`]). Every statement is guarded,
//! so running a script twice changes nothing the second time.

use tracing::{debug, info};

use crate::config::RoutinePolicy;
use crate::core::schema::{ConstraintKind, Routine};
use crate::core::Catalog;
use crate::drivers::mssql::dialect;
use crate::script::{Phase, Script};

/// Constraint kinds in the order the alter phase adds them.
const CONSTRAINT_ORDER: [ConstraintKind; 4] = [
    ConstraintKind::PrimaryKey,
    ConstraintKind::Default,
    ConstraintKind::Unique,
    ConstraintKind::Check,
];

/// Create script: schemas, tables, indexes, table types, then functions,
/// views and procedures.
pub fn create_script(source: &Catalog, database: &str) -> Script {
    let mut script = Script::new(Phase::Create, database);

    for schema in source.schemas() {
        script.push(dialect::create_schema(&schema.name));
    }
    for table in source.tables() {
        let columns = source.columns_of(table.id);
        script.push(dialect::create_table(
            table,
            &columns,
            source.primary_key_of(table.id),
        ));
    }
    for index in source.indexes() {
        script.push(dialect::create_index(index));
    }
    for table_type in source.table_types() {
        script.push(dialect::create_table_type(table_type));
    }
    for routine in source
        .functions()
        .chain(source.views())
        .chain(source.procedures())
    {
        script.extend(dialect::create_routine(routine));
    }

    info!(
        "Create: {} schemas, {} tables, {} indexes, {} table types, {} routines",
        source.schemas().len(),
        source.tables().len(),
        source.indexes().len(),
        source.table_types().len(),
        source.routines().len()
    );
    script
}

/// Whether `routine`'s definition should be replaced on the target.
pub fn should_replace(routine: &Routine, target: &Catalog, policy: RoutinePolicy) -> bool {
    match policy {
        RoutinePolicy::Always => true,
        RoutinePolicy::WhenNewer => {
            let Some(existing) = target.routine(&routine.qualified_name()) else {
                return false;
            };
            let Some(target_modified) = existing.modified else {
                return false;
            };
            routine.modified.unwrap_or(routine.created) > target_modified
        }
    }
}

/// Alter script: constraints and foreign keys, then routine replacement.
pub fn alter_script(source: &Catalog, target: &Catalog, policy: RoutinePolicy) -> Script {
    let mut script = Script::new(Phase::Alter, target.database_name());

    for kind in CONSTRAINT_ORDER {
        script.extend(source.constraints_of_kind(kind).map(dialect::add_constraint));
    }
    script.extend(source.foreign_keys().iter().map(dialect::add_foreign_key));

    let mut replaced = 0usize;
    for routine in source
        .functions()
        .chain(source.views())
        .chain(source.procedures())
    {
        if !should_replace(routine, target, policy) {
            debug!("{}: definition unchanged, not replaced", routine.qualified_name());
            continue;
        }
        script.extend(dialect::alter_routine(routine));
        replaced += 1;
    }

    info!(
        "Alter: {} constraints, {} foreign keys, {} routines replaced",
        source.constraints().len(),
        source.foreign_keys().len(),
        replaced
    );
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Database, RoutineKind, Schema};
    use crate::core::CatalogData;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn make_routine(id: i32, kind: RoutineKind, name: &str, modified: Option<NaiveDateTime>) -> Routine {
        Routine {
            id,
            schema: "dbo".to_string(),
            name: name.to_string(),
            kind,
            definition: format!("CREATE {} dbo.{} AS SELECT 1", kind.keyword(), name),
            created: at(1),
            modified,
        }
    }

    fn make_catalog(routines: Vec<Routine>) -> Catalog {
        Catalog::new(CatalogData {
            database: Some(Database {
                id: 5,
                name: "Shop".to_string(),
            }),
            schemas: vec![Schema {
                id: 1,
                name: "dbo".to_string(),
            }],
            routines,
            ..Default::default()
        })
    }

    #[test]
    fn test_create_script_guards_routines() {
        let source = make_catalog(vec![
            make_routine(10, RoutineKind::Procedure, "Load", None),
            make_routine(11, RoutineKind::View, "Active", None),
        ]);
        let script = create_script(&source, "ShopCopy");
        let batches = script.batches();

        assert!(batches[0].contains("CREATE SCHEMA [dbo]"));
        // View precedes procedure; each routine is three batches.
        assert_eq!(batches.len(), 1 + 3 + 3);
        assert_eq!(batches[1], "IF (OBJECT_ID('[dbo].[Active]') IS NOT NULL) SET NOEXEC ON");
        assert_eq!(batches[2], "CREATE VIEW dbo.Active AS SELECT 1");
        assert_eq!(batches[3], "SET NOEXEC OFF");
        assert!(batches[5].starts_with("CREATE PROCEDURE"));
    }

    #[test]
    fn test_alter_rewrites_routines_always() {
        let source = make_catalog(vec![make_routine(10, RoutineKind::ScalarFunction, "Tax", None)]);
        let target = make_catalog(Vec::new());
        let script = alter_script(&source, &target, RoutinePolicy::Always);
        assert_eq!(
            script.batches(),
            &[
                "IF (OBJECT_ID('[dbo].[Tax]') IS NULL) SET NOEXEC ON".to_string(),
                "ALTER FUNCTION dbo.Tax AS SELECT 1".to_string(),
                "SET NOEXEC OFF".to_string(),
            ]
        );
    }

    #[test]
    fn test_when_newer_compares_modify_times() {
        let target = make_catalog(vec![
            make_routine(20, RoutineKind::Procedure, "Fresh", Some(at(10))),
            make_routine(21, RoutineKind::Procedure, "Stale", Some(at(2))),
            make_routine(22, RoutineKind::Procedure, "Unknown", None),
        ]);

        let fresh = make_routine(1, RoutineKind::Procedure, "Fresh", Some(at(5)));
        let stale = make_routine(2, RoutineKind::Procedure, "Stale", Some(at(5)));
        let unknown = make_routine(3, RoutineKind::Procedure, "Unknown", Some(at(5)));
        let missing = make_routine(4, RoutineKind::Procedure, "Missing", Some(at(5)));

        assert!(!should_replace(&fresh, &target, RoutinePolicy::WhenNewer));
        assert!(should_replace(&stale, &target, RoutinePolicy::WhenNewer));
        assert!(!should_replace(&unknown, &target, RoutinePolicy::WhenNewer));
        assert!(!should_replace(&missing, &target, RoutinePolicy::WhenNewer));
        assert!(should_replace(&fresh, &target, RoutinePolicy::Always));
    }

    #[test]
    fn test_empty_alter_renders_placeholder() {
        let script = alter_script(&make_catalog(Vec::new()), &make_catalog(Vec::new()), RoutinePolicy::Always);
        assert!(script.render().ends_with("-- Nothing to alter. --\n"));
    }
}
