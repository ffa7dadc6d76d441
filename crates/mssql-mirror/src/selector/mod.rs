//! Schema and table selection for structural and data mirroring.
//!
//! Resolution is pure: the same policies and discovered schema names always
//! yield the same sets.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::{MirrorPolicy, ObjectFilter};
use crate::core::identifier::normalize_qualified;
use crate::error::{MirrorError, Result};

/// Resolve one schema filter against the discovered schema names.
///
/// No filter yields nothing; an include list yields exactly those names;
/// an exclude list yields everything discovered minus those names.
pub fn resolve_schemas(filter: Option<&ObjectFilter>, discovered: &[String]) -> BTreeSet<String> {
    let Some(filter) = filter else {
        return BTreeSet::new();
    };

    if let Some(include) = &filter.include {
        return include.iter().cloned().collect();
    }

    match &filter.exclude {
        Some(exclude) => discovered
            .iter()
            .filter(|name| !exclude.contains(name))
            .cloned()
            .collect(),
        None => BTreeSet::new(),
    }
}

fn resolve_tables(filter: Option<&ObjectFilter>) -> Result<(BTreeSet<String>, BTreeSet<String>)> {
    let normalize = |names: Option<&Vec<String>>| -> Result<BTreeSet<String>> {
        names
            .into_iter()
            .flatten()
            .map(|n| normalize_qualified(n))
            .collect()
    };

    match filter {
        Some(f) => Ok((normalize(f.include.as_ref())?, normalize(f.exclude.as_ref())?)),
        None => Ok((BTreeSet::new(), BTreeSet::new())),
    }
}

/// Resolved model and data selections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub model_schemas: BTreeSet<String>,
    pub data_schemas: BTreeSet<String>,
    pub model_table_includes: BTreeSet<String>,
    pub model_table_excludes: BTreeSet<String>,
    pub data_table_includes: BTreeSet<String>,
    pub data_table_excludes: BTreeSet<String>,
}

impl Selection {
    /// Resolve both policies. Fails when neither selects any schema.
    pub fn resolve(
        model: Option<&MirrorPolicy>,
        data: Option<&MirrorPolicy>,
        discovered: &[String],
    ) -> Result<Self> {
        let model_schemas = resolve_schemas(model.and_then(|p| p.schemas.as_ref()), discovered);
        let data_schemas = resolve_schemas(data.and_then(|p| p.schemas.as_ref()), discovered);

        if model_schemas.is_empty() && data_schemas.is_empty() {
            return Err(MirrorError::Config("no schemas to load".into()));
        }

        let (model_table_includes, model_table_excludes) =
            resolve_tables(model.and_then(|p| p.tables.as_ref()))?;
        let (data_table_includes, data_table_excludes) =
            resolve_tables(data.and_then(|p| p.tables.as_ref()))?;

        let selection = Self {
            model_schemas,
            data_schemas,
            model_table_includes,
            model_table_excludes,
            data_table_includes,
            data_table_excludes,
        };
        debug!(
            "Resolved selection: model schemas {:?}, data schemas {:?}",
            selection.model_schemas, selection.data_schemas
        );
        Ok(selection)
    }

    /// Schemas whose objects are loaded: model ∪ data.
    pub fn schemas(&self) -> BTreeSet<String> {
        self.model_schemas
            .union(&self.data_schemas)
            .cloned()
            .collect()
    }

    /// Tables pulled in by name regardless of their schema.
    pub fn table_includes(&self) -> BTreeSet<String> {
        self.model_table_includes
            .union(&self.data_table_includes)
            .cloned()
            .collect()
    }

    /// Tables never loaded.
    pub fn table_excludes(&self) -> &BTreeSet<String> {
        &self.model_table_excludes
    }

    /// Whether a table's rows are mirrored. Exclusion always wins.
    pub fn is_data_table(&self, schema: &str, qualified_name: &str) -> bool {
        let selected = self.data_schemas.contains(schema)
            || self.data_table_includes.contains(qualified_name);
        selected && !self.data_table_excludes.contains(qualified_name)
    }
}
