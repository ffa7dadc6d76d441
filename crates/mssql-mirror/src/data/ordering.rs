//! Foreign-key dependency ordering.
//!
//! A table's weight is its depth in the foreign-key graph: tables that
//! reference nothing weigh 1, every other table weighs one more than its
//! heaviest parent. Emitting rows by ascending weight puts parents before
//! children. Tables caught in a reference cycle are weighted in a second,
//! reversed pass that only counts parents already weighted.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::schema::{ForeignKey, Table};

/// Dependency weight per qualified table name.
pub fn dependency_weights(tables: &[Table], foreign_keys: &[ForeignKey]) -> BTreeMap<String, usize> {
    let names: BTreeSet<String> = tables.iter().map(Table::qualified_name).collect();

    let mut parents: BTreeMap<String, BTreeSet<String>> =
        names.iter().map(|n| (n.clone(), BTreeSet::new())).collect();
    for fk in foreign_keys {
        let child = fk.parent_qualified_name();
        let parent = fk.referenced_qualified_name();
        // Self references and references leaving the loaded set do not order anything.
        if child == parent || !names.contains(&parent) {
            continue;
        }
        if let Some(set) = parents.get_mut(&child) {
            set.insert(parent);
        }
    }

    let mut weights: BTreeMap<String, usize> = BTreeMap::new();
    let mut pending: Vec<&String> = names.iter().collect();
    pending.sort_by_key(|n| (parents[*n].len(), (*n).clone()));

    loop {
        let mut leftovers = Vec::new();
        for name in pending.iter().copied() {
            let deps = &parents[name];
            if deps.iter().all(|p| weights.contains_key(p)) {
                let heaviest = deps.iter().map(|p| weights[p]).max().unwrap_or(0);
                weights.insert(name.clone(), heaviest + 1);
            } else {
                leftovers.push(name);
            }
        }
        if leftovers.is_empty() {
            return weights;
        }
        if leftovers.len() == pending.len() {
            pending = leftovers;
            break;
        }
        pending = leftovers;
    }

    // Cycles: walk the leftovers in reverse, counting only weighted parents.
    for name in pending.into_iter().rev() {
        let heaviest = parents[name]
            .iter()
            .filter_map(|p| weights.get(p))
            .max()
            .copied()
            .unwrap_or(0);
        weights.insert(name.clone(), heaviest + 1);
    }
    weights
}

/// Sort tables by ascending weight, ties by qualified name.
pub fn order_tables<'a>(mut tables: Vec<&'a Table>, weights: &BTreeMap<String, usize>) -> Vec<&'a Table> {
    tables.sort_by_key(|t| {
        let name = t.qualified_name();
        (weights.get(&name).copied().unwrap_or(1), name)
    });
    tables
}
