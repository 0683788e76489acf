//! Table ordering from foreign-key references.

use std::collections::{BTreeSet, HashMap};

use crate::error::{MigrateError, Result};
use crate::registry::Registry;

/// Order `tables` so every table comes after the tables it references.
///
/// Only references between tables of the run count; self-references are
/// ignored. Among tables that are ready at the same time, the one listed
/// first in `tables` goes first, so the result is deterministic.
pub fn dependency_order(tables: &[String], registry: &Registry) -> Result<Vec<String>> {
    let in_run: BTreeSet<&str> = tables.iter().map(String::as_str).collect();

    let deps: HashMap<&str, BTreeSet<String>> = tables
        .iter()
        .map(|table| {
            let config = registry.config_for(table);
            let referenced = config
                .referenced_tables()
                .into_iter()
                .filter(|t| *t != table.as_str() && in_run.contains(t))
                .map(str::to_string)
                .collect();
            (table.as_str(), referenced)
        })
        .collect();

    let mut remaining: Vec<&str> = Vec::with_capacity(tables.len());
    for table in tables {
        if !remaining.contains(&table.as_str()) {
            remaining.push(table);
        }
    }

    let mut ordered: Vec<String> = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let ready = remaining.iter().position(|table| {
            deps[table]
                .iter()
                .all(|dep| ordered.iter().any(|done| done == dep))
        });

        match ready {
            Some(idx) => ordered.push(remaining.remove(idx).to_string()),
            None => {
                return Err(MigrateError::DependencyCycle(
                    remaining.iter().map(|t| t.to_string()).collect(),
                ))
            }
        }
    }

    Ok(ordered)
}
