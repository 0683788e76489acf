//! Old-to-new identifier mappings collected while tables are migrated.
//!
//! A mapping, once recorded, never changes for the rest of the run. New
//! identifiers are synthesized deterministically (UUIDv5 of
//! `"{table}:{old}"` under the run's namespace), so a re-run assigns the same
//! identifiers and its inserts collide with the rows already present.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

/// What [`IdentifierRemapper::remember`] did with a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RememberOutcome {
    /// New mapping stored.
    Recorded,
    /// The same mapping was already stored.
    AlreadyKnown,
    /// A different new id was already stored for this old id; it was kept.
    Conflict { existing: String },
}

/// Per-table `old id -> new id` mappings for one run.
#[derive(Debug, Clone)]
pub struct IdentifierRemapper {
    namespace: Uuid,
    maps: HashMap<String, HashMap<String, String>>,
    conflicts: usize,
}

impl IdentifierRemapper {
    /// Create an empty remapper synthesizing identifiers under `namespace`.
    pub fn new(namespace: Uuid) -> Self {
        Self {
            namespace,
            maps: HashMap::new(),
            conflicts: 0,
        }
    }

    /// Record `old -> new` for `table`. An existing mapping is never
    /// overwritten.
    pub fn remember(&mut self, table: &str, old: &str, new: &str) -> RememberOutcome {
        let map = self.maps.entry(table.to_string()).or_default();
        match map.get(old) {
            Some(existing) if existing == new => RememberOutcome::AlreadyKnown,
            Some(existing) => {
                self.conflicts += 1;
                warn!(
                    "{}: identifier {} is already mapped to {}; ignoring new mapping to {}",
                    table, old, existing, new
                );
                RememberOutcome::Conflict {
                    existing: existing.clone(),
                }
            }
            None => {
                map.insert(old.to_string(), new.to_string());
                RememberOutcome::Recorded
            }
        }
    }

    /// New identifier for `old` in `table`, if one was recorded.
    pub fn lookup(&self, table: &str, old: &str) -> Option<&str> {
        self.maps
            .get(table)
            .and_then(|m| m.get(old))
            .map(String::as_str)
    }

    /// New identifier for `old` in `table`, or `old` itself when unknown.
    pub fn resolve(&self, table: &str, old: &str) -> String {
        self.lookup(table, old).unwrap_or(old).to_string()
    }

    /// Identifier to give a row whose old primary key is `old`.
    ///
    /// A key that already is a UUID is kept (normalized to lowercase
    /// hyphenated form); anything else gets a synthesized one.
    pub fn assign_primary_key(&self, table: &str, old: &str) -> String {
        match Uuid::parse_str(old.trim()) {
            Ok(existing) => existing.hyphenated().to_string(),
            Err(_) => self.synthesize(table, old),
        }
    }

    /// Deterministic identifier for `old` in `table`.
    pub fn synthesize(&self, table: &str, old: &str) -> String {
        let name = format!("{}:{}", table, old);
        Uuid::new_v5(&self.namespace, name.as_bytes())
            .hyphenated()
            .to_string()
    }

    /// Number of mappings recorded for `table`.
    pub fn len(&self, table: &str) -> usize {
        self.maps.get(table).map_or(0, HashMap::len)
    }

    /// Whether no mapping was recorded for any table.
    pub fn is_empty(&self) -> bool {
        self.maps.values().all(HashMap::is_empty)
    }

    /// Conflicting re-assignments seen so far.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }
}
