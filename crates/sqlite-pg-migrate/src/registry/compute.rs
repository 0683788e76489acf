//! Pure functions behind `ColumnRule::Compute`, and the lookup tables they
//! may consult.

use std::collections::HashMap;

use super::{ComputeFn, Computation};
use crate::core::value::{Row, Value};

/// Lookup tables pre-scanned from the source: lookup name to (key to value).
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    maps: HashMap<String, HashMap<String, Value>>,
}

impl LookupTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a lookup table.
    pub fn insert(&mut self, name: impl Into<String>, entries: HashMap<String, Value>) {
        self.maps.insert(name.into(), entries);
    }

    /// Look up `key` in the named table.
    pub fn get(&self, name: &str, key: &str) -> Option<&Value> {
        self.maps.get(name).and_then(|m| m.get(key))
    }

    /// Number of entries in the named table.
    pub fn len_of(&self, name: &str) -> usize {
        self.maps.get(name).map_or(0, HashMap::len)
    }
}

impl Computation {
    /// Evaluate against a source row. Never fails; a function with nothing to
    /// work with yields NULL.
    pub fn evaluate(&self, row: &Row, lookups: &LookupTables) -> Value {
        let first = || {
            self.inputs
                .first()
                .map(|c| row.get(c))
                .unwrap_or(&Value::Null)
        };

        match &self.function {
            ComputeFn::Coalesce => self
                .inputs
                .iter()
                .map(|c| row.get(c))
                .find(|v| !v.is_blank())
                .cloned()
                .unwrap_or(Value::Null),

            ComputeFn::Join { separator } => {
                let parts: Vec<String> = self
                    .inputs
                    .iter()
                    .map(|c| row.get(c))
                    .filter(|v| !v.is_blank())
                    .filter_map(text_of)
                    .collect();
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::Text(parts.join(separator))
                }
            }

            ComputeFn::Lookup { lookup } => first()
                .as_key()
                .and_then(|key| lookups.get(lookup, &key))
                .cloned()
                .unwrap_or(Value::Null),

            ComputeFn::Slugify => match text_of(first()) {
                Some(s) => {
                    let slug = slugify(&s);
                    if slug.is_empty() {
                        Value::Null
                    } else {
                        Value::Text(slug)
                    }
                }
                None => Value::Null,
            },

            ComputeFn::Lowercase => match first() {
                Value::Text(s) => Value::Text(s.to_lowercase()),
                other => other.clone(),
            },
        }
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Blob(_) => None,
        Value::Text(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Decimal(d) => Some(d.to_string()),
    }
}

/// Lowercase ASCII slug: runs of non-alphanumerics become a single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
