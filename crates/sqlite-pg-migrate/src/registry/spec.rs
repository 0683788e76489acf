//! YAML form of table rules.
//!
//! ```yaml
//! tables:
//!   orders:
//!     primary_key: id
//!     columns:
//!       user_id: { reference: users, from: buyer_id }
//!       status: { default: pending }
//!       unit_price: { compute: coalesce, inputs: [unit_price, price] }
//! lookups:
//!   - { name: cart_owner, table: carts, key: id, value: user_id }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ColumnOverride, ColumnRule, ComputeFn, Computation, TableMigrationConfig};
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// Rules for one table as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    /// Primary key column converted to UUID. Omit to copy keys as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,

    /// Target column name to its rule.
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnSpec>,
}

/// Rule for one target column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    /// Source column to read instead of the same-named one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Table whose remapped primary keys this column points at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Compute function name: coalesce, join, lookup, slugify, lowercase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<String>,

    /// Source columns fed to the compute function.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Separator for `join` (default: a single space).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,

    /// Lookup name for `lookup`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<String>,

    /// Value used when the source value is blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,

    /// Treat the column as NOT NULL even if the target allows null.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_null: bool,
}

/// Scalar default as written in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&DefaultValue> for Value {
    fn from(v: &DefaultValue) -> Self {
        match v {
            DefaultValue::Bool(b) => Value::Bool(*b),
            DefaultValue::Integer(i) => Value::Integer(*i),
            DefaultValue::Real(f) => Value::Real(*f),
            DefaultValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// Auxiliary key/value table pre-scanned from the source before any table is
/// migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupSpec {
    /// Name compute rules refer to.
    pub name: String,

    /// Source table to scan.
    pub table: String,

    /// Column holding the lookup key.
    #[serde(rename = "key")]
    pub key_column: String,

    /// Column holding the looked-up value.
    #[serde(rename = "value")]
    pub value_column: String,
}

impl LookupSpec {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            key_column: key_column.into(),
            value_column: value_column.into(),
        }
    }
}

impl TableSpec {
    /// Convert into the engine's table rules.
    pub fn to_config(&self, table: &str) -> Result<TableMigrationConfig> {
        let mut config = TableMigrationConfig::new(table);
        config.primary_key_column = self.primary_key.clone();

        for (column, spec) in &self.columns {
            let rule = spec.rule(table, column)?;
            config.column_overrides.insert(
                column.clone(),
                ColumnOverride {
                    rule,
                    force_not_null: spec.not_null,
                    default_value: spec.default.as_ref().map(Value::from),
                },
            );
        }

        Ok(config)
    }
}

impl ColumnSpec {
    fn rule(&self, table: &str, column: &str) -> Result<ColumnRule> {
        let bad = |msg: &str| {
            MigrateError::Config(format!("tables.{}.columns.{}: {}", table, column, msg))
        };

        let Some(name) = &self.compute else {
            if self.separator.is_some() || self.lookup.is_some() || !self.inputs.is_empty() {
                return Err(bad("'inputs', 'separator' and 'lookup' require 'compute'"));
            }
            return Ok(match (&self.reference, &self.from) {
                (Some(target), source) => ColumnRule::Reference {
                    table: target.clone(),
                    source: source.clone(),
                },
                (None, Some(source)) => ColumnRule::Rename {
                    source: source.clone(),
                },
                (None, None) => ColumnRule::Copy,
            });
        };

        if self.from.is_some() {
            return Err(bad("'from' cannot be combined with 'compute'; use 'inputs'"));
        }
        if self.inputs.is_empty() {
            return Err(bad("'compute' needs at least one entry in 'inputs'"));
        }

        let function = match name.trim().to_lowercase().as_str() {
            "coalesce" => ComputeFn::Coalesce,
            "join" => ComputeFn::Join {
                separator: self.separator.clone().unwrap_or_else(|| " ".to_string()),
            },
            "lookup" => ComputeFn::Lookup {
                lookup: self
                    .lookup
                    .clone()
                    .ok_or_else(|| bad("'compute: lookup' needs a 'lookup' name"))?,
            },
            "slugify" => ComputeFn::Slugify,
            "lowercase" => ComputeFn::Lowercase,
            other => {
                return Err(bad(&format!(
                    "unknown compute function '{}' (expected coalesce, join, lookup, slugify or lowercase)",
                    other
                )))
            }
        };

        Ok(ColumnRule::Compute(Computation {
            function,
            inputs: self.inputs.clone(),
            reference: self.reference.clone(),
        }))
    }
}
