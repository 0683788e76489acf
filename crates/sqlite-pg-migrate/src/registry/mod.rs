//! Per-table migration rules.
//!
//! A [`TableMigrationConfig`] says which primary key (if any) is converted to
//! a UUID and how each target column gets its value. Column rules form a
//! closed set ([`ColumnRule`]) so the row projector stays one generic
//! algorithm. The [`Registry`] holds the rules for every known table and
//! answers with the copy-as-is default for any other table.

mod compute;
mod marketplace;
pub mod spec;

pub use compute::{slugify, LookupTables};
pub use spec::{ColumnSpec, DefaultValue, LookupSpec, TableSpec};

use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::core::identifier::validate_identifier;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// Pure function used by a computed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeFn {
    /// First non-blank input.
    Coalesce,
    /// Non-blank inputs rendered as text and joined.
    Join { separator: String },
    /// Value of a pre-scanned lookup table keyed by the first input.
    Lookup { lookup: String },
    /// URL slug of the first input.
    Slugify,
    /// First input lowercased.
    Lowercase,
}

/// A compute function applied to source columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computation {
    pub function: ComputeFn,
    pub inputs: Vec<String>,
    /// When set, the computed value is an old identifier of this table and is
    /// rewritten like a reference.
    pub reference: Option<String>,
}

/// Where a target column's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRule {
    /// Same-named source column.
    Copy,
    /// Differently named source column.
    Rename { source: String },
    /// Source column holding an old identifier of `table`.
    Reference {
        table: String,
        source: Option<String>,
    },
    /// Computed from one or more source columns.
    Compute(Computation),
}

impl ColumnRule {
    /// Table this column points at, if its value is rewritten through the
    /// identifier remapper.
    pub fn referenced_table(&self) -> Option<&str> {
        match self {
            ColumnRule::Reference { table, .. } => Some(table),
            ColumnRule::Compute(c) => c.reference.as_deref(),
            _ => None,
        }
    }

    /// Source columns this rule reads.
    pub fn source_columns<'a>(&'a self, target: &'a str) -> Vec<&'a str> {
        match self {
            ColumnRule::Copy => vec![target],
            ColumnRule::Rename { source } => vec![source.as_str()],
            ColumnRule::Reference { source, .. } => vec![source.as_deref().unwrap_or(target)],
            ColumnRule::Compute(c) => c.inputs.iter().map(String::as_str).collect(),
        }
    }

    /// Short label for plans and logs.
    pub fn describe(&self) -> String {
        match self {
            ColumnRule::Copy => "copy".to_string(),
            ColumnRule::Rename { source } => format!("rename from {}", source),
            ColumnRule::Reference { table, source } => match source {
                Some(s) => format!("reference {} (from {})", table, s),
                None => format!("reference {}", table),
            },
            ColumnRule::Compute(c) => {
                let name = match &c.function {
                    ComputeFn::Coalesce => "coalesce".to_string(),
                    ComputeFn::Join { separator } => format!("join {:?}", separator),
                    ComputeFn::Lookup { lookup } => format!("lookup {}", lookup),
                    ComputeFn::Slugify => "slugify".to_string(),
                    ComputeFn::Lowercase => "lowercase".to_string(),
                };
                match &c.reference {
                    Some(t) => format!("{}({}) -> reference {}", name, c.inputs.join(", "), t),
                    None => format!("{}({})", name, c.inputs.join(", ")),
                }
            }
        }
    }
}

/// Override for one target column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnOverride {
    pub rule: ColumnRule,
    /// Treat the column as NOT NULL regardless of the target schema.
    pub force_not_null: bool,
    /// Used when the raw value is blank.
    pub default_value: Option<Value>,
}

impl ColumnOverride {
    pub fn new(rule: ColumnRule) -> Self {
        Self {
            rule,
            force_not_null: false,
            default_value: None,
        }
    }
}

/// Rules for one table. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMigrationConfig {
    pub table_name: String,
    /// Primary key converted to UUID. `None` copies keys as-is.
    pub primary_key_column: Option<String>,
    /// Target column name to its override.
    pub column_overrides: BTreeMap<String, ColumnOverride>,
}

impl TableMigrationConfig {
    /// Copy identically named columns, no reference rewriting, no key remap.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table_name: table.into(),
            primary_key_column: None,
            column_overrides: BTreeMap::new(),
        }
    }

    /// Convert `column` to UUID and remember the old/new pairs.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key_column = Some(column.into());
        self
    }

    /// Rewrite same-named `column` through `table`'s remapped keys.
    pub fn reference(self, column: &str, table: &str) -> Self {
        self.rule(
            column,
            ColumnRule::Reference {
                table: table.to_string(),
                source: None,
            },
        )
    }

    /// Rewrite `column`, read from `source`, through `table`'s remapped keys.
    pub fn reference_from(self, column: &str, table: &str, source: &str) -> Self {
        self.rule(
            column,
            ColumnRule::Reference {
                table: table.to_string(),
                source: Some(source.to_string()),
            },
        )
    }

    /// Read `column` from a differently named source column.
    pub fn rename(self, column: &str, source: &str) -> Self {
        self.rule(
            column,
            ColumnRule::Rename {
                source: source.to_string(),
            },
        )
    }

    /// Compute `column` from source columns.
    pub fn compute(self, column: &str, computation: Computation) -> Self {
        self.rule(column, ColumnRule::Compute(computation))
    }

    /// Set the rule of `column`, keeping any default already configured.
    pub fn rule(mut self, column: &str, rule: ColumnRule) -> Self {
        self.column_overrides
            .entry(column.to_string())
            .and_modify(|o| o.rule = rule.clone())
            .or_insert_with(|| ColumnOverride::new(rule));
        self
    }

    /// Fallback for blank values of `column`.
    pub fn default_value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.column_overrides
            .entry(column.to_string())
            .or_insert_with(|| ColumnOverride::new(ColumnRule::Copy))
            .default_value = Some(value.into());
        self
    }

    /// Require a value in `column` even if the target allows null.
    pub fn not_null(mut self, column: &str) -> Self {
        self.column_overrides
            .entry(column.to_string())
            .or_insert_with(|| ColumnOverride::new(ColumnRule::Copy))
            .force_not_null = true;
        self
    }

    pub fn override_for(&self, column: &str) -> Option<&ColumnOverride> {
        self.column_overrides.get(column)
    }

    /// Column name to referenced table, for every rewritten column.
    pub fn references(&self) -> BTreeMap<&str, &str> {
        self.column_overrides
            .iter()
            .filter_map(|(col, o)| o.rule.referenced_table().map(|t| (col.as_str(), t)))
            .collect()
    }

    /// Distinct tables this table points at.
    pub fn referenced_tables(&self) -> BTreeSet<&str> {
        self.references().into_values().collect()
    }
}

/// Table rules for a run.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tables: BTreeMap<String, TableMigrationConfig>,
    /// Registration order, used as the default run order and tie-breaker.
    order: Vec<String>,
    lookups: Vec<LookupSpec>,
}

impl Registry {
    /// A registry with no table rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the registry for a run: the built-in marketplace rules (unless
    /// disabled), overlaid by the config file's table rules and lookups.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = if config.migration.builtin_registry {
            Self::marketplace()
        } else {
            Self::empty()
        };

        for lookup in &config.lookups {
            registry.add_lookup(lookup.clone());
        }
        for (table, spec) in &config.tables {
            registry.insert(spec.to_config(table)?);
        }

        registry.validate()?;
        Ok(registry)
    }

    /// Add or replace a table's rules.
    pub fn insert(&mut self, config: TableMigrationConfig) {
        if !self.tables.contains_key(&config.table_name) {
            self.order.push(config.table_name.clone());
        }
        self.tables.insert(config.table_name.clone(), config);
    }

    /// Add or replace a lookup by name.
    pub fn add_lookup(&mut self, lookup: LookupSpec) {
        self.lookups.retain(|l| l.name != lookup.name);
        self.lookups.push(lookup);
    }

    /// Rules for `table`; unlisted tables get the copy-as-is default.
    pub fn config_for(&self, table: &str) -> TableMigrationConfig {
        self.tables
            .get(table)
            .cloned()
            .unwrap_or_else(|| TableMigrationConfig::new(table))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Listed tables in registration order.
    pub fn table_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn lookups(&self) -> &[LookupSpec] {
        &self.lookups
    }

    /// Check identifiers and that every lookup rule names a known lookup.
    pub fn validate(&self) -> Result<()> {
        for lookup in &self.lookups {
            validate_identifier(&lookup.table)?;
            validate_identifier(&lookup.key_column)?;
            validate_identifier(&lookup.value_column)?;
        }

        for config in self.tables.values() {
            validate_identifier(&config.table_name)?;
            if let Some(pk) = &config.primary_key_column {
                validate_identifier(pk)?;
            }
            for (column, o) in &config.column_overrides {
                validate_identifier(column)?;
                for source in o.rule.source_columns(column) {
                    validate_identifier(source)?;
                }
                if let ColumnRule::Compute(Computation {
                    function: ComputeFn::Lookup { lookup },
                    ..
                }) = &o.rule
                {
                    if !self.lookups.iter().any(|l| &l.name == lookup) {
                        return Err(MigrateError::Config(format!(
                            "tables.{}.columns.{}: unknown lookup '{}'",
                            config.table_name, column, lookup
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
