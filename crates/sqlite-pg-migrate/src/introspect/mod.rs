//! Schema introspection on both stores and the per-table column plan.
//!
//! The plan ([`ColumnInfo`] list) is the union of what the source has, what
//! the target has and what the table's rules say. Every planned column exists
//! in the target; source-only columns are ignored and target-only columns
//! without a rule are left to the target's defaults.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::schema::{find_column, NativeColumn, TypeCategory};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::core::value::Value;
use crate::error::Result;
use crate::registry::{ColumnRule, TableMigrationConfig};

/// Reads column metadata from both stores. Read-only.
#[derive(Clone)]
pub struct SchemaIntrospector {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
}

impl SchemaIntrospector {
    pub fn new(source: Arc<dyn SourceReader>, target: Arc<dyn TargetWriter>) -> Self {
        Self { source, target }
    }

    /// Ordered source columns. A missing table yields an empty list.
    pub async fn source_columns(&self, table: &str) -> Result<Vec<NativeColumn>> {
        let columns = self.source.columns(table).await?;
        debug!("{}: {} source columns", table, columns.len());
        Ok(columns)
    }

    /// Ordered target columns. A missing table yields an empty list.
    pub async fn target_columns(&self, table: &str) -> Result<Vec<NativeColumn>> {
        let columns = self.target.columns(table).await?;
        debug!("{}: {} target columns", table, columns.len());
        Ok(columns)
    }
}

/// One column of the insert plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Target column name.
    pub name: String,
    /// Source column read for the value, if the rule reads exactly one.
    pub source_column: Option<String>,
    /// Category of that source column, if it exists in the source.
    pub source_type: Option<TypeCategory>,
    /// Category the target column demands.
    pub target_type: TypeCategory,
    /// Type name used to cast the bound value on insert.
    pub target_data_type: String,
    /// Whether this is the table's remapped primary key.
    pub is_primary_key: bool,
    /// Whether a NULL here makes the row unusable.
    pub not_null: bool,
    pub rule: ColumnRule,
    pub default_value: Option<Value>,
}

impl ColumnInfo {
    /// Table whose keys this column points at.
    pub fn referenced_table(&self) -> Option<&str> {
        self.rule.referenced_table()
    }
}

/// Serializable view of a planned column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnPlanEntry {
    pub name: String,
    pub rule: String,
    pub target_type: TypeCategory,
    pub not_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl From<&ColumnInfo> for ColumnPlanEntry {
    fn from(col: &ColumnInfo) -> Self {
        let rule = if col.is_primary_key {
            format!("{} (primary key, remapped)", col.rule.describe())
        } else {
            col.rule.describe()
        };
        Self {
            name: col.name.clone(),
            rule,
            target_type: col.target_type,
            not_null: col.not_null,
            default: col.default_value.as_ref().map(|v| v.to_string()),
        }
    }
}

/// Build the insert plan for one table, in target column order.
pub fn build_column_plan(
    source: &[NativeColumn],
    target: &[NativeColumn],
    config: &TableMigrationConfig,
) -> Vec<ColumnInfo> {
    let mut plan = Vec::with_capacity(target.len());

    for column in target {
        let overridden = config.override_for(&column.name);
        let (rule, force_not_null, default_value) = match overridden {
            Some(o) => (o.rule.clone(), o.force_not_null, o.default_value.clone()),
            None if find_column(source, &column.name).is_some() => (ColumnRule::Copy, false, None),
            None => {
                debug!(
                    "{}.{}: target-only column left to its default",
                    config.table_name, column.name
                );
                continue;
            }
        };

        let reads = rule.source_columns(&column.name);
        let any_source_present = reads.iter().any(|c| find_column(source, c).is_some());
        if overridden.is_some() && !any_source_present && default_value.is_none() {
            warn!(
                "{}.{}: rule reads {:?}, none of which exist in the source; column skipped",
                config.table_name, column.name, reads
            );
            continue;
        }

        let source_column = match &rule {
            ColumnRule::Compute(_) => None,
            _ => reads.first().map(|c| c.to_string()),
        };
        let source_type = source_column
            .as_deref()
            .and_then(|c| find_column(source, c))
            .map(|c| c.category);

        let is_primary_key = config.primary_key_column.as_deref() == Some(column.name.as_str());

        plan.push(ColumnInfo {
            name: column.name.clone(),
            source_column,
            source_type,
            target_type: column.category,
            target_data_type: column.cast_type.clone(),
            is_primary_key,
            not_null: !column.is_nullable || force_not_null,
            rule,
            default_value,
        });
    }

    plan
}
