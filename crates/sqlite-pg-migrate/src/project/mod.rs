//! Turns one source row into the values of one target row.
//!
//! The projector is a single generic algorithm driven by the column plan; it
//! never fails. A row that cannot be inserted comes back as
//! [`Projection::Skip`] with the first reason found.

use std::fmt;

use crate::coerce::coerce;
use crate::core::identifier::matches_id_format;
use crate::core::value::{Row, Value};
use crate::introspect::ColumnInfo;
use crate::registry::{ColumnRule, LookupTables};
use crate::remap::IdentifierRemapper;

/// Why a row was not inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A reference could not be resolved to an identifier in target format.
    MissingReference { column: String, value: String },
    /// A reference resolved to an identifier the target column rejects.
    InvalidReference { column: String, value: String },
    /// A required column ended up NULL.
    RequiredValueMissing { column: String, value: String },
    /// The insert was dropped by a conflict on a unique column other than
    /// the primary key. `column` is the key column, `value` the old key.
    UniqueConflict { column: String, value: String },
}

impl SkipReason {
    pub fn column(&self) -> &str {
        match self {
            SkipReason::MissingReference { column, .. }
            | SkipReason::InvalidReference { column, .. }
            | SkipReason::RequiredValueMissing { column, .. }
            | SkipReason::UniqueConflict { column, .. } => column,
        }
    }

    /// Offending value as it appeared before coercion.
    pub fn value(&self) -> &str {
        match self {
            SkipReason::MissingReference { value, .. }
            | SkipReason::InvalidReference { value, .. }
            | SkipReason::RequiredValueMissing { value, .. }
            | SkipReason::UniqueConflict { value, .. } => value,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            SkipReason::MissingReference { .. } => "missing reference",
            SkipReason::InvalidReference { .. } => "invalid reference",
            SkipReason::RequiredValueMissing { .. } => "required value missing",
            SkipReason::UniqueConflict { .. } => "conflict on another unique key",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {} ({})", self.reason(), self.column(), self.value())
    }
}

/// Primary-key mapping produced by a projected row. It is committed to the
/// remapper only once the row is in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingKey {
    pub old: String,
    pub new: String,
}

/// A reference to another row of the same table that is not in the target
/// yet. The referencing row has to wait until that row is inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentKey {
    pub column: String,
    pub old: String,
}

/// Values for one target row, in plan order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRow {
    pub values: Vec<Value>,
    pub pending_key: Option<PendingKey>,
    pub parent: Option<ParentKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Insert(ProjectedRow),
    Skip(SkipReason),
}

/// Projects source rows of one table through its column plan.
pub struct RowProjector<'a> {
    table: &'a str,
    plan: &'a [ColumnInfo],
    remapper: &'a IdentifierRemapper,
    lookups: &'a LookupTables,
}

impl<'a> RowProjector<'a> {
    pub fn new(
        table: &'a str,
        plan: &'a [ColumnInfo],
        remapper: &'a IdentifierRemapper,
        lookups: &'a LookupTables,
    ) -> Self {
        Self {
            table,
            plan,
            remapper,
            lookups,
        }
    }

    pub fn project(&self, row: &Row) -> Projection {
        let mut values = Vec::with_capacity(self.plan.len());
        let mut pending_key = None;
        let mut parent = None;

        for col in self.plan {
            let mut value = match &col.rule {
                ColumnRule::Compute(c) => c.evaluate(row, self.lookups),
                _ => row
                    .get(col.source_column.as_deref().unwrap_or(&col.name))
                    .clone(),
            };
            if value.is_blank() {
                if let Some(default) = &col.default_value {
                    value = default.clone();
                }
            }

            if let Some(referenced) = col.referenced_table() {
                if value.is_blank() {
                    if col.not_null {
                        return Projection::Skip(SkipReason::MissingReference {
                            column: col.name.clone(),
                            value: value.to_string(),
                        });
                    }
                    values.push(Value::Null);
                    continue;
                }

                let Some(old) = value.as_key() else {
                    return Projection::Skip(SkipReason::MissingReference {
                        column: col.name.clone(),
                        value: value.to_string(),
                    });
                };

                match self.remapper.lookup(referenced, &old) {
                    Some(new) if matches_id_format(new, col.target_type) => {
                        value = Value::Text(new.to_string());
                    }
                    Some(new) => {
                        return Projection::Skip(SkipReason::InvalidReference {
                            column: col.name.clone(),
                            value: new.to_string(),
                        });
                    }
                    // Same-table parent not inserted yet: its identifier is
                    // deterministic, so point at it and let the caller order
                    // the inserts.
                    None if referenced == self.table && self.remaps_own_key() => {
                        let new = self.remapper.assign_primary_key(self.table, &old);
                        if !matches_id_format(&new, col.target_type) {
                            return Projection::Skip(SkipReason::InvalidReference {
                                column: col.name.clone(),
                                value: new,
                            });
                        }
                        value = Value::Text(new);
                        parent = Some(ParentKey {
                            column: col.name.clone(),
                            old,
                        });
                    }
                    None if matches_id_format(&old, col.target_type) => {}
                    None => {
                        return Projection::Skip(SkipReason::MissingReference {
                            column: col.name.clone(),
                            value: value.to_string(),
                        });
                    }
                }
            }

            if col.is_primary_key {
                let Some(old) = value.as_key() else {
                    return Projection::Skip(SkipReason::RequiredValueMissing {
                        column: col.name.clone(),
                        value: value.to_string(),
                    });
                };
                let new = match self.remapper.lookup(self.table, &old) {
                    Some(known) => known.to_string(),
                    None => self.remapper.assign_primary_key(self.table, &old),
                };
                value = Value::Text(new.clone());
                pending_key = Some(PendingKey { old, new });
            }

            let coerced = coerce(&value, col.target_type);
            if coerced.is_null() && col.not_null {
                return Projection::Skip(SkipReason::RequiredValueMissing {
                    column: col.name.clone(),
                    value: value.to_string(),
                });
            }
            values.push(coerced);
        }

        Projection::Insert(ProjectedRow {
            values,
            pending_key,
            parent,
        })
    }

    fn remaps_own_key(&self) -> bool {
        self.plan.iter().any(|c| c.is_primary_key)
    }
}
