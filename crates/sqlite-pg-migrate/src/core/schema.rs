//! Column metadata for both stores.
//!
//! Introspection reduces every column to a [`NativeColumn`]: its declared
//! type plus a [`TypeCategory`] decided once, so row processing never looks
//! at type strings again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of value categories a target column can demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Boolean,
    Integer,
    /// Exact decimal (`numeric`, `decimal`, `money`).
    Numeric,
    Float,
    /// Dates and timestamps, with or without time zone.
    Timestamp,
    Uuid,
    Json,
    Text,
    /// Anything else (bytea, arrays, geometric types). Values pass unchanged.
    Other,
}

impl TypeCategory {
    /// Categorize a PostgreSQL `information_schema.columns.data_type`.
    pub fn from_pg_type(data_type: &str) -> Self {
        match data_type.trim().to_lowercase().as_str() {
            "boolean" | "bool" => TypeCategory::Boolean,
            "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8" | "int" | "serial"
            | "bigserial" | "smallserial" => TypeCategory::Integer,
            "numeric" | "decimal" | "money" => TypeCategory::Numeric,
            "real" | "double precision" | "float4" | "float8" => TypeCategory::Float,
            "timestamp with time zone"
            | "timestamp without time zone"
            | "timestamptz"
            | "timestamp"
            | "date" => TypeCategory::Timestamp,
            "uuid" => TypeCategory::Uuid,
            "json" | "jsonb" => TypeCategory::Json,
            "text" | "character varying" | "varchar" | "character" | "char" | "bpchar"
            | "citext" | "name" => TypeCategory::Text,
            _ => TypeCategory::Other,
        }
    }

    /// Categorize a SQLite declared column type.
    ///
    /// Follows SQLite's affinity rules, refined by the common type names
    /// applications write (`BOOLEAN`, `DATETIME`, `UUID`, `JSON`). An empty
    /// declaration has BLOB affinity and maps to [`TypeCategory::Other`].
    pub fn from_sqlite_type(declared: &str) -> Self {
        let t = declared.trim().to_uppercase();
        if t.is_empty() {
            return TypeCategory::Other;
        }
        if t.contains("BOOL") {
            TypeCategory::Boolean
        } else if t.contains("UUID") || t.contains("GUID") {
            TypeCategory::Uuid
        } else if t.contains("JSON") {
            TypeCategory::Json
        } else if t.contains("DATE") || t.contains("TIME") {
            TypeCategory::Timestamp
        } else if t.contains("INT") {
            TypeCategory::Integer
        } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
            TypeCategory::Text
        } else if t.contains("BLOB") {
            TypeCategory::Other
        } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
            TypeCategory::Float
        } else {
            TypeCategory::Numeric
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeCategory::Boolean => "boolean",
            TypeCategory::Integer => "integer",
            TypeCategory::Numeric => "numeric",
            TypeCategory::Float => "float",
            TypeCategory::Timestamp => "timestamp",
            TypeCategory::Uuid => "uuid",
            TypeCategory::Json => "json",
            TypeCategory::Text => "text",
            TypeCategory::Other => "other",
        }
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Column as a store describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeColumn {
    /// Column name.
    pub name: String,

    /// Declared type (SQLite declaration or PostgreSQL `data_type`).
    pub data_type: String,

    /// Type name usable in a cast (`udt_name` on PostgreSQL, e.g. "int4", "uuid").
    pub cast_type: String,

    /// Category decided from the declared type.
    pub category: TypeCategory,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

/// Find a column by name in an introspected column list.
pub fn find_column<'a>(columns: &'a [NativeColumn], name: &str) -> Option<&'a NativeColumn> {
    columns.iter().find(|c| c.name == name)
}
