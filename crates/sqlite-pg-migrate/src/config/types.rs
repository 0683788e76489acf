//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::registry::spec::{LookupSpec, TableSpec};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (SQLite).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Per-table migration rules. Entries replace the built-in rules for the
    /// same table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tables: BTreeMap<String, TableSpec>,

    /// Auxiliary lookup tables pre-scanned from the source before migration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lookups: Vec<LookupSpec>,
}

/// Source database (SQLite) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "sqlite" for now).
    #[serde(default = "default_sqlite")]
    pub r#type: String,

    /// Path to the SQLite database file.
    pub path: String,

    /// Busy timeout in milliseconds while the file is locked by another process.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("path", &self.path)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Maximum pooled connections. The engine is sequential, so a few suffice.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Tables to migrate. Empty means every table known to the registry.
    /// The run order is computed from foreign-key references; this order only
    /// breaks ties.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Rows per INSERT statement (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Namespace UUID for deterministic identifier synthesis. Changing it
    /// between runs breaks idempotence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_namespace: Option<String>,

    /// SQL file applied to the target before any table is migrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_schema: Option<PathBuf>,

    /// Maximum skip/failure reasons kept per table in the report (default: 100).
    /// Counts are always exact.
    #[serde(default = "default_max_issues")]
    pub max_issues_per_table: usize,

    /// Start from the built-in marketplace table rules (default: true).
    #[serde(default = "default_true")]
    pub builtin_registry: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            batch_size: default_batch_size(),
            id_namespace: None,
            baseline_schema: None,
            max_issues_per_table: default_max_issues(),
            builtin_registry: true,
        }
    }
}

// Default value functions for serde
fn default_sqlite() -> String {
    "sqlite".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_batch_size() -> usize {
    500
}

fn default_max_issues() -> usize {
    100
}

fn default_true() -> bool {
    true
}
