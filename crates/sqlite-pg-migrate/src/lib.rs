//! # sqlite-pg-migrate
//!
//! Schema-driven data migration from an application's SQLite database into
//! a PostgreSQL database with a redesigned schema.
//!
//! The library provides:
//!
//! - **Schema introspection** of both stores, with a per-table column plan
//! - **Table rules** (renames, references, computed columns, defaults) in a
//!   registry that ships with the marketplace schema built in
//! - **Identifier remapping** from integer keys to deterministic UUIDs, with
//!   every foreign key rewritten consistently
//! - **Value coercion** from SQLite storage classes to PostgreSQL types
//! - **Idempotent inserts** (`ON CONFLICT DO NOTHING`), so a run can be
//!   repeated safely
//! - **Per-table reports** of inserted, duplicate, skipped and failed rows
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let report = orchestrator.run(false).await?;
//!     println!("Inserted {} rows", report.inserted);
//!     Ok(())
//! }
//! ```

pub mod coerce;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod graph;
pub mod introspect;
pub mod orchestrator;
pub mod project;
pub mod registry;
pub mod remap;
pub mod report;

// Re-exports for convenient access
pub use coerce::coerce;
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig, DEFAULT_ID_NAMESPACE};
pub use core::{
    InsertColumn, InsertOutcome, NativeColumn, ReadOptions, Row, SourceReader, TargetWriter,
    TypeCategory, Value,
};
pub use drivers::{PostgresWriter, SqliteReader, SslMode};
pub use error::{MigrateError, Result};
pub use graph::dependency_order;
pub use introspect::{build_column_plan, ColumnInfo, ColumnPlanEntry, SchemaIntrospector};
pub use orchestrator::{
    HealthCheckResult, MigrationPlan, Orchestrator, TableComparison, TablePhase, TablePlan,
};
pub use project::{ParentKey, PendingKey, ProjectedRow, Projection, RowProjector, SkipReason};
pub use registry::{
    ColumnOverride, ColumnRule, ComputeFn, Computation, LookupSpec, LookupTables, Registry,
    TableMigrationConfig,
};
pub use remap::{IdentifierRemapper, RememberOutcome};
pub use report::{MigrationReport, RowIssue, TableReport, TableStatus};
