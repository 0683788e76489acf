//! Store boundaries used by the migration engine.
//!
//! - [`SourceReader`]: introspects and streams rows out of the source store
//! - [`TargetWriter`]: introspects the target store and inserts projected rows
//!
//! The orchestrator only talks to these traits, so the engine can be driven
//! against an in-memory target in tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::NativeColumn;
use super::value::{Row, Value};

/// Options for reading rows from a table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Table name.
    pub table: String,
    /// Columns to read. `None` reads every column.
    pub columns: Option<Vec<String>>,
    /// Number of rows per batch.
    pub batch_size: usize,
}

impl ReadOptions {
    /// Read every column of `table`.
    pub fn all_columns(table: impl Into<String>, batch_size: usize) -> Self {
        Self {
            table: table.into(),
            columns: None,
            batch_size,
        }
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            table: String::new(),
            columns: None,
            batch_size: 500,
        }
    }
}

/// Target column bound in an INSERT: the name plus the type used to cast the
/// text-encoded parameter server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertColumn {
    pub name: String,
    pub cast_type: String,
}

/// What a conflict-tolerant insert wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows actually inserted.
    pub inserted: u64,
    /// Text form of the returned key of every inserted row. Empty unless a
    /// key column was requested.
    pub keys: Vec<String>,
}

/// Read schema and data from the source store.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Check if a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Ordered columns of a table. A missing table yields an empty list.
    async fn columns(&self, table: &str) -> Result<Vec<NativeColumn>>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Start streaming rows from a table.
    ///
    /// Returns a channel receiver that yields batches of rows. The reader
    /// spawns a background task that populates the channel, enabling
    /// backpressure when the channel fills up. An error ends the stream.
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Vec<Row>>>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "sqlite").
    fn db_type(&self) -> &str;

    /// Release the connection.
    async fn close(&self);
}

/// Write projected rows to the target store.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Ordered columns of a table. A missing table yields an empty list.
    async fn columns(&self, table: &str) -> Result<Vec<NativeColumn>>;

    /// Insert rows, ignoring rows that conflict with an existing unique key.
    ///
    /// Each row holds one value per entry of `columns`, in the same order.
    /// With `returning`, the outcome lists that column's value for every row
    /// that was actually inserted. The whole call fails or succeeds as a unit.
    async fn insert_rows(
        &self,
        table: &str,
        columns: &[InsertColumn],
        rows: &[Vec<Value>],
        returning: Option<&str>,
    ) -> Result<InsertOutcome>;

    /// The subset of `keys` already present in `key_column`, compared as text.
    async fn existing_keys(
        &self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> Result<Vec<String>>;

    /// Run a multi-statement SQL script (baseline schema).
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "postgres").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}
