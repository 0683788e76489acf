//! SQLite source reader implementation.
//!
//! rusqlite is synchronous, so every call runs on the blocking thread pool
//! behind a shared connection. The source is opened read-only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::core::identifier::quote_ident;
use crate::core::schema::{NativeColumn, TypeCategory};
use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Row, Value};
use crate::error::{MigrateError, Result};

/// Batches buffered between the blocking reader and the engine.
const READ_CHANNEL_CAPACITY: usize = 4;

/// SQLite source reader implementation.
#[derive(Clone)]
pub struct SqliteReader {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReader {
    /// Open the source database described by `config`.
    ///
    /// `:memory:` opens an empty in-memory database; any other path must name
    /// an existing file.
    pub fn open(config: &SourceConfig) -> Result<Self> {
        let conn = if config.path == ":memory:" {
            Connection::open_in_memory()
        } else {
            let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(&config.path, flags)
        }
        .map_err(|e| {
            MigrateError::connection("source", format!("cannot open '{}': {}", config.path, e))
        })?;

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| MigrateError::connection("source", e))?;

        // Opening is lazy; touch the schema so a non-database file fails here.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| {
            r.get::<_, i64>(0)
        })
        .map_err(|e| {
            MigrateError::connection("source", format!("'{}' is not readable: {}", config.path, e))
        })?;

        info!("Opened SQLite source: {}", config.path);
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| MigrateError::Io(std::io::Error::other(format!("SQLite task failed: {}", e))))?
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [&table],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn columns(&self, table: &str) -> Result<Vec<NativeColumn>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT cid, name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#,
            )?;
            let columns = stmt
                .query_map([&table], |r| {
                    let declared: String = r.get::<_, Option<String>>(2)?.unwrap_or_default();
                    Ok(NativeColumn {
                        ordinal_pos: r.get::<_, i32>(0)? + 1,
                        name: r.get(1)?,
                        category: TypeCategory::from_sqlite_type(&declared),
                        cast_type: declared.clone(),
                        data_type: declared,
                        is_nullable: r.get::<_, i64>(3)? == 0,
                        is_primary_key: r.get::<_, i64>(4)? > 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            debug!("Loaded {} source columns for {}", columns.len(), table);
            Ok(columns)
        })
        .await
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        self.with_conn(move |conn| Ok(conn.query_row(&sql, [], |r| r.get::<_, i64>(0))?))
            .await
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Vec<Row>>> {
        let (tx, rx) = mpsc::channel(READ_CHANNEL_CAPACITY);
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            if let Err(e) = read_table_internal(&guard, &opts, &tx) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&self) {
        // Connection closes when the last handle drops
    }
}

fn read_table_internal(
    conn: &Connection,
    opts: &ReadOptions,
    tx: &mpsc::Sender<Result<Vec<Row>>>,
) -> Result<()> {
    let select_list = match &opts.columns {
        Some(cols) if !cols.is_empty() => cols
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "),
        _ => "*".to_string(),
    };
    let sql = format!("SELECT {} FROM {}", select_list, quote_ident(&opts.table)?);

    let mut stmt = conn.prepare(&sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let batch_size = opts.batch_size.max(1);

    let mut rows = stmt.query([])?;
    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(r) = rows.next()? {
        let mut row = Row::new();
        for (idx, name) in names.iter().enumerate() {
            let raw = r.get_ref(idx)?;
            let value = convert_value(raw);
            if matches!((raw, &value), (ValueRef::Text(_), Value::Blob(_))) {
                warn!(
                    "{}.{}: text is not valid UTF-8; keeping the raw bytes",
                    opts.table, name
                );
            }
            row.insert(name.clone(), value);
        }
        batch.push(row);

        if batch.len() >= batch_size {
            total += batch.len();
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.blocking_send(Ok(full)).is_err() {
                // Receiver dropped
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        total += batch.len();
        let _ = tx.blocking_send(Ok(batch));
    }

    debug!("Read {} rows from {}", total, opts.table);
    Ok(())
}

fn convert_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        // Invalid UTF-8 stays as bytes rather than being replaced.
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => Value::Blob(bytes.to_vec()),
        },
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}
