//! Shared fixtures: an in-memory SQLite source and an in-memory target store
//! that behaves like `INSERT ... ON CONFLICT DO NOTHING` on the primary key.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;

use sqlite_pg_migrate::{
    Config, InsertColumn, InsertOutcome, MigrateError, NativeColumn, Orchestrator, Registry,
    Result, SqliteReader, TargetWriter, TypeCategory, Value,
};

pub type TargetRow = HashMap<String, Value>;

struct MemoryTable {
    columns: Vec<NativeColumn>,
    /// Primary key plus any extra unique columns.
    unique: Vec<String>,
    rows: Vec<TargetRow>,
}

/// Target store kept in memory.
#[derive(Default)]
pub struct MemoryTarget {
    tables: Mutex<HashMap<String, MemoryTable>>,
    /// `(table, column, value)` triples whose rows are rejected.
    rejections: Mutex<Vec<(String, String, String)>>,
    scripts: Mutex<Vec<String>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. Columns flagged as primary key are unique.
    pub fn with_table(self, name: &str, columns: Vec<NativeColumn>) -> Self {
        let unique = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        self.tables.lock().insert(
            name.to_string(),
            MemoryTable {
                columns,
                unique,
                rows: Vec::new(),
            },
        );
        self
    }

    /// Add a unique constraint on `column`.
    pub fn with_unique(self, table: &str, column: &str) -> Self {
        if let Some(t) = self.tables.lock().get_mut(table) {
            t.unique.push(column.to_string());
        }
        self
    }

    /// Fail any insert containing a row whose `column` renders as `value`.
    pub fn reject_when(&self, table: &str, column: &str, value: &str) {
        self.rejections
            .lock()
            .push((table.to_string(), column.to_string(), value.to_string()));
    }

    pub fn rows(&self, table: &str) -> Vec<TargetRow> {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn columns(&self, table: &str) -> Result<Vec<NativeColumn>> {
        Ok(self
            .tables
            .lock()
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn insert_rows(
        &self,
        table: &str,
        columns: &[InsertColumn],
        rows: &[Vec<Value>],
        returning: Option<&str>,
    ) -> Result<InsertOutcome> {
        let mut tables = self.tables.lock();
        let stored = tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::transfer(table, "relation does not exist"))?;

        let incoming: Vec<TargetRow> = rows
            .iter()
            .map(|values| {
                columns
                    .iter()
                    .map(|c| c.name.clone())
                    .zip(values.iter().cloned())
                    .collect()
            })
            .collect();

        for row in &incoming {
            for (t, column, value) in self.rejections.lock().iter() {
                let rendered = row.get(column).and_then(Value::as_key);
                if t == table && rendered.as_deref() == Some(value.as_str()) {
                    return Err(MigrateError::transfer(table, format!("{} rejected", value)));
                }
            }
            for column in &stored.columns {
                let missing = row.get(&column.name).map_or(true, Value::is_null);
                if !column.is_nullable && missing {
                    return Err(MigrateError::transfer(
                        table,
                        format!("null value in column \"{}\"", column.name),
                    ));
                }
            }
        }

        let mut outcome = InsertOutcome::default();
        for row in incoming {
            let duplicate = stored.unique.iter().any(|k| {
                stored
                    .rows
                    .iter()
                    .any(|existing| match (existing.get(k), row.get(k)) {
                        (Some(old), Some(new)) => !old.is_null() && old == new,
                        _ => false,
                    })
            });
            if !duplicate {
                if let Some(key) = returning.and_then(|k| row.get(k)).and_then(Value::as_key) {
                    outcome.keys.push(key);
                }
                stored.rows.push(row);
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }

    async fn existing_keys(
        &self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> Result<Vec<String>> {
        Ok(self
            .rows(table)
            .iter()
            .filter_map(|row| row.get(key_column).and_then(Value::as_key))
            .filter(|key| keys.contains(key))
            .collect())
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.scripts.lock().push(sql.to_string());
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.rows(table).len() as i64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

pub fn column(name: &str, category: TypeCategory, nullable: bool) -> NativeColumn {
    NativeColumn {
        name: name.to_string(),
        data_type: category.as_str().to_string(),
        cast_type: category.as_str().to_string(),
        category,
        is_nullable: nullable,
        is_primary_key: false,
        ordinal_pos: 0,
    }
}

pub fn primary_key(name: &str, category: TypeCategory) -> NativeColumn {
    NativeColumn {
        is_primary_key: true,
        ..column(name, category, false)
    }
}

/// Target tables of the redesigned marketplace schema used by the tests.
pub fn marketplace_target() -> MemoryTarget {
    use TypeCategory::*;

    MemoryTarget::new()
        .with_table(
            "users",
            vec![
                primary_key("id", Uuid),
                column("email", Text, false),
                column("name", Text, true),
                column("created_at", Timestamp, true),
            ],
        )
        .with_table(
            "products",
            vec![
                primary_key("id", Uuid),
                column("store_id", Uuid, true),
                column("category_id", Uuid, true),
                column("name", Text, false),
                column("stock", Integer, false),
                column("is_active", Boolean, false),
            ],
        )
        .with_table(
            "carts",
            vec![primary_key("id", Uuid), column("user_id", Uuid, false)],
        )
        .with_table(
            "cart_items",
            vec![
                primary_key("id", Uuid),
                column("cart_id", Uuid, false),
                column("product_id", Uuid, true),
                column("user_id", Uuid, false),
                column("quantity", Integer, false),
            ],
        )
        .with_table(
            "orders",
            vec![
                primary_key("id", Uuid),
                column("user_id", Uuid, false),
                column("store_id", Uuid, true),
                column("total", Numeric, false),
                column("status", Text, false),
            ],
        )
}

/// Source schema matching [`marketplace_target`], with integer keys.
pub const MARKETPLACE_SOURCE: &str = r#"
    CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, name TEXT,
                        created_at INTEGER, legacy_flag INTEGER);
    CREATE TABLE products (id INTEGER PRIMARY KEY, store_id INTEGER, category_id INTEGER,
                           name TEXT, stock TEXT, is_active TEXT);
    CREATE TABLE carts (id INTEGER PRIMARY KEY, user_id INTEGER);
    CREATE TABLE cart_items (id INTEGER PRIMARY KEY, cart_id INTEGER, product_id INTEGER,
                             quantity INTEGER);
    CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, store_id INTEGER,
                         total REAL, status TEXT);
"#;

pub fn source(sql: &str) -> Arc<SqliteReader> {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(sql).unwrap();
    Arc::new(SqliteReader::from_connection(conn))
}

/// Config for the given tables; the store sections are never used.
pub fn config(tables: &[&str]) -> Config {
    let mut config = Config::from_yaml(
        r#"
source:
  path: ":memory:"
target:
  host: localhost
  database: marketplace
  user: postgres
  ssl_mode: disable
migration:
  batch_size: 2
"#,
    )
    .unwrap();
    config.migration.tables = tables.iter().map(|t| t.to_string()).collect();
    config
}

pub fn orchestrator(
    config: Config,
    source: Arc<SqliteReader>,
    target: Arc<MemoryTarget>,
) -> Orchestrator {
    let registry = Registry::from_config(&config).unwrap();
    Orchestrator::with_stores(config, registry, source, target)
}
