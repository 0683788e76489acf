//! PostgreSQL target writer implementation.
//!
//! Implements the `TargetWriter` trait on top of deadpool-postgres. Rows are
//! inserted with multi-row `INSERT ... ON CONFLICT DO NOTHING`; every value is
//! bound as text and cast server-side to the column's type.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::core::identifier::{qualify_pg, quote_ident};
use crate::core::schema::{NativeColumn, TypeCategory};
use crate::core::traits::{InsertColumn, InsertOutcome, TargetWriter};
use crate::core::value::Value;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL caps bind parameters per statement at 65535.
const MAX_BIND_PARAMS: usize = 65_535;

/// PostgreSQL target writer implementation.
pub struct PostgresWriter {
    pool: Pool,
    schema: String,
}

impl PostgresWriter {
    /// Create a new PostgreSQL writer from configuration and verify that the
    /// server answers.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("sqlite-pg-migrate");

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode: SslMode = config.ssl_mode.parse()?;
        let mgr = match ssl_mode.connector()? {
            None => Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config),
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        };
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection("target", e))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection("target", e))?;

        info!("Connected to PostgreSQL target: {}", config.display_target());

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context.to_string()))
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn columns(&self, table: &str) -> Result<Vec<NativeColumn>> {
        let client = self.client("getting connection for columns").await?;

        let query = r#"
            SELECT
                column_name,
                data_type,
                udt_name,
                CASE WHEN is_nullable = 'YES' THEN true ELSE false END,
                COALESCE(
                    (SELECT true FROM pg_catalog.pg_constraint c
                     JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
                     JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
                     JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
                     WHERE n.nspname = columns.table_schema
                       AND t.relname = columns.table_name
                       AND a.attname = columns.column_name
                       AND c.contype = 'p'
                       AND a.attnum = ANY(c.conkey)
                     LIMIT 1),
                    false
                ) AS is_primary_key,
                ordinal_position::int4
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = client.query(query, &[&self.schema, &table]).await?;

        let columns: Vec<NativeColumn> = rows
            .iter()
            .map(|row| {
                let data_type: String = row.get(1);
                NativeColumn {
                    name: row.get(0),
                    category: TypeCategory::from_pg_type(&data_type),
                    data_type,
                    cast_type: row.get(2),
                    is_nullable: row.get(3),
                    is_primary_key: row.get(4),
                    ordinal_pos: row.get(5),
                }
            })
            .collect();

        debug!(
            "Loaded {} target columns for {}.{}",
            columns.len(),
            self.schema,
            table
        );
        Ok(columns)
    }

    async fn insert_rows(
        &self,
        table: &str,
        columns: &[InsertColumn],
        rows: &[Vec<Value>],
        returning: Option<&str>,
    ) -> Result<InsertOutcome> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let target = qualify_pg(&self.schema, table)?;
        let col_list = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let casts = columns
            .iter()
            .map(|c| quote_ident(&c.cast_type))
            .collect::<Result<Vec<_>>>()?;
        let returning = returning.map(quote_ident).transpose()?;

        let rows_per_statement = (MAX_BIND_PARAMS / columns.len()).max(1);

        let mut client = self.client("getting connection for insert").await?;
        let tx = client.transaction().await?;
        let mut outcome = InsertOutcome::default();

        for chunk in rows.chunks(rows_per_statement) {
            let (sql, params) =
                build_insert_sql(&target, &col_list, &casts, returning.as_deref(), chunk);
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            if returning.is_some() {
                let written = tx.query(sql.as_str(), &param_refs).await?;
                outcome.inserted += written.len() as u64;
                outcome
                    .keys
                    .extend(written.iter().map(|row| row.get::<_, String>(0)));
            } else {
                outcome.inserted += tx.execute(sql.as_str(), &param_refs).await?;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn existing_keys(
        &self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.client("getting connection for key check").await?;
        let column = quote_ident(key_column)?;
        let sql = format!(
            "SELECT {col}::text FROM {} WHERE {col}::text = ANY($1)",
            qualify_pg(&self.schema, table)?,
            col = column
        );
        let rows = client.query(sql.as_str(), &[&keys]).await?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let client = self.client("getting connection for batch execute").await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let client = self.client("getting connection for row count").await?;
        let sql = format!("SELECT COUNT(*)::int8 FROM {}", qualify_pg(&self.schema, table)?);
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client("getting connection for ping").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Build a multi-row INSERT that ignores conflicting rows.
///
/// Parameters are bound as text (`$n::text`) and then cast to the column type.
/// `returning` is an already quoted column whose text form is returned for
/// every inserted row.
fn build_insert_sql(
    target: &str,
    col_list: &str,
    casts: &[String],
    returning: Option<&str>,
    rows: &[Vec<Value>],
) -> (String, Vec<Option<String>>) {
    let mut placeholders = Vec::with_capacity(rows.len());
    let mut params = Vec::with_capacity(rows.len() * casts.len());
    let mut idx = 1;

    for row in rows {
        let row_placeholders: Vec<String> = casts
            .iter()
            .enumerate()
            .map(|(col_idx, cast)| {
                let p = format!("${}::text::{}", idx, cast);
                idx += 1;
                params.push(row.get(col_idx).and_then(Value::to_param));
                p
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT DO NOTHING",
        target,
        col_list,
        placeholders.join(", ")
    );
    if let Some(column) = returning {
        sql.push_str(&format!(" RETURNING {}::text", column));
    }

    (sql, params)
}
