//! Destination database implemented on a deadpool-postgres pool.

use super::{build_pool, build_upsert_sql, RowSink};
use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};
use crate::schema::{quote_ident, TableSpec};
use crate::source::RowRecord;
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::types::ToSql;
use tracing::{debug, info};

/// PostgreSQL destination pool.
pub struct PgPool {
    pool: Pool,
}

impl PgPool {
    /// Create a pool and test the connection.
    pub async fn new(config: &DatabaseConfig, max_conns: usize) -> Result<Self> {
        let pool = build_pool(config, max_conns, "target")?;
        let this = Self { pool };
        this.ping().await?;
        info!("Connected to target PostgreSQL database");
        Ok(this)
    }

    /// Run a trivial query to check connectivity.
    pub async fn ping(&self) -> Result<()> {
        let client = self.client("testing target connection").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))
    }
}

#[async_trait]
impl RowSink for PgPool {
    async fn table_exists(&self, table: &'static TableSpec) -> Result<bool> {
        let client = self.client("checking table existence").await?;

        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = current_schema() AND table_name = $1
                )",
                &[&table.name],
            )
            .await?;

        Ok(row.get(0))
    }

    async fn create_table(&self, table: &'static TableSpec) -> Result<()> {
        let client = self.client("creating table").await?;

        client.batch_execute(&table.create_ddl()).await?;

        debug!("Created table {}", table.name);
        Ok(())
    }

    async fn upsert_row(&self, row: &RowRecord) -> Result<u64> {
        let table = row.table;
        if row.column_values.len() != table.columns.len() {
            return Err(MigrateError::transfer(
                row.qualified_key(),
                format!(
                    "expected {} values, got {}",
                    table.columns.len(),
                    row.column_values.len()
                ),
            ));
        }

        let client = self.client("upserting row").await?;
        let stmt = client.prepare_cached(&build_upsert_sql(table)).await?;

        let params: Vec<Box<dyn ToSql + Sync + Send>> =
            row.column_values.iter().map(|v| v.to_param()).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let affected = client.execute(&stmt, &refs).await?;
        Ok(affected)
    }

    async fn count_rows(&self, table: &'static TableSpec) -> Result<i64> {
        let client = self.client("counting rows").await?;

        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table.name));
        let row = client.query_one(&sql, &[]).await?;

        Ok(row.get(0))
    }
}
