//! PostgreSQL source database operations.

use super::{RowRecord, RowSource};
use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};
use crate::schema::{quote_ident, ColumnKind, TableSpec};
use crate::target::{build_pool, SqlValue};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
use tracing::{debug, info};

/// PostgreSQL source pool implementation.
pub struct PgSourcePool {
    pool: Pool,
}

impl PgSourcePool {
    /// Create a source pool and test the connection.
    pub async fn new(config: &DatabaseConfig, max_conns: usize) -> Result<Self> {
        let pool = build_pool(config, max_conns, "source")?;
        let this = Self { pool };
        this.ping().await?;
        info!("Connected to source PostgreSQL database");
        Ok(this)
    }

    /// Run a trivial query to check connectivity.
    pub async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await.map_err(|e| {
            MigrateError::source_unavailable(format!("source database is not reachable: {}", e))
        })?;
        Ok(())
    }

    async fn client(&self) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            MigrateError::source_unavailable(format!("cannot connect to source database: {}", e))
        })
    }
}

#[async_trait]
impl RowSource for PgSourcePool {
    async fn count_rows(&self, table: &'static TableSpec) -> Result<i64> {
        let client = self.client().await?;

        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table.name));
        let row = client.query_one(&sql, &[]).await.map_err(|e| {
            MigrateError::source_unavailable(format!("cannot count {}: {}", table.name, e))
        })?;

        Ok(row.get(0))
    }

    async fn read_rows(&self, table: &'static TableSpec) -> Result<Vec<RowRecord>> {
        let client = self.client().await?;

        let col_list = table
            .columns
            .iter()
            .map(|c| quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            col_list,
            quote_ident(table.name),
            quote_ident(table.primary_key)
        );

        let rows = client.query(&sql, &[]).await.map_err(|e| {
            MigrateError::source_unavailable(format!("cannot read {}: {}", table.name, e))
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = row_values(row, table).map_err(|e| {
                MigrateError::source_unavailable(format!("cannot decode {} row: {}", table.name, e))
            })?;
            let record = RowRecord::new(table, values).ok_or_else(|| {
                MigrateError::source_unavailable(format!(
                    "{} row has a NULL primary key",
                    table.name
                ))
            })?;
            records.push(record);
        }

        debug!("Read {} rows from {}", records.len(), table.name);
        Ok(records)
    }
}

/// Decode one row using the column kinds declared for the table.
fn row_values(
    row: &Row,
    table: &TableSpec,
) -> std::result::Result<Vec<SqlValue>, tokio_postgres::Error> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let value = match col.kind {
                ColumnKind::Text => row.try_get::<_, Option<String>>(i)?.map(SqlValue::Text),
                ColumnKind::Integer => row.try_get::<_, Option<i32>>(i)?.map(SqlValue::Integer),
                ColumnKind::Float => row.try_get::<_, Option<f64>>(i)?.map(SqlValue::Float),
                ColumnKind::Boolean => row.try_get::<_, Option<bool>>(i)?.map(SqlValue::Boolean),
                ColumnKind::Timestamp => row
                    .try_get::<_, Option<NaiveDateTime>>(i)?
                    .map(SqlValue::Timestamp),
            };
            Ok(value.unwrap_or(SqlValue::Null(col.kind)))
        })
        .collect()
}
