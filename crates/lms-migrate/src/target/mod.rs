//! PostgreSQL target database operations.

mod pool;
mod postgres;

pub use pool::{build_pool, SslMode};
pub use postgres::PgPool;

use crate::error::Result;
use crate::schema::{quote_ident, ColumnKind, TableSpec};
use crate::source::RowRecord;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio_postgres::types::ToSql;

/// Trait for destination database operations.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Check if a table exists.
    async fn table_exists(&self, table: &'static TableSpec) -> Result<bool>;

    /// Create a table if it does not exist yet.
    async fn create_table(&self, table: &'static TableSpec) -> Result<()>;

    /// Insert the row, or update it in place when its primary key exists.
    async fn upsert_row(&self, row: &RowRecord) -> Result<u64>;

    /// Get the row count for a table.
    async fn count_rows(&self, table: &'static TableSpec) -> Result<i64>;
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL, tagged with the column kind so it binds with the right type.
    Null(ColumnKind),
    Text(String),
    Integer(i32),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Textual form for use as a record key. `None` for NULL.
    pub fn key_string(&self) -> Option<String> {
        match self {
            SqlValue::Null(_) => None,
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Integer(n) => Some(n.to_string()),
            SqlValue::Float(n) => Some(n.to_string()),
            SqlValue::Boolean(b) => Some(b.to_string()),
            SqlValue::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
        }
    }

    /// Convert to a boxed parameter for tokio-postgres.
    pub fn to_param(&self) -> Box<dyn ToSql + Sync + Send> {
        match self {
            SqlValue::Null(kind) => match kind {
                ColumnKind::Text => Box::new(None::<String>),
                ColumnKind::Integer => Box::new(None::<i32>),
                ColumnKind::Float => Box::new(None::<f64>),
                ColumnKind::Boolean => Box::new(None::<bool>),
                ColumnKind::Timestamp => Box::new(None::<NaiveDateTime>),
            },
            SqlValue::Text(s) => Box::new(s.clone()),
            SqlValue::Integer(n) => Box::new(*n),
            SqlValue::Float(n) => Box::new(*n),
            SqlValue::Boolean(b) => Box::new(*b),
            SqlValue::Timestamp(ts) => Box::new(*ts),
        }
    }
}

/// Build the parameterized upsert statement for a table.
///
/// Every column is written verbatim, including the primary key and the
/// timestamp columns. Unchanged rows are left alone by the change-detection
/// `WHERE` clause.
pub fn build_upsert_sql(table: &TableSpec) -> String {
    let table_name = quote_ident(table.name);
    let pk = quote_ident(table.primary_key);

    let col_list: String = table
        .columns
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let placeholders: String = (1..=table.columns.len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");

    let non_pk: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.name != table.primary_key)
        .map(|c| quote_ident(c.name))
        .collect();

    if non_pk.is_empty() {
        // PK-only table, just INSERT ... ON CONFLICT DO NOTHING
        return format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
            table_name, col_list, placeholders, pk
        );
    }

    let update_cols: Vec<String> = non_pk
        .iter()
        .map(|c| format!("{} = EXCLUDED.{}", c, c))
        .collect();

    let change_detection: Vec<String> = non_pk
        .iter()
        .map(|c| format!("{}.{} IS DISTINCT FROM EXCLUDED.{}", table_name, c, c))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {} WHERE {}",
        table_name,
        col_list,
        placeholders,
        pk,
        update_cols.join(", "),
        change_detection.join(" OR ")
    )
}
