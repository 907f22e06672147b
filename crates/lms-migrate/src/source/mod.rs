//! Source side of a migration: the records to move and where they come from.
//!
//! Files are enumerated from a JSON manifest; rows are read table by table
//! from the old database through the [`RowSource`] trait.

mod manifest;
mod postgres;

pub use manifest::read_manifest;
pub use postgres::PgSourcePool;

use crate::error::Result;
use crate::schema::TableSpec;
use crate::target::SqlValue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationRecord {
    File(FileRecord),
    Row(RowRecord),
}

impl MigrationRecord {
    /// Identifier of the record at the source: the old URL for files,
    /// `Table:primaryKey` for rows.
    pub fn source_id(&self) -> String {
        match self {
            MigrationRecord::File(file) => file.source_url.clone(),
            MigrationRecord::Row(row) => row.qualified_key(),
        }
    }

    /// Short name used in log lines.
    pub fn label(&self) -> String {
        match self {
            MigrationRecord::File(file) => file.name.clone(),
            MigrationRecord::Row(row) => row.qualified_key(),
        }
    }
}

/// A file listed in the migration manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub name: String,
    pub source_key: String,
    pub custom_id: Option<String>,
    pub source_url: String,
    pub size_bytes: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// A row read from a source table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    /// Table the row belongs to.
    pub table: &'static TableSpec,
    /// Primary key value, rendered as text.
    pub primary_key: String,
    /// Column values in `table.columns` order.
    pub column_values: Vec<SqlValue>,
}

impl RowRecord {
    /// Build a row record, extracting the primary key from the values.
    pub fn new(table: &'static TableSpec, column_values: Vec<SqlValue>) -> Option<Self> {
        let primary_key = table
            .pk_index()
            .and_then(|idx| column_values.get(idx))
            .and_then(SqlValue::key_string)?;

        Some(Self {
            table,
            primary_key,
            column_values,
        })
    }

    /// Name of the table the row belongs to.
    pub fn table_name(&self) -> &'static str {
        self.table.name
    }

    /// `Table:primaryKey`.
    pub fn qualified_key(&self) -> String {
        format!("{}:{}", self.table.name, self.primary_key)
    }

    /// Value of a named column.
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.table
            .columns
            .iter()
            .position(|c| c.name == column)
            .and_then(|idx| self.column_values.get(idx))
    }
}

/// Read access to the source database.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Number of rows in a table.
    async fn count_rows(&self, table: &'static TableSpec) -> Result<i64>;

    /// Every row of a table, ordered by primary key.
    async fn read_rows(&self, table: &'static TableSpec) -> Result<Vec<RowRecord>>;
}
