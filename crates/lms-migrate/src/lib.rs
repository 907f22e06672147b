//! # lms-migrate
//!
//! One-off migration of an LMS deployment between two hosted environments.
//!
//! Two single-pass jobs share one pipeline (source reader, transfer worker,
//! batch coordinator, result aggregator):
//!
//! - **File migration**: re-upload every file in a JSON manifest from its old
//!   public URL to the new storage account, recording an old-URL to new-URL
//!   mapping.
//! - **Row migration**: upsert every row of the LMS tables from the source
//!   PostgreSQL database into the destination, in foreign-key order, keeping
//!   primary keys and timestamps, then compare row counts per table.
//!
//! Records are processed in fixed-size batches with a delay between batches.
//! A failed record ends up in the report and never stops the run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use lms_migrate::{Config, MigrationConfig, Migrator};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> lms_migrate::Result<()> {
//!     let config = Config::from_env(MigrationConfig::default())?;
//!     let migrator = Migrator::new(config);
//!     let report = migrator.migrate_files(Path::new("files.json")).await?;
//!     println!("{} of {} files migrated", report.successful, report.total);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod schema;
pub mod source;
pub mod storage;
pub mod target;
pub mod transfer;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, MigrationConfig, Requirement, StorageConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{BatchCoordinator, HealthCheckResult, MigrationPlan, Migrator};
pub use report::{MigrationReport, ReportKind, ResultAggregator, TableCount};
pub use schema::{ColumnKind, ColumnSpec, TableSpec, LMS_TABLES};
pub use source::{read_manifest, FileRecord, MigrationRecord, PgSourcePool, RowRecord, RowSource};
pub use storage::{FileFetcher, HttpFetcher, HttpStorageClient, RemoteFile, StorageClient};
pub use target::{PgPool, RowSink, SqlValue};
pub use transfer::{FileTransfer, RowTransfer, Transfer, TransferOutcome};
