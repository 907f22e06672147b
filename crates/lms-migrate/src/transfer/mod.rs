//! Transfer workers: move one record from source to destination.
//!
//! A worker never returns an error. Every download, upload or database
//! failure is caught at this boundary and turned into a failed
//! [`TransferOutcome`], so one bad record cannot stop a run. Each call makes
//! exactly one destination write attempt; there are no retries.

use crate::error::MigrateError;
use crate::source::{FileRecord, MigrationRecord, RowRecord};
use crate::storage::{mime_for_file, FileFetcher, RemoteFile, StorageClient};
use crate::target::RowSink;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Which record an outcome belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordRef {
    File { name: String, url: String },
    Row { table: String, primary_key: String },
}

impl RecordRef {
    fn of(record: &MigrationRecord) -> Self {
        match record {
            MigrationRecord::File(file) => RecordRef::File {
                name: file.name.clone(),
                url: file.source_url.clone(),
            },
            MigrationRecord::Row(row) => RecordRef::Row {
                table: row.table_name().to_string(),
                primary_key: row.primary_key.clone(),
            },
        }
    }

    /// Source identifier used as the key of the id mapping.
    pub fn source_id(&self) -> String {
        match self {
            RecordRef::File { url, .. } => url.clone(),
            RecordRef::Row { table, primary_key } => format!("{}:{}", table, primary_key),
        }
    }
}

/// Result of migrating one record. Built once by a worker and never changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    pub record: RecordRef,
    pub destination_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl TransferOutcome {
    /// Successful outcome with the record's new identifier.
    pub fn succeeded(record: &MigrationRecord, destination_id: impl Into<String>) -> Self {
        Self {
            record: RecordRef::of(record),
            destination_id: Some(destination_id.into()),
            success: true,
            error: None,
        }
    }

    /// Failed outcome. The error message is never empty.
    pub fn failed(record: &MigrationRecord, error: impl Display) -> Self {
        let mut message = error.to_string();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        Self {
            record: RecordRef::of(record),
            destination_id: None,
            success: false,
            error: Some(message),
        }
    }
}

/// Moves a single record.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Migrate `record` and report what happened.
    async fn transfer(&self, record: &MigrationRecord) -> TransferOutcome;
}

/// Downloads a file from its old URL and uploads it to destination storage.
pub struct FileTransfer {
    fetcher: Arc<dyn FileFetcher>,
    storage: Arc<dyn StorageClient>,
}

impl FileTransfer {
    pub fn new(fetcher: Arc<dyn FileFetcher>, storage: Arc<dyn StorageClient>) -> Self {
        Self { fetcher, storage }
    }

    async fn copy(&self, file: &FileRecord) -> Result<RemoteFile, MigrateError> {
        let bytes = self
            .fetcher
            .fetch(&file.source_url)
            .await
            .map_err(|e| MigrateError::transfer(&file.name, e.to_string()))?;

        let mime = mime_for_file(&file.name);
        debug!("{}: {} bytes, {}", file.name, bytes.len(), mime);

        self.storage
            .upload(bytes, &file.name, mime)
            .await
            .map_err(|e| MigrateError::transfer(&file.name, e.to_string()))
    }
}

#[async_trait]
impl Transfer for FileTransfer {
    async fn transfer(&self, record: &MigrationRecord) -> TransferOutcome {
        let MigrationRecord::File(file) = record else {
            return TransferOutcome::failed(record, "file transfer cannot migrate table rows");
        };

        match self.copy(file).await {
            Ok(remote) => {
                info!("{}: uploaded -> {}", file.name, remote.url);
                TransferOutcome::succeeded(record, remote.url)
            }
            Err(e) => {
                let message = failure_message(e);
                error!("{}: failed - {}", file.name, message);
                TransferOutcome::failed(record, message)
            }
        }
    }
}

/// Upserts a source row into the destination database.
pub struct RowTransfer {
    sink: Arc<dyn RowSink>,
}

impl RowTransfer {
    pub fn new(sink: Arc<dyn RowSink>) -> Self {
        Self { sink }
    }

    async fn copy(&self, row: &RowRecord) -> Result<(), MigrateError> {
        self.sink.upsert_row(row).await?;
        Ok(())
    }
}

#[async_trait]
impl Transfer for RowTransfer {
    async fn transfer(&self, record: &MigrationRecord) -> TransferOutcome {
        let MigrationRecord::Row(row) = record else {
            return TransferOutcome::failed(record, "row transfer cannot migrate files");
        };

        match self.copy(row).await {
            Ok(()) => {
                debug!("{}: upserted", row.qualified_key());
                TransferOutcome::succeeded(record, row.qualified_key())
            }
            Err(e) => {
                let message = failure_message(e);
                error!("{}: failed - {}", row.qualified_key(), message);
                TransferOutcome::failed(record, message)
            }
        }
    }
}

/// Strip the record prefix from per-record errors; the outcome already names it.
fn failure_message(err: MigrateError) -> String {
    match err {
        MigrateError::TransferFailed { message, .. } => message,
        other => other.to_string(),
    }
}
