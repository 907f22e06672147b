//! JSON manifest of files to migrate.

use super::{FileRecord, MigrationRecord};
use crate::error::{MigrateError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    name: String,
    key: String,
    #[serde(default)]
    custom_id: Option<String>,
    url: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    uploaded_at: Option<UploadedAt>,
}

/// `uploadedAt` is either epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadedAt {
    Millis(i64),
    Text(String),
}

impl UploadedAt {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            UploadedAt::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            UploadedAt::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Read the manifest at `path` into file records, preserving order.
pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<MigrationRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::source_unavailable(format!("cannot read manifest {:?}: {}", path, e))
    })?;

    let records = parse_manifest(&content)
        .map_err(|e| MigrateError::source_unavailable(format!("invalid manifest {:?}: {}", path, e)))?;

    info!("Loaded {} files from manifest {:?}", records.len(), path);
    Ok(records)
}

fn parse_manifest(content: &str) -> std::result::Result<Vec<MigrationRecord>, serde_json::Error> {
    let entries: Vec<ManifestEntry> = serde_json::from_str(content)?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            MigrationRecord::File(FileRecord {
                uploaded_at: entry.uploaded_at.as_ref().and_then(UploadedAt::to_datetime),
                name: entry.name,
                source_key: entry.key,
                custom_id: entry.custom_id,
                source_url: entry.url,
                size_bytes: entry.size,
            })
        })
        .collect())
}
