//! Result aggregation and the persisted migration report.

use crate::error::{MigrateError, Result};
use crate::transfer::{RecordRef, TransferOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Which job produced a report. Selects the JSON layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Files,
    Rows,
}

/// Source and destination row counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub source: i64,
    pub destination: i64,
    pub matches: bool,
    /// Why the source side could not be counted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableCount {
    pub fn new(table: impl Into<String>, source: i64, destination: i64) -> Self {
        Self {
            table: table.into(),
            source,
            destination,
            matches: source == destination,
            error: None,
        }
    }

    /// A table whose source count failed. Always a mismatch.
    pub fn uncounted(
        table: impl Into<String>,
        destination: i64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            source: 0,
            destination,
            matches: false,
            error: Some(error.into()),
        }
    }
}

/// Collects outcomes in batch order and keeps running counters.
#[derive(Debug)]
pub struct ResultAggregator {
    kind: ReportKind,
    expected: usize,
    outcomes: Vec<TransferOutcome>,
    successful: usize,
    failed: usize,
}

impl ResultAggregator {
    /// `expected` is the number of records the run will produce outcomes for.
    pub fn new(kind: ReportKind, expected: usize) -> Self {
        Self {
            kind,
            expected,
            outcomes: Vec::with_capacity(expected),
            successful: 0,
            failed: 0,
        }
    }

    pub fn record(&mut self, outcome: TransferOutcome) {
        if outcome.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Outcomes recorded so far.
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcomes(&self) -> &[TransferOutcome] {
        &self.outcomes
    }

    /// Log running totals after a batch finishes.
    pub fn log_progress(&self, batch: usize, batches: usize) {
        info!(
            "Batch {}/{} complete: {}/{} processed ({} succeeded, {} failed)",
            batch, batches, self.processed(), self.expected, self.successful, self.failed
        );
    }

    /// Freeze the aggregated outcomes into a report.
    pub fn into_report(self, table_counts: Vec<TableCount>) -> MigrationReport {
        let id_mapping = self
            .outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| {
                o.destination_id
                    .as_ref()
                    .map(|dest| (o.record.source_id(), dest.clone()))
            })
            .collect();

        MigrationReport {
            kind: self.kind,
            migrated_at: Utc::now(),
            total: self.outcomes.len(),
            successful: self.successful,
            failed: self.failed,
            results: self.outcomes,
            id_mapping,
            table_counts,
        }
    }
}

/// Final summary of one migration run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub kind: ReportKind,
    pub migrated_at: DateTime<Utc>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<TransferOutcome>,
    /// Old identifier to new identifier, successful outcomes only.
    pub id_mapping: BTreeMap<String, String>,
    /// Per-table count comparison. Empty for file runs.
    pub table_counts: Vec<TableCount>,
}

impl MigrationReport {
    /// True if any record failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Tables whose source and destination counts differ.
    pub fn mismatched_tables(&self) -> Vec<&TableCount> {
        self.table_counts.iter().filter(|c| !c.matches).collect()
    }

    /// Render the report in the layout for its kind.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self.kind {
            ReportKind::Files => serde_json::to_value(FileReportView::from(self))?,
            ReportKind::Rows => serde_json::to_value(RowReportView::from(self))?,
        };
        Ok(value)
    }

    /// Convert to JSON string, keeping the field order of the layout.
    pub fn to_json(&self) -> Result<String> {
        let json = match self.kind {
            ReportKind::Files => serde_json::to_string_pretty(&FileReportView::from(self))?,
            ReportKind::Rows => serde_json::to_string_pretty(&RowReportView::from(self))?,
        };
        Ok(json)
    }

    /// Write the report to a file (atomic write).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = self
            .to_json()
            .map_err(|e| MigrateError::Config(format!("Failed to serialize report: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        info!("Report written to {}", path.display());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileReportView<'a> {
    migrated_at: DateTime<Utc>,
    total_files: usize,
    successful: usize,
    failed: usize,
    results: Vec<FileResultView<'a>>,
    url_mapping: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileResultView<'a> {
    old_url: String,
    new_url: Option<&'a str>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> From<&'a MigrationReport> for FileReportView<'a> {
    fn from(report: &'a MigrationReport) -> Self {
        Self {
            migrated_at: report.migrated_at,
            total_files: report.total,
            successful: report.successful,
            failed: report.failed,
            results: report
                .results
                .iter()
                .map(|o| FileResultView {
                    old_url: o.record.source_id(),
                    new_url: o.destination_id.as_deref(),
                    success: o.success,
                    error: o.error.as_deref(),
                })
                .collect(),
            url_mapping: &report.id_mapping,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RowReportView<'a> {
    migrated_at: DateTime<Utc>,
    total_rows: usize,
    successful: usize,
    failed: usize,
    results: Vec<RowResultView<'a>>,
    id_mapping: &'a BTreeMap<String, String>,
    table_counts: &'a [TableCount],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RowResultView<'a> {
    table: &'a str,
    primary_key: &'a str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> From<&'a MigrationReport> for RowReportView<'a> {
    fn from(report: &'a MigrationReport) -> Self {
        Self {
            migrated_at: report.migrated_at,
            total_rows: report.total,
            successful: report.successful,
            failed: report.failed,
            results: report
                .results
                .iter()
                .map(|o| {
                    let (table, primary_key) = match &o.record {
                        RecordRef::Row { table, primary_key } => {
                            (table.as_str(), primary_key.as_str())
                        }
                        RecordRef::File { name, url } => (name.as_str(), url.as_str()),
                    };
                    RowResultView {
                        table,
                        primary_key,
                        success: o.success,
                        error: o.error.as_deref(),
                    }
                })
                .collect(),
            id_mapping: &report.id_mapping,
            table_counts: &report.table_counts,
        }
    }
}
