//! Migration orchestrator - main workflow coordinator.
//!
//! The `migrate_*`, `validate` and `health_check` entry points build the
//! real HTTP and PostgreSQL capabilities from [`Config`]. The `run_*`
//! functions take those capabilities as trait objects so they can be driven
//! with in-memory fakes.

mod batch;

pub use batch::BatchCoordinator;

use crate::config::{Config, Requirement};
use crate::error::{MigrateError, Result};
use crate::report::{MigrationReport, ReportKind, ResultAggregator, TableCount};
use crate::schema::TableSpec;
use crate::source::{read_manifest, MigrationRecord, PgSourcePool, RowSource};
use crate::storage::{FileFetcher, HttpFetcher, HttpStorageClient, StorageClient};
use crate::target::{PgPool, RowSink};
use crate::transfer::{FileTransfer, RowTransfer};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Migration orchestrator.
pub struct Migrator {
    config: Config,
}

/// What a run would do, produced by a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub kind: ReportKind,
    /// Records that would be migrated.
    pub total_records: usize,
    /// Batch sizes in execution order.
    pub batches: Vec<usize>,
    /// Rows per table, in migration order. Empty for file runs.
    pub tables: Vec<(String, i64)>,
    /// Time spent in inter-batch delays alone.
    pub delay_seconds: f64,
}

impl MigrationPlan {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Result of checking every external dependency.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub storage_configured: bool,
    pub storage_error: Option<String>,
}

impl Migrator {
    /// Create a new orchestrator.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn coordinator(&self) -> BatchCoordinator {
        BatchCoordinator::new(
            self.config.migration.batch_size,
            Duration::from_millis(self.config.migration.batch_delay_ms),
        )
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.migration.request_timeout_secs)
    }

    async fn connect_databases(&self) -> Result<(PgSourcePool, Arc<PgPool>)> {
        self.config
            .require(&[Requirement::SourceDatabase, Requirement::TargetDatabase])?;
        let max = self.config.migration.max_connections;
        let source = PgSourcePool::new(self.config.source_database()?, max).await?;
        let target = PgPool::new(self.config.target_database()?, max).await?;
        Ok((source, Arc::new(target)))
    }

    /// Re-upload every file listed in the manifest.
    pub async fn migrate_files(&self, manifest: &Path) -> Result<MigrationReport> {
        self.config.require(&[Requirement::Storage])?;
        let records = read_manifest(manifest)?;

        let timeout = self.request_timeout();
        let fetcher = Arc::new(HttpFetcher::new(timeout)?);
        let storage = Arc::new(HttpStorageClient::new(self.config.storage()?, timeout)?);

        self.run_files(records, fetcher, storage).await
    }

    /// Read the manifest and compute the batch plan without uploading.
    pub fn plan_files(&self, manifest: &Path) -> Result<MigrationPlan> {
        let records = read_manifest(manifest)?;
        let coordinator = self.coordinator();
        let batches = coordinator.plan(&records);
        let plan = self.plan(ReportKind::Files, batches, Vec::new());
        info!(
            "Dry run: {} files in {} batches of up to {}",
            plan.total_records,
            plan.batches.len(),
            coordinator.batch_size()
        );
        Ok(plan)
    }

    /// Copy every row of the selected tables into the destination database.
    pub async fn migrate_rows(&self) -> Result<MigrationReport> {
        let (source, target) = self.connect_databases().await?;
        self.run_rows(&source, target).await
    }

    /// Count source rows and compute the batch plan without writing.
    pub async fn plan_rows(&self) -> Result<MigrationPlan> {
        self.config.require(&[Requirement::SourceDatabase])?;
        let source = PgSourcePool::new(
            self.config.source_database()?,
            self.config.migration.max_connections,
        )
        .await?;
        self.plan_rows_from(&source).await
    }

    /// Compare source and destination row counts for the selected tables.
    pub async fn validate(&self) -> Result<Vec<TableCount>> {
        let (source, target) = self.connect_databases().await?;
        Ok(self.verify_counts(&source, target.as_ref()).await)
    }

    /// Test both database connections and resolve storage credentials.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let max = 1;

        let start = Instant::now();
        let source = match self.config.source_database() {
            Ok(db) => PgSourcePool::new(db, max).await.map(|_| ()),
            Err(e) => Err(e),
        };
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = match self.config.target_database() {
            Ok(db) => PgPool::new(db, max).await.map(|_| ()),
            Err(e) => Err(e),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let storage = self.config.storage().map(|_| ());

        let result = HealthCheckResult {
            healthy: source.is_ok() && target.is_ok() && storage.is_ok(),
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            storage_configured: storage.is_ok(),
            storage_error: storage.err().map(|e| e.to_string()),
        };

        if result.healthy {
            info!("Health check passed");
        } else {
            warn!("Health check failed");
        }
        Ok(result)
    }

    /// Migrate file records with the given capabilities and save the report.
    pub async fn run_files(
        &self,
        records: Vec<MigrationRecord>,
        fetcher: Arc<dyn FileFetcher>,
        storage: Arc<dyn StorageClient>,
    ) -> Result<MigrationReport> {
        info!("Starting file migration: {} files", records.len());

        let worker = FileTransfer::new(fetcher, storage);
        let mut results = ResultAggregator::new(ReportKind::Files, records.len());
        self.coordinator().run(&records, &worker, &mut results).await;

        let report = results.into_report(Vec::new());
        self.finish(&report, &self.config.migration.file_report_path)?;
        Ok(report)
    }

    /// Migrate rows with the given capabilities, verify counts and save the report.
    ///
    /// Every selected table is read before the first write, so an unreadable
    /// source fails the run without touching the destination.
    pub async fn run_rows(
        &self,
        source: &dyn RowSource,
        sink: Arc<dyn RowSink>,
    ) -> Result<MigrationReport> {
        let tables = self.config.migration.selected_tables();
        info!("Starting row migration: {} tables", tables.len());

        let mut work: Vec<(&'static TableSpec, Vec<MigrationRecord>)> =
            Vec::with_capacity(tables.len());
        for table in &tables {
            let rows = source.read_rows(*table).await?;
            info!("{}: {} rows to migrate", table.name, rows.len());
            work.push((*table, rows.into_iter().map(MigrationRecord::Row).collect()));
        }

        self.ensure_schema(sink.as_ref(), &tables).await?;

        let total: usize = work.iter().map(|(_, rows)| rows.len()).sum();
        let worker = RowTransfer::new(sink.clone());
        let mut coordinator = self.coordinator();
        let mut results = ResultAggregator::new(ReportKind::Rows, total);

        // Tables run one after another to keep foreign-key order.
        for (table, records) in &work {
            if records.is_empty() {
                continue;
            }
            info!("Migrating {}", table.name);
            coordinator.run(records, &worker, &mut results).await;
        }

        let counts = self.verify_counts(source, sink.as_ref()).await;
        let report = results.into_report(counts);
        self.finish(&report, &self.config.migration.row_report_path)?;
        Ok(report)
    }

    /// Batch plan for the selected tables of `source`.
    pub async fn plan_rows_from(&self, source: &dyn RowSource) -> Result<MigrationPlan> {
        let coordinator = self.coordinator();
        let size = coordinator.batch_size();

        let mut tables = Vec::new();
        let mut batches = Vec::new();
        for table in self.config.migration.selected_tables() {
            let count = source.count_rows(table).await?;
            let mut remaining = count.max(0) as usize;
            while remaining > 0 {
                let n = remaining.min(size);
                batches.push(n);
                remaining -= n;
            }
            tables.push((table.name.to_string(), count));
        }

        let plan = self.plan(ReportKind::Rows, batches, tables);
        for (table, count) in &plan.tables {
            info!("Dry run: {} ({} rows)", table, count);
        }
        info!(
            "Dry run: {} rows in {} batches of up to {}",
            plan.total_records,
            plan.batches.len(),
            size
        );
        Ok(plan)
    }

    fn plan(
        &self,
        kind: ReportKind,
        batches: Vec<usize>,
        tables: Vec<(String, i64)>,
    ) -> MigrationPlan {
        let delays = batches.len().saturating_sub(1) as f64;
        MigrationPlan {
            kind,
            total_records: batches.iter().sum(),
            batches,
            tables,
            delay_seconds: delays * self.config.migration.batch_delay_ms as f64 / 1000.0,
        }
    }

    /// Make sure every table exists in the destination.
    ///
    /// Missing tables get one creation attempt, then the check runs again.
    /// Existing tables are never altered.
    pub async fn ensure_schema(
        &self,
        sink: &dyn RowSink,
        tables: &[&'static TableSpec],
    ) -> Result<()> {
        let missing = missing_tables(sink, tables).await?;
        if missing.is_empty() {
            return Ok(());
        }

        let names: Vec<String> = missing.iter().map(|t| t.name.to_string()).collect();
        if !self.config.migration.create_missing_tables {
            return Err(MigrateError::SchemaMissing { tables: names });
        }

        warn!(
            "Destination is missing {} table(s), creating: {}",
            names.len(),
            names.join(", ")
        );
        for table in &missing {
            if let Err(e) = sink.create_table(*table).await {
                warn!("Failed to create {}: {}", table.name, e);
            }
        }

        let still_missing = missing_tables(sink, tables).await?;
        if !still_missing.is_empty() {
            return Err(MigrateError::SchemaMissing {
                tables: still_missing.iter().map(|t| t.name.to_string()).collect(),
            });
        }

        info!("Created {} missing table(s)", missing.len());
        Ok(())
    }

    /// Re-count source and destination rows per table.
    ///
    /// Mismatches are logged and returned, never fixed. A table whose source
    /// count fails is recorded as a mismatch.
    pub async fn verify_counts(
        &self,
        source: &dyn RowSource,
        sink: &dyn RowSink,
    ) -> Vec<TableCount> {
        let mut counts = Vec::new();

        for table in self.config.migration.selected_tables() {
            let target_count = match sink.count_rows(table).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("{}: cannot count destination rows: {}", table.name, e);
                    0
                }
            };

            let count = match source.count_rows(table).await {
                Ok(source_count) => TableCount::new(table.name, source_count, target_count),
                Err(e) => {
                    warn!("{}: cannot count source rows: {}", table.name, e);
                    TableCount::uncounted(table.name, target_count, e.to_string())
                }
            };

            if count.matches {
                info!("{}: {} rows (match)", table.name, count.source);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table.name, count.source, count.destination
                );
            }
            counts.push(count);
        }

        counts
    }

    /// Persist the report. If the file cannot be written, the report goes to
    /// stderr before the error is returned.
    fn finish(&self, report: &MigrationReport, path: &Path) -> Result<()> {
        info!(
            "Migration finished: {} total, {} successful, {} failed",
            report.total, report.successful, report.failed
        );
        if let Err(e) = report.save(path) {
            error!("Cannot write report to {}: {}", path.display(), e);
            match report.to_json() {
                Ok(json) => eprintln!("{}", json),
                Err(json_err) => error!("Cannot serialize report: {}", json_err),
            }
            return Err(e);
        }
        Ok(())
    }
}

async fn missing_tables(
    sink: &dyn RowSink,
    tables: &[&'static TableSpec],
) -> Result<Vec<&'static TableSpec>> {
    let mut missing = Vec::new();
    for table in tables {
        if !sink.table_exists(*table).await? {
            missing.push(*table);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationConfig;
    use crate::schema::find_table;
    use crate::source::RowRecord;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn config(migration: MigrationConfig) -> Config {
        Config::from_lookup(|_| None, migration).unwrap()
    }

    fn only(tables: &[&str]) -> MigrationConfig {
        MigrationConfig {
            include_tables: tables.iter().map(|t| t.to_string()).collect(),
            batch_delay_ms: 0,
            ..MigrationConfig::default()
        }
    }

    struct Tables {
        existing: Mutex<HashSet<&'static str>>,
        creatable: bool,
        create_calls: Mutex<Vec<&'static str>>,
    }

    impl Tables {
        fn new(existing: &[&'static str], creatable: bool) -> Self {
            Self {
                existing: Mutex::new(existing.iter().copied().collect()),
                creatable,
                create_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RowSink for Tables {
        async fn table_exists(&self, table: &'static TableSpec) -> Result<bool> {
            Ok(self.existing.lock().unwrap().contains(table.name))
        }
        async fn create_table(&self, table: &'static TableSpec) -> Result<()> {
            self.create_calls.lock().unwrap().push(table.name);
            if self.creatable {
                self.existing.lock().unwrap().insert(table.name);
            }
            Ok(())
        }
        async fn upsert_row(&self, _row: &RowRecord) -> Result<u64> {
            Ok(1)
        }
        async fn count_rows(&self, _table: &'static TableSpec) -> Result<i64> {
            Ok(0)
        }
    }

    fn specs(names: &[&str]) -> Vec<&'static TableSpec> {
        names.iter().map(|n| find_table(n).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_ensure_schema_creates_missing_once() {
        let migrator = Migrator::new(config(only(&["Course", "Chapter"])));
        let sink = Tables::new(&["Course"], true);

        migrator
            .ensure_schema(&sink, &specs(&["Course", "Chapter"]))
            .await
            .unwrap();

        assert_eq!(sink.create_calls.lock().unwrap().as_slice(), &["Chapter"]);
    }

    #[tokio::test]
    async fn test_ensure_schema_fails_when_still_missing() {
        let migrator = Migrator::new(config(only(&["Quiz"])));
        let sink = Tables::new(&[], false);

        let err = migrator
            .ensure_schema(&sink, &specs(&["Quiz"]))
            .await
            .unwrap_err();

        match err {
            MigrateError::SchemaMissing { tables } => assert_eq!(tables, vec!["Quiz"]),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(sink.create_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_schema_respects_disabled_remediation() {
        let migration = MigrationConfig {
            create_missing_tables: false,
            ..only(&["Quiz"])
        };
        let migrator = Migrator::new(config(migration));
        let sink = Tables::new(&[], true);

        let result = migrator.ensure_schema(&sink, &specs(&["Quiz"])).await;

        assert!(matches!(result, Err(MigrateError::SchemaMissing { .. })));
        assert!(sink.create_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_plan_delay() {
        let migration = MigrationConfig {
            batch_delay_ms: 2000,
            ..MigrationConfig::default()
        };
        let migrator = Migrator::new(config(migration));
        let plan = migrator.plan(ReportKind::Files, vec![5, 5, 2], Vec::new());
        assert_eq!(plan.total_records, 12);
        assert_eq!(plan.delay_seconds, 4.0);
    }
}
