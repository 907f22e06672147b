//! lms-migrate CLI - one-off LMS file and database migration.

use clap::{Parser, Subcommand};
use lms_migrate::{
    Config, MigrateError, MigrationConfig, MigrationPlan, MigrationReport, Migrator, ReportKind,
    TableCount,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "lms-migrate")]
#[command(about = "Migrate LMS files and database rows between deployments")]
#[command(version)]
struct Cli {
    /// Path to YAML file with migration settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Records processed concurrently per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long)]
    batch_delay_ms: Option<u64>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-upload every file in a manifest to the new storage account
    Files {
        /// JSON manifest listing the files to migrate
        #[arg(short, long)]
        manifest: PathBuf,

        /// Where to write the report [default: file-migration-report.json]
        #[arg(long)]
        report: Option<PathBuf>,

        /// Dry run: read the manifest and show the batch plan without uploading
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy every table row into the destination database
    Rows {
        /// Where to write the report [default: row-migration-report.json]
        #[arg(long)]
        report: Option<PathBuf>,

        /// Dry run: count source rows and show the batch plan without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate row counts between source and destination
    Validate,

    /// Test database connections and storage credentials
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    // .env is optional
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    let mut migration = match cli.config {
        Some(ref path) => {
            let migration = MigrationConfig::load(path)?;
            info!("Loaded configuration from {:?}", path);
            migration
        }
        None => MigrationConfig::default(),
    };

    // Apply overrides
    if let Some(n) = cli.batch_size {
        migration.batch_size = n;
    }
    if let Some(ms) = cli.batch_delay_ms {
        migration.batch_delay_ms = ms;
    }
    match cli.command {
        Commands::Files {
            report: Some(ref path),
            ..
        } => migration.file_report_path = path.clone(),
        Commands::Rows {
            report: Some(ref path),
            ..
        } => migration.row_report_path = path.clone(),
        _ => {}
    }

    let migrator = Migrator::new(Config::from_env(migration)?);

    match cli.command {
        Commands::Files { manifest, dry_run, .. } => {
            if dry_run {
                let plan = migrator.plan_files(&manifest)?;
                print_plan(&plan, cli.output_json)?;
                return Ok(ExitCode::SUCCESS);
            }

            let report = migrator.migrate_files(&manifest).await?;
            print_report(&report, migrator.config(), cli.output_json)?;
            Ok(report_exit_code(&report))
        }

        Commands::Rows { dry_run, .. } => {
            if dry_run {
                let plan = migrator.plan_rows().await?;
                print_plan(&plan, cli.output_json)?;
                return Ok(ExitCode::SUCCESS);
            }

            let report = migrator.migrate_rows().await?;
            print_report(&report, migrator.config(), cli.output_json)?;
            Ok(report_exit_code(&report))
        }

        Commands::Validate => {
            let counts = migrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("Row count validation:");
                print_counts(&counts);
            }

            if counts.iter().all(|c| c.matches) {
                if !cli.output_json {
                    println!("\nValidation completed successfully");
                }
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }

        Commands::HealthCheck => {
            let result = migrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (PostgreSQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Storage: {}",
                    if result.storage_configured { "OK" } else { "FAILED" }
                );
                if let Some(ref err) = result.storage_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if result.healthy {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
    }
}

fn report_exit_code(report: &MigrationReport) -> ExitCode {
    if report.has_failures() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_report(
    report: &MigrationReport,
    config: &Config,
    output_json: bool,
) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    let (title, path) = match report.kind {
        ReportKind::Files => ("File migration", &config.migration.file_report_path),
        ReportKind::Rows => ("Row migration", &config.migration.row_report_path),
    };

    println!("\n{} completed!", title);
    println!("  Total: {}", report.total);
    println!("  Successful: {}", report.successful);
    println!("  Failed: {}", report.failed);
    println!("  Report: {}", path.display());

    if report.has_failures() {
        println!("\nFailed records:");
        for outcome in report.results.iter().filter(|o| !o.success) {
            println!(
                "  {}: {}",
                outcome.record.source_id(),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if !report.table_counts.is_empty() {
        println!("\nRow counts:");
        print_counts(&report.table_counts);
    }

    Ok(())
}

fn print_counts(counts: &[TableCount]) {
    for count in counts {
        if count.matches {
            println!("  {}: {} rows (match)", count.table, count.source);
        } else {
            println!(
                "  {}: source={} target={} (MISMATCH)",
                count.table, count.source, count.destination
            );
            if let Some(ref err) = count.error {
                println!("    Error: {}", err);
            }
        }
    }
}

fn print_plan(plan: &MigrationPlan, output_json: bool) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    println!("\nDry run completed!");
    for (table, rows) in &plan.tables {
        println!("  {}: {} rows", table, rows);
    }
    println!("  Records: {}", plan.total_records);
    println!("  Batches: {}", plan.batches.len());
    println!("  Delay between batches: {:.1}s total", plan.delay_seconds);
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Invalid verbosity '{}'", other)),
    };

    // Logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Invalid log format '{}'", other)),
    }

    Ok(())
}
