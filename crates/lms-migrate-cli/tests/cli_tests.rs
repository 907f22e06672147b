//! CLI integration tests for lms-migrate.
//!
//! These tests verify command-line argument parsing, help output and exit
//! codes. The file migration test runs against a local HTTP server.

use assert_cmd::Command;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "STORAGE_TOKEN",
    "STORAGE_SECRET",
    "STORAGE_APP_ID",
    "STORAGE_UPLOAD_URL",
    "STORAGE_REGION",
    "SOURCE_DATABASE_URL",
    "TARGET_DATABASE_URL",
    "DATABASE_SSL_MODE",
];

/// Get a command for the lms-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("lms-migrate").unwrap()
}

/// Command with no migration variables set, run from an empty directory so
/// no `.env` file is picked up.
fn isolated_cmd(dir: &Path) -> Command {
    let mut cmd = cmd();
    cmd.current_dir(dir);
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn write_manifest(dir: &Path, count: usize) -> std::path::PathBuf {
    let entries: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"name":"file{i}.png","key":"k{i}","customId":null,"url":"https://old.example.com/{i}","size":10,"uploadedAt":1700000000000}}"#
            )
        })
        .collect();
    let path = dir.join("files.json");
    std::fs::write(&path, format!("[{}]", entries.join(","))).unwrap();
    path
}

/// Serves `/old/a.png`, 404s every other download and accepts uploads at
/// `/upload`. The runtime must outlive the test.
fn spawn_storage_server() -> (tokio::runtime::Runtime, String) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let listener = runtime
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let app = Router::new()
        .route("/old/a.png", get(|| async { "png bytes" }))
        .route("/upload", post(accept_upload))
        .with_state(base.clone());
    runtime.spawn(async move { axum::serve(listener, app).await.unwrap() });

    (runtime, base)
}

async fn accept_upload(
    State(base): State<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let header_value =
        |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
    let authorized = header_value(header::AUTHORIZATION) == Some("Bearer test-token");
    let multipart = header_value(header::CONTENT_TYPE)
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    if !authorized || !multipart {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": {"message": "bad upload request"}})),
        )
            .into_response();
    }

    let body = String::from_utf8_lossy(&body);
    let name = body
        .split("filename=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or("unnamed");
    Json(serde_json::json!({"data": {"url": format!("{}/new/{}", base, name)}})).into_response()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("files"))
        .stdout(predicate::str::contains("rows"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_files_subcommand_help() {
    cmd()
        .args(["files", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--manifest"))
        .stdout(predicate::str::contains("--report"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_rows_subcommand_help() {
    cmd()
        .args(["rows", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--report"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lms-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_batch_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--batch-delay-ms"));
}

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_database_env_lists_variables() {
    let dir = TempDir::new().unwrap();

    isolated_cmd(dir.path())
        .arg("rows")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Missing required configuration"))
        .stderr(predicate::str::contains("SOURCE_DATABASE_URL: unset"))
        .stderr(predicate::str::contains("TARGET_DATABASE_URL: unset"));
}

#[test]
fn test_missing_storage_env_reports_set_and_unset() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(dir.path(), 1);

    isolated_cmd(dir.path())
        .env("SOURCE_DATABASE_URL", "postgres://u:p@localhost/old")
        .args(["files", "--manifest", manifest.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("STORAGE_UPLOAD_URL"))
        .stderr(predicate::str::contains("SOURCE_DATABASE_URL: set"))
        .stderr(predicate::str::contains("STORAGE_TOKEN: unset"));
}

#[test]
fn test_missing_manifest_exits_with_code_1() {
    let dir = TempDir::new().unwrap();

    isolated_cmd(dir.path())
        .env("STORAGE_TOKEN", "token")
        .env("STORAGE_UPLOAD_URL", "https://storage.example.com/upload")
        .args(["files", "--manifest", "nonexistent.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Source unavailable"));
}

#[test]
fn test_missing_config_file_exits_with_code_1() {
    let dir = TempDir::new().unwrap();

    isolated_cmd(dir.path())
        .args(["--config", "nonexistent_config_file.yaml", "validate"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "batch_size: [").unwrap();

    isolated_cmd(dir.path())
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("YAML error"));
}

#[test]
fn test_unknown_table_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "include_tables:").unwrap();
    writeln!(file, "  - Invoice").unwrap();

    isolated_cmd(dir.path())
        .args(["--config", file.path().to_str().unwrap(), "rows"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown table 'Invoice'"));
}

#[test]
fn test_zero_batch_size_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(dir.path(), 3);

    isolated_cmd(dir.path())
        .args(["--batch-size", "0", "files", "--dry-run", "--manifest"])
        .arg(&manifest)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("batch_size must be at least 1"));
}

#[test]
fn test_health_check_without_env_is_unhealthy() {
    let dir = TempDir::new().unwrap();

    isolated_cmd(dir.path())
        .arg("health-check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("UNHEALTHY"))
        .stderr(predicate::str::contains("Configuration error").not());
}

#[test]
fn test_one_missing_file_exits_with_code_1_and_keeps_the_rest() {
    let dir = TempDir::new().unwrap();
    let (_server, base) = spawn_storage_server();
    let manifest = dir.path().join("files.json");
    let entries = serde_json::json!([
        {"name": "a.png", "key": "ka", "customId": null, "url": format!("{}/old/a.png", base),
         "size": 9, "uploadedAt": 1700000000000i64},
        {"name": "b.png", "key": "kb", "customId": null, "url": format!("{}/old/b.png", base),
         "size": 9, "uploadedAt": 1700000000000i64},
    ]);
    std::fs::write(&manifest, entries.to_string()).unwrap();
    let report_path = dir.path().join("report.json");

    isolated_cmd(dir.path())
        .env("STORAGE_TOKEN", "test-token")
        .env("STORAGE_UPLOAD_URL", format!("{}/upload", base))
        .args(["--batch-delay-ms", "0", "files", "--manifest"])
        .arg(&manifest)
        .arg("--report")
        .arg(&report_path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Successful: 1"))
        .stdout(predicate::str::contains("Failed: 1"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["totalFiles"], 2);
    assert_eq!(report["successful"], 1);
    assert_eq!(report["failed"], 1);

    let mapping = report["urlMapping"].as_object().unwrap();
    assert_eq!(mapping.len(), 1);
    assert_eq!(
        mapping[&format!("{}/old/a.png", base)],
        format!("{}/new/a.png", base)
    );

    let failed = &report["results"][1];
    assert_eq!(failed["success"], false);
    assert!(failed["error"].as_str().unwrap().contains("404"));
}

// =============================================================================
// Dry Run Tests
// =============================================================================

#[test]
fn test_files_dry_run_shows_batch_plan() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(dir.path(), 12);

    isolated_cmd(dir.path())
        .args(["--batch-size", "5", "files", "--dry-run", "--manifest"])
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Records: 12"))
        .stdout(predicate::str::contains("Batches: 3"));

    // nothing is written on a dry run
    assert!(!dir.path().join("file-migration-report.json").exists());
}

#[test]
fn test_files_dry_run_json_output() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(dir.path(), 7);

    let output = isolated_cmd(dir.path())
        .args(["--output-json", "--batch-size", "5", "--batch-delay-ms", "500"])
        .args(["files", "--dry-run", "--manifest"])
        .arg(&manifest)
        .output()
        .unwrap();

    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["total_records"], 7);
    assert_eq!(plan["batches"], serde_json::json!([5, 2]));
    assert_eq!(plan["delay_seconds"], 0.5);
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

#[test]
fn test_validate_command_exists() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validate row counts"));
}

#[test]
fn test_files_requires_manifest() {
    cmd()
        .arg("files")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--manifest"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
