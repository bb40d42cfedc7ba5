//! Integration tests for the diagnosis-store CLI
//!
//! These run the built binary against temporary databases.

use diagnosis_store::{Database, ResponseInput, CSV_HEADER};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_diagnosis-store"))
        .args(args)
        .output()
        .expect("Failed to execute diagnosis-store")
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn seed(db_path: &Path) {
    let db = Database::open_at(db_path).expect("open db");
    db.submit_responses(
        "u1",
        "s1",
        &[
            ResponseInput::new("A"),
            ResponseInput::new("B").with_recommendation("see doc"),
        ],
    )
    .expect("seed");
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("diagnosis-store"));
    assert!(out.contains("serve"));
    assert!(out.contains("export"));
}

#[test]
fn test_version_command() {
    let output = run(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("diagnosis-store"));
}

#[test]
fn test_completion_zsh() {
    let output = run(&["completion", "zsh"]);
    assert!(
        output.status.success(),
        "completion zsh failed: {}",
        stderr(&output)
    );
    assert!(stdout(&output).contains("#compdef diagnosis-store"));
}

#[test]
fn test_completion_bash() {
    let output = run(&["completion", "bash"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("complete"));
    assert!(out.contains("diagnosis-store"));
}

// =============================================================================
// Export Tests
// =============================================================================

#[test]
fn test_export_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("diagnosis.db");
    seed(&db_path);

    let output = run(&["export", "--db", db_path.to_str().unwrap()]);
    assert!(output.status.success(), "export failed: {}", stderr(&output));

    let out = stdout(&output);
    let lines: Vec<&str> = out.split('\n').collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], CSV_HEADER);
    assert!(lines[1].starts_with("u1,s1,0,\"A\",\"null\","));
    assert!(lines[2].starts_with("u1,s1,1,\"B\",\"see doc\","));
}

#[test]
fn test_export_to_file() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("diagnosis.db");
    let csv_path = temp_dir.path().join("out.csv");
    seed(&db_path);

    let output = run(&[
        "export",
        "--db",
        db_path.to_str().unwrap(),
        "--output",
        csv_path.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "export failed: {}", stderr(&output));
    assert!(stderr(&output).contains("2 record(s)"));

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv.starts_with(CSV_HEADER));
    assert_eq!(csv.lines().count(), 3);
}

#[test]
fn test_export_empty_database_is_header_only() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("empty.db");

    let output = run(&["export", "--db", db_path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), format!("{}\n", CSV_HEADER));
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    let output = run(&["--config", "/definitely/not/here.toml", "export"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("cannot read config"));
}

#[test]
fn test_config_file_supplies_database_path() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("configured.db");
    seed(&db_path);

    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!("[database]\npath = {:?}\n", db_path.to_str().unwrap()),
    )
    .unwrap();

    let output = run(&["--config", config_path.to_str().unwrap(), "export"]);
    assert!(output.status.success(), "export failed: {}", stderr(&output));
    assert_eq!(stdout(&output).split('\n').count(), 3);
}
