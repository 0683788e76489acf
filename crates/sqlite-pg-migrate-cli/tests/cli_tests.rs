//! CLI integration tests for sqlite-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that occur before any database
//! server is contacted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the sqlite-pg-migrate binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("sqlite-pg-migrate").unwrap();
    cmd.env_remove("SQLITE_PG_MIGRATE_SOURCE")
        .env_remove("SQLITE_PG_MIGRATE_TARGET_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

/// Write a config whose source file does not exist.
fn config_file(extra: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
source:
  path: /nonexistent/marketplace.db
target:
  host: localhost
  database: marketplace
  user: postgres
  ssl_mode: disable
{}"#,
        extra
    )
    .unwrap();
    file
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
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--table"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlite-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--source"))
        .stdout(predicate::str::contains("SQLITE_PG_MIGRATE_SOURCE"))
        .stdout(predicate::str::contains("--target-password"));
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
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_1() {
    // Missing file is an IO error
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  path: ./marketplace.db").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_unknown_lookup_exits_with_code_2() {
    let file = config_file(
        r#"
tables:
  cart_items:
    columns:
      user_id: { compute: lookup, inputs: [cart_id], lookup: nope }
"#,
    );

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown lookup 'nope'"));
}

#[test]
fn test_unreadable_source_exits_with_code_3() {
    let file = config_file("");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Cannot connect to source store"));
}

#[test]
fn test_source_override_from_env() {
    let file = config_file("");

    cmd()
        .env("SQLITE_PG_MIGRATE_SOURCE", "/elsewhere/app.db")
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("/elsewhere/app.db"));
}

#[test]
fn test_verbosity_controls_log_output() {
    let file = config_file("");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Loaded configuration"));
}

#[test]
fn test_rust_log_overrides_verbosity() {
    let file = config_file("");

    cmd()
        .env("RUST_LOG", "error")
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Loaded configuration").not());
}

// =============================================================================
// Subcommand Tests
// =============================================================================

#[test]
fn test_plan_command_exists() {
    cmd()
        .args(["plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("column plans"));
}

#[test]
fn test_compare_command_exists() {
    cmd()
        .args(["compare", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compare row counts"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
