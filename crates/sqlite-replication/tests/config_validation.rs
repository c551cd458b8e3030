// crates/sqlite-replication/tests/config_validation.rs
// ============================================================================
// Module: Replication Config Tests
// Description: Deserialization defaults and validation limits.
// Purpose: Reject unsafe names and paths before any file is touched.
// ============================================================================

//! ## Overview
//! Config tests covering:
//! - serde defaults and overrides
//! - name and path safety checks
//! - constructor propagation of validation errors

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde_json::json;
use sqlite_replication::ReplicationConfig;
use sqlite_replication::ReplicationError;
use sqlite_replication::ReplicationManager;
use sqlite_replication::RetentionWindow;
use sqlite_replication::SqliteJournalMode;
use sqlite_replication::SqliteSyncMode;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config_in(dir: &Path) -> ReplicationConfig {
    ReplicationConfig::new(
        "ledger",
        dir.join("primary"),
        dir.join("backups"),
        RetentionWindow::OneYear,
        "CREATE TABLE t(x);",
    )
}

fn assert_invalid(config: &ReplicationConfig, needle: &str) {
    match config.validate() {
        Err(ReplicationError::Invalid(message)) => {
            assert!(message.contains(needle), "message {message} should mention {needle}");
        }
        other => panic!("expected invalid config, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Deserialization
// ============================================================================

#[test]
fn config_deserializes_with_defaults() {
    let config: ReplicationConfig = serde_json::from_value(json!({
        "name": "ledger",
        "primary_directory": "/var/lib/app",
        "backup_directory": "/var/backups/app",
        "retention": "one_year",
        "schema": "CREATE TABLE IF NOT EXISTS t(x);"
    }))
    .expect("deserialize");

    assert_eq!(config.retention, RetentionWindow::OneYear);
    assert_eq!(config.primary_directory, PathBuf::from("/var/lib/app"));
    assert_eq!(config.busy_timeout_ms, 5_000);
    assert_eq!(config.journal_mode, SqliteJournalMode::Wal);
    assert_eq!(config.sync_mode, SqliteSyncMode::Full);
    assert_eq!(config.queue_capacity, 4_096);
    assert_eq!(config.read_pool_size, 4);
}

#[test]
fn config_deserializes_overrides() {
    let config: ReplicationConfig = serde_json::from_value(json!({
        "name": "ledger",
        "primary_directory": "a",
        "backup_directory": "b",
        "retention": "three_years",
        "schema": "",
        "busy_timeout_ms": 250,
        "journal_mode": "delete",
        "sync_mode": "normal",
        "queue_capacity": 8,
        "read_pool_size": 1
    }))
    .expect("deserialize");

    assert_eq!(config.retention, RetentionWindow::ThreeYears);
    assert_eq!(config.busy_timeout_ms, 250);
    assert_eq!(config.journal_mode, SqliteJournalMode::Delete);
    assert_eq!(config.sync_mode, SqliteSyncMode::Normal);
    assert_eq!(config.queue_capacity, 8);
    assert_eq!(config.read_pool_size, 1);
}

#[test]
fn config_rejects_unknown_retention() {
    let result = serde_json::from_value::<ReplicationConfig>(json!({
        "name": "ledger",
        "primary_directory": "a",
        "backup_directory": "b",
        "retention": "weekly",
        "schema": ""
    }));
    assert!(result.is_err());
}

#[test]
fn retention_windows_map_to_month_counts() {
    assert_eq!(RetentionWindow::Unlimited.months(), None);
    assert_eq!(RetentionWindow::OneMonth.months(), Some(1));
    assert_eq!(RetentionWindow::SixMonths.months(), Some(6));
    assert_eq!(RetentionWindow::OneYear.months(), Some(12));
    assert_eq!(RetentionWindow::ThreeYears.months(), Some(36));
    assert!(!RetentionWindow::Unlimited.rotates());
    assert!(RetentionWindow::OneMonth.rotates());
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn validate_accepts_defaults_and_shared_directory() {
    let dir = TempDir::new().expect("tempdir");
    config_in(dir.path()).validate().expect("valid");

    let mut shared = config_in(dir.path());
    shared.backup_directory = shared.primary_directory.clone();
    shared.validate().expect("shared directory is allowed");
}

#[test]
fn validate_rejects_bad_names() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_in(dir.path());

    config.name = String::new();
    assert_invalid(&config, "empty");
    config.name = ".hidden".to_string();
    assert_invalid(&config, "'.'");
    config.name = "nested/name".to_string();
    assert_invalid(&config, "separators");
    config.name = "windows\\name".to_string();
    assert_invalid(&config, "separators");
    config.name = "n".repeat(250);
    assert_invalid(&config, "length");
}

#[test]
fn validate_rejects_bad_directories() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_in(dir.path());

    config.primary_directory = PathBuf::new();
    assert_invalid(&config, "primary_directory");

    let file = dir.path().join("not-a-dir");
    fs::write(&file, b"file").expect("write");
    config.primary_directory = file;
    assert_invalid(&config, "directory");

    config = config_in(dir.path());
    config.backup_directory = dir.path().join("a".repeat(300));
    assert_invalid(&config, "overlong component");

    config = config_in(dir.path());
    let deep: PathBuf = (0 .. 40).map(|_| "c".repeat(120)).collect();
    config.backup_directory = deep;
    assert_invalid(&config, "length limit");
}

#[test]
fn validate_rejects_zero_capacities() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_in(dir.path());
    config.queue_capacity = 0;
    assert_invalid(&config, "queue_capacity");

    let mut config = config_in(dir.path());
    config.read_pool_size = 0;
    assert_invalid(&config, "read_pool_size");
}

#[test]
fn constructor_propagates_validation_errors_without_touching_disk() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_in(dir.path());
    config.name = "bad/name".to_string();

    let result = ReplicationManager::new(config);
    assert!(matches!(result, Err(ReplicationError::Invalid(_))));
    assert!(!dir.path().join("primary").exists());
    assert!(!dir.path().join("backups").exists());
}
