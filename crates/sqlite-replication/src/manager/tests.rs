// crates/sqlite-replication/src/manager/tests.rs
// ============================================================================
// Module: Manager Unit Tests
// Description: Caller-facing refusals after a fatal rotation fault.
// Purpose: Pin the error kinds readers and producers see once faulted.
// Dependencies: tempfile
// ============================================================================

//! ## Overview
//! Unit tests for [`ReplicationManager`] with the fault latch set directly.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;

use rusqlite::Connection;
use rusqlite::types::Value;
use tempfile::TempDir;

use super::ReplicationManager;
use crate::config::ReplicationConfig;
use crate::config::RetentionWindow;
use crate::error::ReplicationError;
use crate::period::ManualClock;
use crate::period::Period;

const LOG_SCHEMA: &str = "CREATE TABLE logs(id INTEGER PRIMARY KEY AUTOINCREMENT, msg TEXT);";
const INSERT_LOG: &str = "INSERT INTO logs(msg) VALUES(?1)";
const SELECT_LOGS: &str = "SELECT msg FROM logs ORDER BY id";

fn text(value: &str) -> Vec<Value> {
    vec![Value::Text(value.to_string())]
}

#[test]
fn faulted_manager_refuses_reads_and_writes() {
    let dir = TempDir::new().expect("tempdir");
    let at = Period::new(2024, 1).expect("period");
    let clock = Arc::new(ManualClock::at_period(at).expect("clock"));
    let config = ReplicationConfig::new(
        "ledger",
        dir.path().join("primary"),
        dir.path().join("backups"),
        RetentionWindow::OneMonth,
        LOG_SCHEMA,
    );
    let manager = ReplicationManager::with_clock(config, clock).expect("manager");
    manager.submit_mutation(INSERT_LOG, text("before")).expect("submit");
    manager.flush().expect("flush");

    manager.shared.latch_fault();

    assert!(manager.is_faulted());
    assert!(matches!(
        manager.read_scoped(SELECT_LOGS, &[]),
        Err(ReplicationError::RotationFault(_))
    ));
    assert!(matches!(
        manager.submit_mutation(INSERT_LOG, text("refused")),
        Err(ReplicationError::QueueFull(_))
    ));
    assert!(matches!(
        manager.try_submit_mutation(INSERT_LOG, text("refused")),
        Err(ReplicationError::QueueFull(_))
    ));
    assert!(matches!(manager.submit_rotation(), Err(ReplicationError::QueueFull(_))));
    let stats = manager.stats();
    assert_eq!(stats.units_rejected, 3);
    assert_eq!(stats.statements_applied, 1);

    let primary = manager.paths().primary;
    manager.shutdown(true).expect("shutdown");
    let connection = Connection::open(primary).expect("open primary");
    let count: i64 =
        connection.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0)).expect("count");
    assert_eq!(count, 1);
}
