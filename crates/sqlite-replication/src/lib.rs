// crates/sqlite-replication/src/lib.rs
// ============================================================================
// Module: SQLite Replication Library
// Description: Dual-write SQLite store with monthly backup rotation.
// Purpose: Keep a primary store and a period-tagged backup in step, archive
//          closed periods, and enforce archive retention.
// Dependencies: flate2, rusqlite, serde, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! [`ReplicationManager`] accepts parameterized SQL statements on a bounded
//! queue and applies each one to a primary store `<name>.db` and then to a
//! backup `<name>-<YYYYMM>.db` for the current calendar month. When the
//! month advances the backup is closed, the primary is re-seeded from it, the
//! closed file is gzip-archived and archives older than the
//! [`RetentionWindow`] are deleted.
//!
//! Invariants:
//! - A single writer thread performs every mutation, in FIFO order.
//! - Reads use the primary only and never observe a rotation mid-flight.
//! - Published files appear by rename; temp files are removed on startup.
//!
//! Logging goes through `tracing`; the host installs the subscriber.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod archive;
pub mod config;
pub mod error;
mod layout;
pub mod manager;
pub mod period;
pub mod reader;
mod recovery;
mod retention;
mod rotation;
pub mod stats;
mod store_pair;
mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ReplicationConfig;
pub use config::RetentionWindow;
pub use config::SqliteJournalMode;
pub use config::SqliteSyncMode;
pub use error::ReplicationError;
pub use manager::ReplicationManager;
pub use manager::StorePaths;
pub use period::Clock;
pub use period::ManualClock;
pub use period::PERIOD_TAG_LEN;
pub use period::Period;
pub use period::SystemClock;
pub use reader::ReadRow;
pub use reader::ReaderGuard;
pub use rusqlite::types::Value;
pub use stats::ReplicationStatsSnapshot;
pub use store_pair::SqlParams;
