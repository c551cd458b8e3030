// crates/sqlite-replication/src/error.rs
// ============================================================================
// Module: Replication Errors
// Description: Error taxonomy for the replicated SQLite store.
// Purpose: Give callers one error type across construct, submit and read.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Worker-side failures (statement errors, divergence, sweep errors) are
//! logged and counted rather than returned, because writes are
//! fire-and-forget. The variants here surface on the caller side only:
//! constructor failures, queue refusal, and read errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by the replication manager.
///
/// # Invariants
/// - `Db` carries the storage engine error unchanged so readers can inspect
///   the `SQLite` error code.
/// - Messages never embed statement parameters.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Filesystem error while preparing or rotating store files.
    #[error("replication io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("replication db error: {0}")]
    Db(#[from] rusqlite::Error),
    /// Invalid configuration or caller input.
    #[error("replication invalid input: {0}")]
    Invalid(String),
    /// Work could not be accepted by the writer queue.
    #[error("replication queue full: {0}")]
    QueueFull(String),
    /// Shutdown has begun; no further work is accepted.
    #[error("replication manager is shutting down")]
    ShutdownInProgress,
    /// A rotation step failed and left the store pair unusable.
    #[error("replication rotation fault: {0}")]
    RotationFault(String),
    /// A lock guarding shared state was poisoned by a panicking thread.
    #[error("replication lock poisoned: {0}")]
    Poisoned(String),
}

impl ReplicationError {
    /// Builds an [`ReplicationError::Io`] from a filesystem error with context.
    pub(crate) fn io(context: &str, err: &std::io::Error) -> Self {
        Self::Io(format!("{context}: {err}"))
    }
}
