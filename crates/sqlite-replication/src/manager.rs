// crates/sqlite-replication/src/manager.rs
// ============================================================================
// Module: Replication Manager
// Description: Public facade over the writer queue, store pair and readers.
// Purpose: Construct, recover, accept writes, serve reads, and shut down.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! [`ReplicationManager`] owns one primary store and one period-tagged
//! backup. Construction validates config, creates directories, runs startup
//! recovery, opens the pair, sweeps expired archives and starts the writer
//! thread. Writes are fire-and-forget through the queue; reads go straight
//! to the primary under a shared lease.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::mpsc;
use std::thread::JoinHandle;

use rusqlite::types::Value;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::ReplicationConfig;
use crate::error::ReplicationError;
use crate::layout::StoreLayout;
use crate::period::Clock;
use crate::period::Period;
use crate::period::SystemClock;
use crate::reader::ReaderGuard;
use crate::recovery::recover;
use crate::retention::sweep_archives;
use crate::stats::ReplicationStats;
use crate::stats::ReplicationStatsSnapshot;
use crate::stats::StatEvent;
use crate::store_pair::ConnectionOptions;
use crate::store_pair::SqlParams;
use crate::store_pair::StorePair;
use crate::writer::WriteGateway;
use crate::writer::WriterShared;
use crate::writer::spawn_writer;

// ============================================================================
// SECTION: Paths
// ============================================================================

/// Store file locations for the period currently served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// `<primary_directory>/<name>.db`.
    pub primary: PathBuf,
    /// `<backup_directory>/<name>-<YYYYMM>.db` for the open period.
    pub backup: PathBuf,
    /// Directory holding backups and archives.
    pub backup_directory: PathBuf,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Replicated `SQLite` store with monthly backup rotation.
///
/// # Invariants
/// - Only the writer thread mutates files after construction.
/// - Statements reach the primary before the backup, in queue order.
/// - A [`ReaderGuard`] blocks rotation for as long as it lives.
pub struct ReplicationManager {
    /// Producer side of the writer queue.
    gateway: WriteGateway,
    /// State shared with the writer.
    shared: Arc<WriterShared>,
    /// Writer thread handle, taken on join.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicationManager {
    /// Opens (or creates) the stores described by `config` using the system
    /// clock.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError`] when config validation, directory
    /// creation, recovery, schema initialization or thread spawn fails.
    pub fn new(config: ReplicationConfig) -> Result<Self, ReplicationError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Opens (or creates) the stores described by `config` using `clock` as
    /// the source of the current period.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError`] when config validation, directory
    /// creation, recovery, schema initialization or thread spawn fails.
    pub fn with_clock(
        config: ReplicationConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ReplicationError> {
        config.validate()?;
        let layout = StoreLayout::new(
            config.name.as_str(),
            config.primary_directory.as_path(),
            config.backup_directory.as_path(),
        );
        layout.ensure_directories()?;

        let current = clock.current_period()?;
        let report = recover(&layout, current, config.retention)?;
        let serving = report.serving;
        if let Some(period) = report.reseeded_from {
            info!(%period, %current, "caught up on missed rotation");
        }
        if report.rebuilt_primary {
            warn!(%serving, "primary reconstructed from serving backup");
        }

        let mut stores = StorePair::new(
            layout,
            ConnectionOptions::from_config(&config),
            config.schema.clone(),
            serving,
        );
        stores.open()?;

        let stats = ReplicationStats::default();
        let swept = if config.retention.rotates() {
            sweep_archives(stores.layout(), serving, config.retention)?
        } else {
            0
        };
        if report.reseeded_from.is_some() {
            stats.record(StatEvent::Rotated);
        }
        stats.record_archives(report.compressed, swept);

        let shared = Arc::new(WriterShared::new(stores, clock, config.retention, stats));
        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity);
        let worker = spawn_writer(Arc::clone(&shared), receiver, sender.clone())?;
        info!(
            name = %config.name,
            period = %serving,
            compressed = report.compressed,
            removed_duplicates = report.duplicates_removed,
            swept,
            "replication manager started"
        );
        Ok(Self {
            gateway: WriteGateway::new(sender, Arc::clone(&shared)),
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queues a statement for the primary and the open backup.
    ///
    /// Blocks while the queue is at capacity. Success means accepted, not
    /// applied; failures during apply are logged and counted.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::ShutdownInProgress`] once shutdown began
    /// and [`ReplicationError::QueueFull`] after a fatal rotation fault.
    pub fn submit_mutation(
        &self,
        sql: impl Into<String>,
        params: SqlParams,
    ) -> Result<(), ReplicationError> {
        self.gateway.submit(sql.into(), params)
    }

    /// Queues a statement without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::QueueFull`] when the queue is at capacity
    /// or writes are refused after a fatal rotation fault, and
    /// [`ReplicationError::ShutdownInProgress`] once shutdown began.
    pub fn try_submit_mutation(
        &self,
        sql: impl Into<String>,
        params: SqlParams,
    ) -> Result<(), ReplicationError> {
        self.gateway.try_submit(sql.into(), params)
    }

    /// Queues a rotation to the clock's current period.
    ///
    /// The rotation observes every statement queued before it. A rotation
    /// whose target is not later than the open period is a no-op, so
    /// repeated requests within one month rotate once.
    ///
    /// # Errors
    ///
    /// Same refusals as [`Self::submit_mutation`].
    pub fn submit_rotation(&self) -> Result<(), ReplicationError> {
        self.gateway.request_rotation()
    }

    /// Blocks until every unit queued before this call has been processed.
    ///
    /// Must not be called while holding a [`ReaderGuard`] if a rotation may
    /// be queued; the rotation waits for the guard.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::ShutdownInProgress`] once shutdown began.
    pub fn flush(&self) -> Result<(), ReplicationError> {
        self.gateway.flush()
    }

    /// Runs a read against the primary and returns a scoped guard over the
    /// buffered rows.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Db`] with the engine error unchanged,
    /// [`ReplicationError::RotationFault`] after a fatal rotation fault and
    /// [`ReplicationError::ShutdownInProgress`] after the stores were closed.
    pub fn read_scoped(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<ReaderGuard<'_>, ReplicationError> {
        if self.shared.is_faulted() {
            return Err(ReplicationError::RotationFault(
                "primary unavailable after rotation fault".to_string(),
            ));
        }
        let lease = self
            .shared
            .stores
            .read()
            .map_err(|_| ReplicationError::Poisoned("store pair lock".to_string()))?;
        if !lease.is_open() {
            if self.shared.is_shutting_down() {
                return Err(ReplicationError::ShutdownInProgress);
            }
            return Err(ReplicationError::RotationFault("store pair is not open".to_string()));
        }
        let rows = lease.query(sql, params)?;
        Ok(ReaderGuard::new(lease, rows))
    }

    /// Stops accepting work and enqueues the shutdown sentinel.
    ///
    /// With `drain` the call waits until every earlier unit is applied and
    /// both stores are closed. Without it, queued statements are discarded
    /// and the call returns immediately. Repeated calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Poisoned`] if the writer thread panicked.
    pub fn shutdown(&self, drain: bool) -> Result<(), ReplicationError> {
        if !self.gateway.begin_shutdown(drain) {
            return Ok(());
        }
        if drain {
            self.join_writer()?;
        }
        Ok(())
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> ReplicationStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Returns the period served by the open backup.
    #[must_use]
    pub fn current_period(&self) -> Period {
        self.shared.stores.read().unwrap_or_else(PoisonError::into_inner).backup_period()
    }

    /// Returns the primary path and the open backup's path.
    #[must_use]
    pub fn paths(&self) -> StorePaths {
        let stores = self.shared.stores.read().unwrap_or_else(PoisonError::into_inner);
        let layout = stores.layout();
        StorePaths {
            primary: layout.primary_path(),
            backup: layout.backup_path(stores.backup_period()),
            backup_directory: layout.backup_directory().to_path_buf(),
        }
    }

    /// Returns the archive path for `period`.
    #[must_use]
    pub fn archive_path(&self, period: Period) -> PathBuf {
        let stores = self.shared.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.layout().archive_path(period)
    }

    /// Returns true once a fatal rotation fault has latched.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.shared.is_faulted()
    }

    /// Waits for the writer thread if it has not been joined yet.
    fn join_writer(&self) -> Result<(), ReplicationError> {
        let handle = self
            .worker
            .lock()
            .map_err(|_| ReplicationError::Poisoned("writer handle".to_string()))?
            .take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| ReplicationError::Poisoned("writer thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for ReplicationManager {
    fn drop(&mut self) {
        self.gateway.begin_shutdown(true);
        if let Err(err) = self.join_writer() {
            error!(error = %err, "replication manager dropped with a failed writer");
        }
    }
}

impl std::fmt::Debug for ReplicationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationManager")
            .field("faulted", &self.shared.is_faulted())
            .field("shutting_down", &self.shared.is_shutting_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
