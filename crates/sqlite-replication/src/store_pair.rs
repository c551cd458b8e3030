// crates/sqlite-replication/src/store_pair.rs
// ============================================================================
// Module: Store Pair
// Description: Primary and period backup connections plus the read pool.
// Purpose: Apply each statement to both stores and recycle connections.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! A [`StorePair`] owns the connections for one period: the primary writer,
//! the open backup writer, and a round-robin pool of query-only connections
//! on the primary. The pair itself sits behind the manager's readers-writer
//! lock; statements and reads take it shared, rotation takes it exclusive
//! and is then free to close, move and reopen files.
//!
//! The caller's schema is executed once, on files that did not exist (or
//! were empty) when opened. Existing stores are opened in place.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::debug;
use tracing::warn;

use crate::config::ReplicationConfig;
use crate::config::SqliteJournalMode;
use crate::config::SqliteSyncMode;
use crate::error::ReplicationError;
use crate::layout::StoreLayout;
use crate::layout::remove_database;
use crate::layout::wal_path;
use crate::period::Period;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Positional statement parameters.
pub type SqlParams = Vec<Value>;

/// Buffered query result: column names plus rows of values.
pub(crate) type QueryRows = (Vec<String>, Vec<Vec<Value>>);

/// Connection tuning copied from the manager config.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionOptions {
    /// Busy timeout in milliseconds.
    busy_timeout_ms: u64,
    /// Journal mode pragma.
    journal_mode: SqliteJournalMode,
    /// Synchronous pragma.
    sync_mode: SqliteSyncMode,
    /// Number of pooled read connections.
    read_pool_size: usize,
}

impl ConnectionOptions {
    /// Extracts connection options from a validated config.
    pub(crate) const fn from_config(config: &ReplicationConfig) -> Self {
        Self {
            busy_timeout_ms: config.busy_timeout_ms,
            journal_mode: config.journal_mode,
            sync_mode: config.sync_mode,
            read_pool_size: config.read_pool_size,
        }
    }
}

/// Outcome of applying one statement to the pair.
#[derive(Debug)]
pub(crate) enum StatementOutcome {
    /// Committed on primary, then on backup.
    Applied,
    /// Primary failed; the backup was not attempted.
    PrimaryFailed(rusqlite::Error),
    /// Primary committed but the backup failed.
    BackupFailed(rusqlite::Error),
}

/// Connections open for the current period.
struct PairConnections {
    /// Primary writer.
    primary: Mutex<Connection>,
    /// Open backup writer.
    backup: Mutex<Connection>,
    /// Query-only connections on the primary.
    readers: Vec<Mutex<Connection>>,
}

/// The primary store and the open backup for one period.
///
/// # Invariants
/// - `connections` is `Some` only when both files exist and carry the schema.
/// - `backup_period` names the backup file the writer targets.
pub(crate) struct StorePair {
    /// Path calculator.
    layout: StoreLayout,
    /// Connection tuning.
    options: ConnectionOptions,
    /// Schema executed on new files.
    schema: String,
    /// Period served by the open backup.
    backup_period: Period,
    /// Open connections, if any.
    connections: Option<PairConnections>,
    /// Round-robin cursor for read connection selection.
    read_cursor: AtomicUsize,
}

// ============================================================================
// SECTION: Store Pair
// ============================================================================

impl StorePair {
    /// Creates a closed pair serving `backup_period`.
    pub(crate) const fn new(
        layout: StoreLayout,
        options: ConnectionOptions,
        schema: String,
        backup_period: Period,
    ) -> Self {
        Self {
            layout,
            options,
            schema,
            backup_period,
            connections: None,
            read_cursor: AtomicUsize::new(0),
        }
    }

    /// Returns the path calculator.
    pub(crate) const fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Returns the period served by the open backup.
    pub(crate) const fn backup_period(&self) -> Period {
        self.backup_period
    }

    /// Retargets the backup; only valid while the pair is closed.
    pub(crate) fn set_backup_period(&mut self, period: Period) -> Result<(), ReplicationError> {
        if self.connections.is_some() {
            return Err(ReplicationError::Invalid(
                "cannot retarget backup while connections are open".to_string(),
            ));
        }
        self.backup_period = period;
        Ok(())
    }

    /// Returns true when connections are open.
    pub(crate) const fn is_open(&self) -> bool {
        self.connections.is_some()
    }

    /// Opens both stores and the read pool. No-op when already open.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError`] when a file cannot be opened or a new
    /// file cannot be initialized with the schema.
    pub(crate) fn open(&mut self) -> Result<(), ReplicationError> {
        if self.connections.is_some() {
            return Ok(());
        }
        let primary_path = self.layout.primary_path();
        let backup_path = self.layout.backup_path(self.backup_period);
        let primary = open_store(&primary_path, &self.options, &self.schema)?;
        let backup = open_store(&backup_path, &self.options, &self.schema)?;
        let mut readers = Vec::with_capacity(self.options.read_pool_size);
        for _ in 0 .. self.options.read_pool_size {
            readers.push(Mutex::new(open_reader(&primary_path, &self.options)?));
        }
        self.connections = Some(PairConnections {
            primary: Mutex::new(primary),
            backup: Mutex::new(backup),
            readers,
        });
        debug!(period = %self.backup_period, "store pair opened");
        Ok(())
    }

    /// Checkpoints and closes every connection. No-op when already closed.
    ///
    /// Close failures are logged; the handles are released either way.
    pub(crate) fn close(&mut self) {
        let Some(connections) = self.connections.take() else {
            return;
        };
        for reader in connections.readers {
            close_connection(reader.into_inner().unwrap_or_else(PoisonError::into_inner), "reader");
        }
        for (connection, role) in [(connections.primary, "primary"), (connections.backup, "backup")]
        {
            let connection = connection.into_inner().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = connection.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
                warn!(role, error = %err, "checkpoint before close failed");
            }
            close_connection(connection, role);
        }
        debug!(period = %self.backup_period, "store pair closed");
    }

    /// Applies one statement to the primary, then the backup, each in its
    /// own transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError`] only when the pair is closed or a mutex
    /// is poisoned; statement failures are reported through the outcome.
    pub(crate) fn apply(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<StatementOutcome, ReplicationError> {
        let connections = self.open_connections()?;
        {
            let mut primary = connections
                .primary
                .lock()
                .map_err(|_| ReplicationError::Poisoned("primary connection".to_string()))?;
            if let Err(err) = execute_in_transaction(&mut primary, sql, params) {
                return Ok(StatementOutcome::PrimaryFailed(err));
            }
        }
        let mut backup = connections
            .backup
            .lock()
            .map_err(|_| ReplicationError::Poisoned("backup connection".to_string()))?;
        match execute_in_transaction(&mut backup, sql, params) {
            Ok(()) => Ok(StatementOutcome::Applied),
            Err(err) => Ok(StatementOutcome::BackupFailed(err)),
        }
    }

    /// Runs a query on a pooled primary connection and buffers the rows.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Db`] with the engine error unchanged when
    /// preparing or stepping the query fails.
    pub(crate) fn query(&self, sql: &str, params: &[Value]) -> Result<QueryRows, ReplicationError> {
        let connections = self.open_connections()?;
        let len = connections.readers.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len.max(1);
        let reader = connections
            .readers
            .get(index)
            .ok_or_else(|| ReplicationError::Invalid("read pool is empty".to_string()))?;
        let connection =
            reader.lock().map_err(|_| ReplicationError::Poisoned("read connection".to_string()))?;
        let mut statement = connection.prepare(sql)?;
        let columns: Vec<String> =
            statement.column_names().into_iter().map(str::to_string).collect();
        let column_count = statement.column_count();
        let mut rows = statement.query(params_from_iter(params.iter()))?;
        let mut buffered = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for column in 0 .. column_count {
                values.push(row.get::<_, Value>(column)?);
            }
            buffered.push(values);
        }
        Ok((columns, buffered))
    }

    /// Creates and initializes the backup file for `period` without opening it
    /// for writes. Returns true when the file did not exist before.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError`] when the file cannot be created or the
    /// schema fails; a file created by this call is removed on failure.
    pub(crate) fn prepare_backup(&self, period: Period) -> Result<bool, ReplicationError> {
        let path = self.layout.backup_path(period);
        let created = !path.exists();
        let connection = open_store(&path, &self.options, &self.schema)?;
        if let Err(err) = connection.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
            warn!(path = %path.display(), error = %err, "checkpoint of new backup failed");
        }
        close_connection(connection, "backup");
        Ok(created)
    }

    /// Returns the open connections or a closed-pair error.
    fn open_connections(&self) -> Result<&PairConnections, ReplicationError> {
        self.connections.as_ref().ok_or_else(|| {
            ReplicationError::RotationFault("store pair is not open".to_string())
        })
    }
}

impl Drop for StorePair {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Executes one statement inside its own committed transaction.
fn execute_in_transaction(
    connection: &mut Connection,
    sql: &str,
    params: &[Value],
) -> rusqlite::Result<()> {
    let tx = connection.transaction()?;
    tx.execute(sql, params_from_iter(params.iter()))?;
    tx.commit()
}

/// Opens a writable store, creating and initializing it when new.
fn open_store(
    path: &Path,
    options: &ConnectionOptions,
    schema: &str,
) -> Result<Connection, ReplicationError> {
    let is_new = !std::fs::metadata(path).is_ok_and(|meta| meta.len() > 0);
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&connection, options)?;
    if is_new && !schema.trim().is_empty() {
        match connection.execute_batch(schema) {
            Ok(()) => debug!(path = %path.display(), "initialized new store with schema"),
            Err(err) => {
                drop(connection);
                remove_database(path)?;
                return Err(ReplicationError::Db(err));
            }
        }
    }
    Ok(connection)
}

/// Opens a query-only connection on an existing primary.
fn open_reader(path: &Path, options: &ConnectionOptions) -> Result<Connection, ReplicationError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags)?;
    connection.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
    connection.execute_batch("PRAGMA query_only = ON;")?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, options: &ConnectionOptions) -> rusqlite::Result<()> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", options.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", options.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
}

/// Folds a leftover WAL into a closed database file so the main file is
/// self-contained. No-op when no WAL sidecar exists.
///
/// # Errors
///
/// Returns [`ReplicationError::Db`] when the file cannot be opened or
/// checkpointed.
pub(crate) fn settle_closed_file(path: &Path) -> Result<(), ReplicationError> {
    if !wal_path(path).exists() {
        return Ok(());
    }
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )?;
    connection.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
    close_connection(connection, "closed period");
    debug!(path = %path.display(), "checkpointed leftover wal");
    Ok(())
}

/// Closes a connection, logging (not propagating) failures.
fn close_connection(connection: Connection, role: &str) {
    if let Err((_connection, err)) = connection.close() {
        warn!(role, error = %err, "closing sqlite connection failed");
    }
}
