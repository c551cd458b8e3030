// crates/sqlite-replication/src/config.rs
// ============================================================================
// Module: Replication Config
// Description: Construction inputs for the replicated SQLite store.
// Purpose: Deserialize, default, and validate manager configuration.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`ReplicationConfig`] carries the file stem, the two directories, the
//! retention window, the caller's schema text, and the connection and queue
//! tuning knobs. Loading the config from disk is left to the host; this
//! module only deserializes and validates it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ReplicationError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default writer queue capacity, in work units.
const DEFAULT_QUEUE_CAPACITY: usize = 4_096;
/// Default number of pooled read connections.
const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Retention
// ============================================================================

/// Maximum age of archived period files kept by the sweeper.
///
/// # Invariants
/// - [`RetentionWindow::Unlimited`] disables both the monthly rotation
///   trigger and the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionWindow {
    /// Keep everything; no automatic rotation.
    Unlimited,
    /// Keep archives up to one month old.
    OneMonth,
    /// Keep archives up to six months old.
    SixMonths,
    /// Keep archives up to twelve months old.
    OneYear,
    /// Keep archives up to thirty-six months old.
    ThreeYears,
}

impl RetentionWindow {
    /// Returns the window length in months, or `None` when unlimited.
    #[must_use]
    pub const fn months(self) -> Option<i64> {
        match self {
            Self::Unlimited => None,
            Self::OneMonth => Some(1),
            Self::SixMonths => Some(6),
            Self::OneYear => Some(12),
            Self::ThreeYears => Some(36),
        }
    }

    /// Returns true when monthly rotation and sweeping are enabled.
    #[must_use]
    pub const fn rotates(self) -> bool {
        !matches!(self, Self::Unlimited)
    }
}

// ============================================================================
// SECTION: Connection Modes
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for a [`crate::ReplicationManager`].
///
/// # Invariants
/// - `name` is a bare file stem: non-empty, no path separators, no leading dot.
/// - `primary_directory` and `backup_directory` are directories (created if absent).
/// - `schema` is trusted SQL executed once on every newly created store file.
/// - `queue_capacity` and `read_pool_size` are greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// File stem shared by the primary, backups and archives.
    pub name: String,
    /// Directory holding `<name>.db`.
    pub primary_directory: PathBuf,
    /// Directory holding `<name>-<YYYYMM>.db` and `.db.gz` files.
    pub backup_directory: PathBuf,
    /// Archive retention window.
    pub retention: RetentionWindow,
    /// Schema initialization statements for new store files.
    pub schema: String,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Bounded writer queue capacity, in work units.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of read connections pooled against the primary.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default writer queue capacity.
const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

impl ReplicationConfig {
    /// Builds a config with default tuning for the given identity and schema.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        primary_directory: impl Into<PathBuf>,
        backup_directory: impl Into<PathBuf>,
        retention: RetentionWindow,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_directory: primary_directory.into(),
            backup_directory: backup_directory.into(),
            retention,
            schema: schema.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            queue_capacity: default_queue_capacity(),
            read_pool_size: default_read_pool_size(),
        }
    }

    /// Validates names, paths, and runtime limits.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ReplicationError> {
        validate_name(&self.name)?;
        validate_directory(&self.primary_directory, "primary_directory")?;
        validate_directory(&self.backup_directory, "backup_directory")?;
        if self.queue_capacity == 0 {
            return Err(ReplicationError::Invalid(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.read_pool_size == 0 {
            return Err(ReplicationError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Validates the file stem used for every store file.
fn validate_name(name: &str) -> Result<(), ReplicationError> {
    if name.is_empty() {
        return Err(ReplicationError::Invalid("name must not be empty".to_string()));
    }
    if name.starts_with('.') {
        return Err(ReplicationError::Invalid("name must not start with '.'".to_string()));
    }
    if name.chars().any(|ch| ch == '/' || ch == '\\' || ch == '\0') {
        return Err(ReplicationError::Invalid(
            "name must not contain path separators".to_string(),
        ));
    }
    // Longest derived file name is `<name>-YYYYMM.db.gz.partial`.
    if name.len() + "-000000.db.gz.partial".len() > MAX_PATH_COMPONENT_LENGTH {
        return Err(ReplicationError::Invalid("name exceeds length limit".to_string()));
    }
    Ok(())
}

/// Validates a store directory for safety limits.
fn validate_directory(path: &Path, label: &str) -> Result<(), ReplicationError> {
    if path.as_os_str().is_empty() {
        return Err(ReplicationError::Invalid(format!("{label} must not be empty")));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ReplicationError::Invalid(format!("{label} exceeds length limit")));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ReplicationError::Invalid(format!(
                "{label} contains an overlong component"
            )));
        }
    }
    if path.exists() && !path.is_dir() {
        return Err(ReplicationError::Invalid(format!(
            "{label} must be a directory, not a file"
        )));
    }
    Ok(())
}
