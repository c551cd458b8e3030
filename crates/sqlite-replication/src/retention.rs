// crates/sqlite-replication/src/retention.rs
// ============================================================================
// Module: Retention Sweeper
// Description: Age-based deletion of compressed period archives.
// Purpose: Keep the backup directory within the configured retention window.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! The sweeper only ever deletes `<name>-<YYYYMM>.db.gz` files whose period
//! is strictly more than the window's month count behind the current period.
//! Open and closed database files are never touched here, and files whose
//! tag cannot be parsed are logged and left alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::info;
use tracing::warn;

use crate::config::RetentionWindow;
use crate::error::ReplicationError;
use crate::layout::BackupFileKind;
use crate::layout::StoreLayout;
use crate::layout::remove_if_exists;
use crate::period::Period;

// ============================================================================
// SECTION: Sweep
// ============================================================================

/// Deletes archives older than `retention` relative to `current`.
///
/// Returns the number of archives deleted. Per-file delete failures are
/// logged and skipped.
///
/// # Errors
///
/// Returns [`ReplicationError::Io`] when the backup directory cannot be read.
pub(crate) fn sweep_archives(
    layout: &StoreLayout,
    current: Period,
    retention: RetentionWindow,
) -> Result<u64, ReplicationError> {
    let Some(window) = retention.months() else {
        return Ok(0);
    };
    let mut deleted = 0_u64;
    for file in layout.scan_backups()? {
        if file.kind != BackupFileKind::Archive {
            continue;
        }
        let age = current.months_since(file.period);
        if age <= window {
            continue;
        }
        match remove_if_exists(&file.path) {
            Ok(()) => {
                deleted = deleted.saturating_add(1);
                info!(period = %file.period, age_months = age, "deleted expired archive");
            }
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "failed to delete expired archive");
            }
        }
    }
    Ok(deleted)
}
