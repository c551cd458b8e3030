// crates/sqlite-replication/src/recovery.rs
// ============================================================================
// Module: Startup Recovery
// Description: Repairs the on-disk layout before the writer starts.
// Purpose: Finish interrupted rotations and catch up missed month boundaries.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! Recovery runs once per construction, before any write is accepted:
//!
//! - leftover temp files (`.reseed`, `.db.gz.partial`) are removed;
//! - with a rotating retention window, if an uncompressed backup for an
//!   earlier period exists and either the primary or the current period's
//!   backup is missing, the primary is re-seeded from the latest such file
//!   (at most one catch-up rotation);
//! - otherwise a missing primary is rebuilt from the serving backup;
//! - every uncompressed backup older than the serving period is archived,
//!   or dropped when its archive already exists.
//!
//! With [`RetentionWindow::Unlimited`] no catch-up rotation happens: the
//! serving period stays the latest existing backup not after the clock, and
//! only files left by an interrupted manual rotation are archived.
//!
//! Backups for periods after the current one are logged and left alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::info;
use tracing::warn;

use crate::archive::archive_period;
use crate::config::RetentionWindow;
use crate::error::ReplicationError;
use crate::layout::BackupFileKind;
use crate::layout::StoreLayout;
use crate::layout::copy_database;
use crate::layout::remove_database;
use crate::layout::remove_if_exists;
use crate::period::Period;
use crate::store_pair::settle_closed_file;

// ============================================================================
// SECTION: Report
// ============================================================================

/// What startup recovery changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecoveryReport {
    /// Period the store pair should serve after recovery.
    pub(crate) serving: Period,
    /// Closed period the primary was re-seeded from, if any.
    pub(crate) reseeded_from: Option<Period>,
    /// Whether a missing primary was rebuilt from the serving backup.
    pub(crate) rebuilt_primary: bool,
    /// Closed periods compressed during recovery.
    pub(crate) compressed: u64,
    /// Uncompressed duplicates removed because their archive existed.
    pub(crate) duplicates_removed: u64,
}

// ============================================================================
// SECTION: Recovery
// ============================================================================

/// Brings the layout to a consistent at-rest state for period `current`.
///
/// # Errors
///
/// Returns [`ReplicationError`] when files cannot be scanned, copied or
/// compressed. The constructor propagates these; nothing is half-published
/// because every publication is a rename.
pub(crate) fn recover(
    layout: &StoreLayout,
    current: Period,
    retention: RetentionWindow,
) -> Result<RecoveryReport, ReplicationError> {
    remove_if_exists(&layout.primary_reseed_path())?;

    let mut databases = Vec::new();
    for file in layout.scan_backups()? {
        match file.kind {
            BackupFileKind::PartialArchive => {
                warn!(path = %file.path.display(), "removing interrupted archive");
                remove_if_exists(&file.path)?;
            }
            BackupFileKind::Database if file.period > current => {
                warn!(period = %file.period, %current, "backup is newer than the clock; left untouched");
            }
            BackupFileKind::Database => databases.push(file.period),
            BackupFileKind::Archive => {}
        }
    }

    let serving = if retention.rotates() {
        current
    } else {
        databases.last().copied().unwrap_or(current)
    };
    let closed: Vec<Period> = databases.into_iter().filter(|period| *period < serving).collect();
    let mut report = RecoveryReport {
        serving,
        reseeded_from: None,
        rebuilt_primary: false,
        compressed: 0,
        duplicates_removed: 0,
    };

    let primary = layout.primary_path();
    let serving_backup = layout.backup_path(serving);
    let primary_exists = primary.exists();
    let serving_exists = serving_backup.exists();

    if let Some(&latest) = closed.last()
        && retention.rotates()
        && (!primary_exists || !serving_exists)
    {
        let source = layout.backup_path(latest);
        settle_closed_file(&source)?;
        copy_database(&source, &layout.primary_reseed_path(), &primary)?;
        info!(period = %latest, %current, "primary re-seeded from closed period at startup");
        report.reseeded_from = Some(latest);
    } else if !primary_exists && serving_exists {
        settle_closed_file(&serving_backup)?;
        copy_database(&serving_backup, &layout.primary_reseed_path(), &primary)?;
        warn!(period = %serving, "primary missing; rebuilt from the serving backup");
        report.rebuilt_primary = true;
    }

    for period in closed {
        let source = layout.backup_path(period);
        if layout.archive_path(period).exists() {
            remove_database(&source)?;
            report.duplicates_removed = report.duplicates_removed.saturating_add(1);
            info!(%period, "removed closed period already archived");
        } else {
            settle_closed_file(&source)?;
            archive_period(layout, period)?;
            report.compressed = report.compressed.saturating_add(1);
        }
    }
    Ok(report)
}
