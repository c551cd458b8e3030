// crates/sqlite-replication/src/rotation.rs
// ============================================================================
// Module: Rotation Controller
// Description: Monthly period rollover for the store pair.
// Purpose: Close the serving period, re-seed the primary, archive, sweep.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! Rotation runs on the writer thread while it holds the store pair
//! exclusively, so no statement or reader observes an intermediate state.
//! The states are walked in order:
//!
//! 1. `Draining`: checkpoint and close every connection.
//! 2. `Swapping`: the open backup `<name>-<closing>.db` becomes the closed
//!    file in place (open and closed names coincide), a non-empty file
//!    already named `<name>-<target>.db` is moved to `.db.displaced`, a
//!    fresh `<name>-<target>.db` is created with the schema, the primary is
//!    replaced by a copy of the closed file, and the pair is reopened.
//! 3. `Compressing`: the closed file is gzip-archived.
//! 4. `Sweeping`: expired archives are deleted.
//!
//! Failures before the primary is replaced are rolled back and the old pair
//! is reopened. A failure to reopen after the primary was replaced is fatal.
//! Compression and sweep failures are logged; startup recovery retries them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::archive::archive_period;
use crate::config::RetentionWindow;
use crate::error::ReplicationError;
use crate::layout::copy_database;
use crate::layout::displace_database;
use crate::layout::remove_database;
use crate::layout::remove_if_exists;
use crate::period::Period;
use crate::retention::sweep_archives;
use crate::store_pair::StorePair;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rotation state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RotationState {
    /// Not rotating.
    Idle,
    /// Closing connections.
    Draining,
    /// Installing the new backup and re-seeding the primary.
    Swapping,
    /// Archiving the closed period.
    Compressing,
    /// Deleting expired archives.
    Sweeping,
}

impl RotationState {
    /// Returns a stable label for logging.
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Draining => "draining",
            Self::Swapping => "swapping",
            Self::Compressing => "compressing",
            Self::Sweeping => "sweeping",
        }
    }
}

/// Successful rotation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RotationOutcome {
    /// The pair now serves `opened`; `closed` was archived (or left for recovery).
    Rotated {
        /// Period that was closed.
        closed: Period,
        /// Period now served by the backup.
        opened: Period,
        /// Whether the closed period was compressed.
        compressed: bool,
        /// Archives deleted by the sweep.
        swept: u64,
    },
    /// The target period is not later than the serving period.
    Skipped,
}

/// A failed rotation.
#[derive(Debug)]
pub(crate) struct RotationFailure {
    /// State in which the failure occurred.
    pub(crate) state: RotationState,
    /// True when the pair could not be restored to a usable state.
    pub(crate) fatal: bool,
    /// Underlying error.
    pub(crate) error: ReplicationError,
}

// ============================================================================
// SECTION: Rotation
// ============================================================================

/// Rotates `pair` from its serving period to `target`.
///
/// `target` is sampled once by the caller and used throughout.
///
/// # Errors
///
/// Returns [`RotationFailure`] describing the failed state and whether the
/// pair was left unusable.
pub(crate) fn rotate(
    pair: &mut StorePair,
    target: Period,
    retention: RetentionWindow,
) -> Result<RotationOutcome, RotationFailure> {
    let closing = pair.backup_period();
    if target <= closing {
        if target < closing {
            warn!(%target, %closing, "clock is behind the open backup; rotation skipped");
        } else {
            debug!(period = %closing, "rotation requested within the open period; skipped");
        }
        return Ok(RotationOutcome::Skipped);
    }
    info!(%closing, %target, "rotation started");

    let mut state = RotationState::Draining;
    debug!(state = state.as_str(), "rotation state");
    pair.close();

    state = RotationState::Swapping;
    debug!(state = state.as_str(), "rotation state");
    let fresh_created = swap_period(pair, closing, target).map_err(|(error, created)| {
        let fatal = roll_back(pair, closing, target, created).is_err();
        RotationFailure {
            state,
            fatal,
            error,
        }
    })?;
    debug!(fresh_created, "primary re-seeded from closed period");
    pair.set_backup_period(target).and_then(|()| pair.open()).map_err(|error| {
        RotationFailure {
            state,
            fatal: true,
            error,
        }
    })?;

    state = RotationState::Compressing;
    debug!(state = state.as_str(), "rotation state");
    let compressed = match archive_period(pair.layout(), closing) {
        Ok(_) => true,
        Err(err) => {
            error!(period = %closing, error = %err, "archiving closed period failed; retried at startup");
            false
        }
    };

    state = RotationState::Sweeping;
    debug!(state = state.as_str(), "rotation state");
    let swept = if retention.rotates() {
        sweep_archives(pair.layout(), target, retention).unwrap_or_else(|err| {
            warn!(error = %err, "retention sweep failed");
            0
        })
    } else {
        0
    };

    state = RotationState::Idle;
    debug!(state = state.as_str(), "rotation state");
    info!(%closing, %target, compressed, swept, "rotation completed");
    Ok(RotationOutcome::Rotated {
        closed: closing,
        opened: target,
        compressed,
        swept,
    })
}

/// Creates the new backup and re-seeds the primary from the closed file.
///
/// On error, also reports whether this call created the new backup file so
/// rollback only removes what rotation itself made.
fn swap_period(
    pair: &StorePair,
    closing: Period,
    target: Period,
) -> Result<bool, (ReplicationError, bool)> {
    let layout = pair.layout();
    let closed_path = layout.backup_path(closing);
    if !closed_path.exists() {
        return Err((
            ReplicationError::Io(format!("closed backup missing: {}", closed_path.display())),
            false,
        ));
    }
    let target_path = layout.backup_path(target);
    if std::fs::metadata(&target_path).is_ok_and(|meta| meta.is_file() && meta.len() > 0) {
        let aside = layout.displaced_path(target);
        displace_database(&target_path, &aside).map_err(|err| (err, false))?;
        warn!(
            period = %target,
            path = %aside.display(),
            "existing backup for the new period moved aside"
        );
    }
    let created = pair.prepare_backup(target).map_err(|err| (err, false))?;
    copy_database(&closed_path, &layout.primary_reseed_path(), &layout.primary_path())
        .map_err(|err| (err, created))?;
    Ok(created)
}

/// Restores the pre-rotation pair after a failed swap.
fn roll_back(
    pair: &mut StorePair,
    closing: Period,
    target: Period,
    fresh_created: bool,
) -> Result<(), ReplicationError> {
    let layout = pair.layout();
    if fresh_created {
        remove_database(&layout.backup_path(target))?;
    }
    remove_if_exists(&layout.primary_reseed_path())?;
    pair.set_backup_period(closing)?;
    pair.open().inspect_err(|err| {
        error!(period = %closing, error = %err, "rollback could not reopen the store pair");
    })?;
    warn!(period = %closing, "rotation rolled back; still serving the closing period");
    Ok(())
}
