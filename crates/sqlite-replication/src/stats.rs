// crates/sqlite-replication/src/stats.rs
// ============================================================================
// Module: Replication Stats
// Description: Lightweight counters for queue, writer and rotation activity.
// Purpose: Make fire-and-forget outcomes observable without a metrics stack.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Writes are fire-and-forget, so failures surface only in logs. These
//! counters give hosts and tests a way to confirm what the worker did:
//! every divergence incident is both logged and counted here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Snapshot of replication counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationStatsSnapshot {
    /// Work units accepted by the queue.
    pub units_enqueued: u64,
    /// Work units refused at submit time (full, faulted, or shut down).
    pub units_rejected: u64,
    /// Statements committed to both stores.
    pub statements_applied: u64,
    /// Statements that failed on the primary (not attempted on the backup).
    pub statements_failed: u64,
    /// Statements committed to the primary whose backup write failed.
    pub divergence_incidents: u64,
    /// Statements dropped without execution (fault, abandon, or shutdown).
    pub units_discarded: u64,
    /// Rotations that reached the new period.
    pub rotations_completed: u64,
    /// Rotations that failed at any step.
    pub rotation_faults: u64,
    /// Closed periods compressed into archives.
    pub archives_compressed: u64,
    /// Archives deleted by the retention sweeper.
    pub archives_swept: u64,
}

// ============================================================================
// SECTION: Counters
// ============================================================================

/// Counter events recorded by the manager and worker.
#[derive(Debug, Clone, Copy)]
pub(crate) enum StatEvent {
    /// A unit was accepted by the queue.
    Enqueued,
    /// A unit was refused at submit time.
    Rejected,
    /// A statement reached both stores.
    Applied,
    /// A statement failed on the primary.
    Failed,
    /// A statement reached only the primary.
    Diverged,
    /// A statement was dropped without execution.
    Discarded,
    /// A rotation completed.
    Rotated,
    /// A rotation failed.
    RotationFault,
}

/// Shared mutable counters.
#[derive(Debug, Default)]
pub(crate) struct ReplicationStats {
    /// Current counter values.
    inner: Mutex<ReplicationStatsSnapshot>,
}

impl ReplicationStats {
    /// Increments the counter for `event`.
    pub(crate) fn record(&self, event: StatEvent) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match event {
            StatEvent::Enqueued => &mut stats.units_enqueued,
            StatEvent::Rejected => &mut stats.units_rejected,
            StatEvent::Applied => &mut stats.statements_applied,
            StatEvent::Failed => &mut stats.statements_failed,
            StatEvent::Diverged => &mut stats.divergence_incidents,
            StatEvent::Discarded => &mut stats.units_discarded,
            StatEvent::Rotated => &mut stats.rotations_completed,
            StatEvent::RotationFault => &mut stats.rotation_faults,
        };
        *slot = slot.saturating_add(1);
    }

    /// Adds archive maintenance counts from a rotation, recovery, or sweep.
    pub(crate) fn record_archives(&self, compressed: u64, swept: u64) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats.archives_compressed = stats.archives_compressed.saturating_add(compressed);
        stats.archives_swept = stats.archives_swept.saturating_add(swept);
    }

    /// Returns a copy of the current counters.
    pub(crate) fn snapshot(&self) -> ReplicationStatsSnapshot {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
