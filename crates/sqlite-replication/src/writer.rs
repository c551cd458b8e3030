// crates/sqlite-replication/src/writer.rs
// ============================================================================
// Module: Write Scheduler
// Description: Work units, bounded queue gateway, and the writer thread.
// Purpose: Serialize every on-disk mutation through one FIFO consumer.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! Producers enqueue [`WorkUnit`]s into a bounded `sync_channel`; a single
//! named writer thread drains it in FIFO order. Statements run under the
//! shared side of the store pair lock, rotations under the exclusive side,
//! so a Rotate unit is a total barrier between the statements queued before
//! and after it.
//!
//! Worker-side failures are logged and counted, never returned: writes are
//! fire-and-forget. A fatal rotation fault latches `faulted`, after which
//! producers are refused and queued statements are discarded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::SyncSender;
use std::sync::mpsc::TrySendError;
use std::thread;
use std::thread::JoinHandle;

use rusqlite::types::Value;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::RetentionWindow;
use crate::error::ReplicationError;
use crate::period::Clock;
use crate::rotation::RotationOutcome;
use crate::rotation::rotate;
use crate::stats::ReplicationStats;
use crate::stats::StatEvent;
use crate::store_pair::SqlParams;
use crate::store_pair::StatementOutcome;
use crate::store_pair::StorePair;

/// Writer thread name.
const WRITER_THREAD_NAME: &str = "sqlite-replication-writer";

// ============================================================================
// SECTION: Work Units
// ============================================================================

/// A discrete task processed by the writer.
pub(crate) enum WorkUnit {
    /// Apply one statement to primary then backup.
    Statement {
        /// SQL text.
        sql: String,
        /// Positional parameters.
        params: SqlParams,
    },
    /// Roll the store pair over to the clock's current period.
    Rotate,
    /// Barrier; answered once every earlier unit has been processed.
    Flush(mpsc::Sender<()>),
    /// Close the pair and stop the writer.
    Shutdown,
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared between the manager, its gateway and the writer thread.
pub(crate) struct WriterShared {
    /// Store pair guarded by the shared/exclusive lock.
    pub(crate) stores: RwLock<StorePair>,
    /// Source of the current period.
    pub(crate) clock: Arc<dyn Clock>,
    /// Configured retention window.
    pub(crate) retention: RetentionWindow,
    /// Counters.
    pub(crate) stats: ReplicationStats,
    /// A Rotate is queued or running; suppresses the rollover check.
    rotation_pending: AtomicBool,
    /// A fatal rotation fault occurred.
    faulted: AtomicBool,
    /// Shutdown has begun.
    shutting_down: AtomicBool,
    /// Remaining statements are discarded instead of applied.
    abandon: AtomicBool,
}

impl WriterShared {
    /// Wraps an opened store pair.
    pub(crate) fn new(
        stores: StorePair,
        clock: Arc<dyn Clock>,
        retention: RetentionWindow,
        stats: ReplicationStats,
    ) -> Self {
        Self {
            stores: RwLock::new(stores),
            clock,
            retention,
            stats,
            rotation_pending: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            abandon: AtomicBool::new(false),
        }
    }

    /// Returns true once a fatal rotation fault has latched.
    pub(crate) fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Latches the fatal fault: producers are refused and queued statements
    /// are discarded from now on.
    pub(crate) fn latch_fault(&self) {
        self.faulted.store(true, Ordering::Release);
    }

    /// Returns true once shutdown has begun.
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// Producer side of the writer queue.
pub(crate) struct WriteGateway {
    /// Bounded queue sender.
    sender: SyncSender<WorkUnit>,
    /// Shared state.
    shared: Arc<WriterShared>,
}

impl WriteGateway {
    /// Creates a gateway over `sender`.
    pub(crate) const fn new(sender: SyncSender<WorkUnit>, shared: Arc<WriterShared>) -> Self {
        Self {
            sender,
            shared,
        }
    }

    /// Enqueues a statement, blocking while the queue is full.
    pub(crate) fn submit(&self, sql: String, params: SqlParams) -> Result<(), ReplicationError> {
        self.admit()?;
        self.send(WorkUnit::Statement {
            sql,
            params,
        })
    }

    /// Enqueues a statement without blocking.
    pub(crate) fn try_submit(&self, sql: String, params: SqlParams) -> Result<(), ReplicationError> {
        self.admit()?;
        match self.sender.try_send(WorkUnit::Statement {
            sql,
            params,
        }) {
            Ok(()) => {
                self.shared.stats.record(StatEvent::Enqueued);
                Ok(())
            }
            Err(TrySendError::Full(_unit)) => {
                self.shared.stats.record(StatEvent::Rejected);
                Err(ReplicationError::QueueFull("writer queue at capacity; retryable".to_string()))
            }
            Err(TrySendError::Disconnected(_unit)) => {
                self.shared.stats.record(StatEvent::Rejected);
                Err(ReplicationError::ShutdownInProgress)
            }
        }
    }

    /// Enqueues a Rotate behind every unit already queued.
    ///
    /// A Rotate that finds the pair already serving the clock's period is
    /// skipped, so repeated requests rotate at most once per month.
    pub(crate) fn request_rotation(&self) -> Result<(), ReplicationError> {
        self.admit()?;
        self.shared.rotation_pending.store(true, Ordering::Release);
        self.send(WorkUnit::Rotate).inspect_err(|_| {
            self.shared.rotation_pending.store(false, Ordering::Release);
        })
    }

    /// Enqueues a barrier and waits until the writer reaches it.
    pub(crate) fn flush(&self) -> Result<(), ReplicationError> {
        if self.shared.is_shutting_down() {
            return Err(ReplicationError::ShutdownInProgress);
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.sender
            .send(WorkUnit::Flush(reply_tx))
            .map_err(|_| ReplicationError::ShutdownInProgress)?;
        reply_rx.recv().map_err(|_| ReplicationError::ShutdownInProgress)
    }

    /// Marks shutdown as begun and enqueues the sentinel.
    ///
    /// Returns false when shutdown had already begun.
    pub(crate) fn begin_shutdown(&self, drain: bool) -> bool {
        if self.shared.shutting_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        if !drain {
            self.shared.abandon.store(true, Ordering::Release);
        }
        if self.sender.send(WorkUnit::Shutdown).is_err() {
            warn!("writer already stopped before shutdown was requested");
        }
        info!(drain, "shutdown requested");
        true
    }

    /// Refuses work after shutdown or a fatal fault.
    fn admit(&self) -> Result<(), ReplicationError> {
        if self.shared.is_shutting_down() {
            self.shared.stats.record(StatEvent::Rejected);
            return Err(ReplicationError::ShutdownInProgress);
        }
        if self.shared.is_faulted() {
            self.shared.stats.record(StatEvent::Rejected);
            return Err(ReplicationError::QueueFull(
                "writes refused after rotation fault; restart to recover".to_string(),
            ));
        }
        Ok(())
    }

    /// Blocking enqueue.
    fn send(&self, unit: WorkUnit) -> Result<(), ReplicationError> {
        match self.sender.send(unit) {
            Ok(()) => {
                self.shared.stats.record(StatEvent::Enqueued);
                Ok(())
            }
            Err(_) => {
                self.shared.stats.record(StatEvent::Rejected);
                Err(ReplicationError::ShutdownInProgress)
            }
        }
    }
}

// ============================================================================
// SECTION: Writer Thread
// ============================================================================

/// Spawns the writer thread.
///
/// `requeue` lets the writer enqueue the Rotate it schedules itself.
pub(crate) fn spawn_writer(
    shared: Arc<WriterShared>,
    receiver: Receiver<WorkUnit>,
    requeue: SyncSender<WorkUnit>,
) -> Result<JoinHandle<()>, ReplicationError> {
    thread::Builder::new()
        .name(WRITER_THREAD_NAME.to_string())
        .spawn(move || writer_loop(&shared, &receiver, &requeue))
        .map_err(|err| ReplicationError::io("spawn writer thread", &err))
}

/// Processes units until the Shutdown sentinel or disconnect.
fn writer_loop(shared: &WriterShared, receiver: &Receiver<WorkUnit>, requeue: &SyncSender<WorkUnit>) {
    debug!("writer started");
    while let Ok(unit) = receiver.recv() {
        match unit {
            WorkUnit::Statement {
                sql,
                params,
            } => {
                if shared.is_faulted() || shared.abandon.load(Ordering::Acquire) {
                    shared.stats.record(StatEvent::Discarded);
                    continue;
                }
                apply_statement(shared, &sql, &params);
                schedule_rollover(shared, requeue);
            }
            WorkUnit::Rotate => run_rotation(shared),
            WorkUnit::Flush(reply) => {
                if reply.send(()).is_err() {
                    warn!("flush waiter left before the barrier was reached");
                }
            }
            WorkUnit::Shutdown => {
                stop(shared, receiver);
                return;
            }
        }
    }
    debug!("writer queue disconnected");
}

/// Applies one statement under the shared lock and records the outcome.
fn apply_statement(shared: &WriterShared, sql: &str, params: &[Value]) {
    let stores = shared.stores.read().unwrap_or_else(PoisonError::into_inner);
    match stores.apply(sql, params) {
        Ok(StatementOutcome::Applied) => shared.stats.record(StatEvent::Applied),
        Ok(StatementOutcome::PrimaryFailed(err)) => {
            error!(error = %err, "statement failed on primary; dropped");
            shared.stats.record(StatEvent::Failed);
        }
        Ok(StatementOutcome::BackupFailed(err)) => {
            error!(
                period = %stores.backup_period(),
                error = %err,
                "statement reached primary but not backup; stores diverge until rotation"
            );
            shared.stats.record(StatEvent::Diverged);
        }
        Err(err) => {
            error!(error = %err, "statement could not be applied");
            shared.stats.record(StatEvent::Failed);
        }
    }
}

/// Queues one Rotate when the clock has moved past the open backup's month.
fn schedule_rollover(shared: &WriterShared, requeue: &SyncSender<WorkUnit>) {
    if !shared.retention.rotates() || shared.rotation_pending.load(Ordering::Acquire) {
        return;
    }
    let current = match shared.clock.current_period() {
        Ok(period) => period,
        Err(err) => {
            warn!(error = %err, "clock period unavailable; rollover check skipped");
            return;
        }
    };
    let open = shared.stores.read().unwrap_or_else(PoisonError::into_inner).backup_period();
    if current <= open {
        return;
    }
    // Raised only once the unit is queued.
    match requeue.try_send(WorkUnit::Rotate) {
        Ok(()) => {
            shared.rotation_pending.store(true, Ordering::Release);
            info!(%open, %current, "month rollover observed; rotation queued");
        }
        Err(_) => debug!(%open, %current, "queue full; rollover check deferred"),
    }
}

/// Runs a rotation under the exclusive lock.
fn run_rotation(shared: &WriterShared) {
    if shared.is_faulted() || shared.abandon.load(Ordering::Acquire) {
        debug!("rotation skipped; writer is faulted or abandoning");
        shared.rotation_pending.store(false, Ordering::Release);
        return;
    }
    let mut stores = shared.stores.write().unwrap_or_else(PoisonError::into_inner);
    match shared.clock.current_period() {
        Ok(target) => match rotate(&mut stores, target, shared.retention) {
            Ok(RotationOutcome::Rotated {
                closed,
                opened,
                compressed,
                swept,
            }) => {
                shared.stats.record(StatEvent::Rotated);
                shared.stats.record_archives(u64::from(compressed), swept);
                debug!(%closed, %opened, "writer resumed on new period");
            }
            Ok(RotationOutcome::Skipped) => {}
            Err(failure) => {
                shared.stats.record(StatEvent::RotationFault);
                if failure.fatal {
                    shared.latch_fault();
                    error!(
                        state = failure.state.as_str(),
                        error = %failure.error,
                        "rotation fault; writes refused until restart"
                    );
                } else {
                    warn!(
                        state = failure.state.as_str(),
                        error = %failure.error,
                        "rotation failed and was rolled back"
                    );
                }
            }
        },
        Err(err) => {
            shared.stats.record(StatEvent::RotationFault);
            warn!(error = %err, "clock period unavailable; rotation skipped");
        }
    }
    drop(stores);
    shared.rotation_pending.store(false, Ordering::Release);
}

/// Closes the pair and discards anything queued behind the sentinel.
fn stop(shared: &WriterShared, receiver: &Receiver<WorkUnit>) {
    shared.stores.write().unwrap_or_else(PoisonError::into_inner).close();
    let mut discarded = 0_u64;
    while let Ok(unit) = receiver.try_recv() {
        if matches!(unit, WorkUnit::Statement { .. } | WorkUnit::Rotate) {
            shared.stats.record(StatEvent::Discarded);
            discarded = discarded.saturating_add(1);
        }
    }
    info!(discarded, "writer stopped; store pair closed");
}
