use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TableId, TxnId, INVALID_TXN_ID};
use crate::transaction::concurrency::deadlock;
use crate::transaction::concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionError, TransactionState,
};

/// Multi-granularity lock modes over tables and rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    /// The standard multi-granularity compatibility matrix
    pub fn compatible_with(self, other: LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (IntentionShared, Exclusive) | (Exclusive, IntentionShared) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (Shared, Shared) => true,
            _ => false,
        }
    }

    /// The upgrade lattice; self-transitions are not upgrades
    pub fn can_upgrade_to(self, target: LockMode) -> bool {
        use LockMode::*;
        matches!(
            (self, target),
            (IntentionShared, Shared)
                | (IntentionShared, Exclusive)
                | (IntentionShared, IntentionExclusive)
                | (IntentionShared, SharedIntentionExclusive)
                | (Shared, Exclusive)
                | (Shared, SharedIntentionExclusive)
                | (IntentionExclusive, Exclusive)
                | (IntentionExclusive, SharedIntentionExclusive)
                | (SharedIntentionExclusive, Exclusive)
        )
    }
}

/// One entry in a resource's request queue
pub(crate) struct LockRequest {
    pub(crate) txn: Arc<Transaction>,
    pub(crate) mode: LockMode,
    pub(crate) granted: bool,
}

pub(crate) struct QueueState {
    pub(crate) requests: Vec<LockRequest>,
    /// The transaction currently upgrading its lock, or INVALID_TXN_ID
    pub(crate) upgrading: TxnId,
}

/// Per-resource FIFO queue with a condition variable for blocked waiters
pub(crate) struct LockRequestQueue {
    pub(crate) state: Mutex<QueueState>,
    pub(crate) cond: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                requests: Vec::new(),
                upgrading: INVALID_TXN_ID,
            }),
            cond: Condvar::new(),
        }
    }
}

/// The lock tables shared between the manager and the deadlock detector
pub(crate) struct LockTables {
    pub(crate) table_locks: Mutex<HashMap<TableId, Arc<LockRequestQueue>>>,
    pub(crate) row_locks: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
    /// Held for the duration of a detection pass
    pub(crate) waits_for_latch: Mutex<()>,
}

pub(crate) struct DetectorShutdown {
    pub(crate) flag: Mutex<bool>,
    pub(crate) cond: Condvar,
}

/// Hierarchical two-phase lock manager.
///
/// Each table and row has a FIFO request queue; acquisition validates the
/// transaction's phase and isolation level, handles upgrades through a
/// single-slot upgrade reservation, and blocks on the queue's condition
/// variable until the grant predicate holds. A background thread rebuilds
/// the wait-for graph every `detection_interval` and aborts the highest-id
/// transaction on any cycle; the victim wakes, observes ABORTED, and
/// withdraws its own request.
pub struct LockManager {
    tables: Arc<LockTables>,
    shutdown: Arc<DetectorShutdown>,
    detector: Mutex<Option<JoinHandle<()>>>,
}

enum Resource {
    Table(TableId),
    Row(TableId, Rid),
}

impl LockManager {
    pub fn new(detection_interval: Duration) -> Self {
        let tables = Arc::new(LockTables {
            table_locks: Mutex::new(HashMap::new()),
            row_locks: Mutex::new(HashMap::new()),
            waits_for_latch: Mutex::new(()),
        });
        let shutdown = Arc::new(DetectorShutdown {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        });
        let handle = deadlock::spawn(tables.clone(), shutdown.clone(), detection_interval);

        Self {
            tables,
            shutdown,
            detector: Mutex::new(Some(handle)),
        }
    }

    /// Run one synchronous detection pass (the background thread does this
    /// on its timer)
    pub fn run_cycle_detection(&self) {
        deadlock::detect(&self.tables);
    }

    pub fn lock_table(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        table_id: TableId,
    ) -> Result<(), TransactionError> {
        self.validate_table_request(txn, mode)?;
        let queue = Self::queue_for(&self.tables.table_locks, table_id);
        self.acquire(txn, mode, &queue, Resource::Table(table_id))?;
        debug!("txn {} locked table {} in {:?}", txn.id(), table_id, mode);
        Ok(())
    }

    pub fn lock_row(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        table_id: TableId,
        rid: Rid,
    ) -> Result<(), TransactionError> {
        self.validate_row_request(txn, mode, table_id)?;
        let queue = Self::queue_for(&self.tables.row_locks, rid);
        self.acquire(txn, mode, &queue, Resource::Row(table_id, rid))?;
        debug!("txn {} locked row {} in {:?}", txn.id(), rid, mode);
        Ok(())
    }

    pub fn unlock_table(
        &self,
        txn: &Arc<Transaction>,
        table_id: TableId,
    ) -> Result<(), TransactionError> {
        if txn.has_row_locks_on(table_id) {
            return Self::abort(txn, AbortReason::TableUnlockedBeforeUnlockingRows);
        }
        let Some(queue) = Self::existing_queue(&self.tables.table_locks, &table_id) else {
            return Self::abort(txn, AbortReason::AttemptedUnlockButNoLockHeld);
        };
        let mode = {
            let mut state = queue.state.lock();
            let Some(pos) = state
                .requests
                .iter()
                .position(|r| r.txn.id() == txn.id() && r.granted)
            else {
                drop(state);
                return Self::abort(txn, AbortReason::AttemptedUnlockButNoLockHeld);
            };
            let mode = state.requests[pos].mode;
            state.requests.remove(pos);
            queue.cond.notify_all();
            mode
        };

        self.transition_on_unlock(txn, mode);
        txn.remove_table_lock(mode, table_id);
        debug!("txn {} unlocked table {}", txn.id(), table_id);
        Ok(())
    }

    pub fn unlock_row(
        &self,
        txn: &Arc<Transaction>,
        table_id: TableId,
        rid: Rid,
    ) -> Result<(), TransactionError> {
        let Some(queue) = Self::existing_queue(&self.tables.row_locks, &rid) else {
            return Self::abort(txn, AbortReason::AttemptedUnlockButNoLockHeld);
        };
        let mode = {
            let mut state = queue.state.lock();
            let Some(pos) = state
                .requests
                .iter()
                .position(|r| r.txn.id() == txn.id() && r.granted)
            else {
                drop(state);
                return Self::abort(txn, AbortReason::AttemptedUnlockButNoLockHeld);
            };
            let mode = state.requests[pos].mode;
            state.requests.remove(pos);
            queue.cond.notify_all();
            mode
        };

        self.transition_on_unlock(txn, mode);
        txn.remove_row_lock(mode, table_id, rid);
        debug!("txn {} unlocked row {}", txn.id(), rid);
        Ok(())
    }

    /// Release every lock a finished transaction still holds, bypassing
    /// 2PL validation and state transitions. Rows first so the row-check
    /// invariant of `unlock_table` is never violated mid-release.
    pub(crate) fn release_all(&self, txn: &Arc<Transaction>) {
        let (tables, rows) = txn.take_all_locks();
        for (_, rid, _) in rows {
            if let Some(queue) = Self::existing_queue(&self.tables.row_locks, &rid) {
                Self::withdraw(&queue, txn.id());
            }
        }
        for (table_id, _) in tables {
            if let Some(queue) = Self::existing_queue(&self.tables.table_locks, &table_id) {
                Self::withdraw(&queue, txn.id());
            }
        }
    }

    fn withdraw(queue: &LockRequestQueue, txn_id: TxnId) {
        let mut state = queue.state.lock();
        state.requests.retain(|r| r.txn.id() != txn_id);
        if state.upgrading == txn_id {
            state.upgrading = INVALID_TXN_ID;
        }
        queue.cond.notify_all();
    }

    /// Mark the transaction aborted, then raise the reason
    fn abort(txn: &Arc<Transaction>, reason: AbortReason) -> Result<(), TransactionError> {
        txn.set_state(TransactionState::Aborted);
        Err(TransactionError::Abort {
            txn_id: txn.id(),
            reason,
        })
    }

    fn validate_table_request(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
    ) -> Result<(), TransactionError> {
        let state = txn.state();
        match state {
            TransactionState::Committed | TransactionState::Aborted => {
                Err(TransactionError::InvalidState {
                    txn_id: txn.id(),
                    state,
                })
            }
            TransactionState::Growing | TransactionState::Shrinking => {
                if txn.isolation_level() == IsolationLevel::ReadUncommitted
                    && matches!(
                        mode,
                        LockMode::Shared
                            | LockMode::IntentionShared
                            | LockMode::SharedIntentionExclusive
                    )
                {
                    return Self::abort(txn, AbortReason::LockSharedOnReadUncommitted);
                }
                if state == TransactionState::Shrinking {
                    let allowed = txn.isolation_level() == IsolationLevel::ReadCommitted
                        && matches!(mode, LockMode::Shared | LockMode::IntentionShared);
                    if !allowed {
                        return Self::abort(txn, AbortReason::LockOnShrinking);
                    }
                }
                Ok(())
            }
        }
    }

    fn validate_row_request(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        table_id: TableId,
    ) -> Result<(), TransactionError> {
        if !matches!(mode, LockMode::Shared | LockMode::Exclusive) {
            return Err(TransactionError::IntentionLockOnRow(txn.id()));
        }
        let state = txn.state();
        match state {
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(TransactionError::InvalidState {
                    txn_id: txn.id(),
                    state,
                });
            }
            TransactionState::Growing | TransactionState::Shrinking => {
                if txn.isolation_level() == IsolationLevel::ReadUncommitted
                    && mode == LockMode::Shared
                {
                    return Self::abort(txn, AbortReason::LockSharedOnReadUncommitted);
                }
                if state == TransactionState::Shrinking {
                    let allowed = txn.isolation_level() == IsolationLevel::ReadCommitted
                        && mode == LockMode::Shared;
                    if !allowed {
                        return Self::abort(txn, AbortReason::LockOnShrinking);
                    }
                }
            }
        }

        // Hierarchical prerequisite: a row lock needs cover from a table lock
        let table_mode = txn.table_lock_mode(table_id);
        let covered = match mode {
            LockMode::Exclusive => matches!(
                table_mode,
                Some(
                    LockMode::IntentionExclusive
                        | LockMode::Exclusive
                        | LockMode::SharedIntentionExclusive
                )
            ),
            LockMode::Shared => table_mode.is_some(),
            _ => unreachable!(),
        };
        if !covered {
            return Self::abort(txn, AbortReason::TableLockNotPresent);
        }
        Ok(())
    }

    fn acquire(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        queue: &Arc<LockRequestQueue>,
        resource: Resource,
    ) -> Result<(), TransactionError> {
        let mut state = queue.state.lock();

        if let Some(pos) = state.requests.iter().position(|r| r.txn.id() == txn.id()) {
            let old_mode = state.requests[pos].mode;
            if old_mode == mode {
                return Ok(());
            }
            if state.upgrading != INVALID_TXN_ID {
                drop(state);
                return Self::abort(txn, AbortReason::UpgradeConflict);
            }
            if !old_mode.can_upgrade_to(mode) {
                drop(state);
                return Self::abort(txn, AbortReason::IncompatibleUpgrade);
            }
            // Reserve the upgrade slot, drop the old lock, re-queue at the
            // tail; the grant policy gives the upgrader priority.
            state.upgrading = txn.id();
            match &resource {
                Resource::Table(table_id) => txn.remove_table_lock(old_mode, *table_id),
                Resource::Row(table_id, rid) => txn.remove_row_lock(old_mode, *table_id, *rid),
            }
            state.requests.remove(pos);
            state.requests.push(LockRequest {
                txn: txn.clone(),
                mode,
                granted: false,
            });
        } else {
            state.requests.push(LockRequest {
                txn: txn.clone(),
                mode,
                granted: false,
            });
        }

        loop {
            if txn.state() == TransactionState::Aborted {
                // Aborted while waiting (deadlock victim): withdraw
                if state.upgrading == txn.id() {
                    state.upgrading = INVALID_TXN_ID;
                }
                state.requests.retain(|r| r.txn.id() != txn.id());
                queue.cond.notify_all();
                drop(state);
                return Err(TransactionError::Abort {
                    txn_id: txn.id(),
                    reason: AbortReason::Deadlock,
                });
            }
            if Self::grantable(&state, txn.id()) {
                let pos = state
                    .requests
                    .iter()
                    .position(|r| r.txn.id() == txn.id())
                    .expect("request present until granted");
                state.requests[pos].granted = true;
                if state.upgrading == txn.id() {
                    state.upgrading = INVALID_TXN_ID;
                }
                break;
            }
            queue.cond.wait(&mut state);
        }

        match resource {
            Resource::Table(table_id) => txn.add_table_lock(mode, table_id),
            Resource::Row(table_id, rid) => txn.add_row_lock(mode, table_id, rid),
        }
        queue.cond.notify_all();
        Ok(())
    }

    /// Grant predicate, re-checked by each waiter on wake: compatible with
    /// every granted request, FIFO over earlier waiters, and the upgrading
    /// transaction (if any) goes first.
    fn grantable(state: &QueueState, txn_id: TxnId) -> bool {
        let Some(pos) = state.requests.iter().position(|r| r.txn.id() == txn_id) else {
            return false;
        };
        let my_mode = state.requests[pos].mode;

        let compatible = state
            .requests
            .iter()
            .filter(|r| r.granted && r.txn.id() != txn_id)
            .all(|r| my_mode.compatible_with(r.mode));
        if !compatible {
            return false;
        }
        if state.upgrading != INVALID_TXN_ID {
            return state.upgrading == txn_id;
        }
        state.requests[..pos].iter().all(|r| r.granted)
    }

    /// First qualifying unlock ends the growing phase, per isolation level
    fn transition_on_unlock(&self, txn: &Arc<Transaction>, mode: LockMode) {
        if txn.state() != TransactionState::Growing {
            return;
        }
        let shrink = match txn.isolation_level() {
            IsolationLevel::RepeatableRead => {
                matches!(mode, LockMode::Shared | LockMode::Exclusive)
            }
            IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
                mode == LockMode::Exclusive
            }
        };
        if shrink {
            txn.set_state(TransactionState::Shrinking);
            debug!("txn {} entered SHRINKING", txn.id());
        }
    }

    fn queue_for<K: Eq + Hash + Copy>(
        map: &Mutex<HashMap<K, Arc<LockRequestQueue>>>,
        key: K,
    ) -> Arc<LockRequestQueue> {
        map.lock()
            .entry(key)
            .or_insert_with(|| Arc::new(LockRequestQueue::new()))
            .clone()
    }

    fn existing_queue<K: Eq + Hash>(
        map: &Mutex<HashMap<K, Arc<LockRequestQueue>>>,
        key: &K,
    ) -> Option<Arc<LockRequestQueue>> {
        map.lock().get(key).cloned()
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        {
            let mut flag = self.shutdown.flag.lock();
            *flag = true;
            self.shutdown.cond.notify_all();
        }
        if let Some(handle) = self.detector.lock().take() {
            let _ = handle.join();
        }
    }
}
