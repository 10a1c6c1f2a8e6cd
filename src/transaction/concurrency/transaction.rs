use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::catalog::table::TableHeap;
use crate::catalog::Tuple;
use crate::common::types::{Rid, TableId, TxnId};
use crate::index::btree::BPlusTree;
use crate::transaction::concurrency::lock_manager::LockMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking state machine. GROWING is the initial phase; the
/// first qualifying unlock moves a transaction to SHRINKING; COMMITTED
/// and ABORTED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Why a lock request aborted its transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockSharedOnReadUncommitted,
    LockOnShrinking,
    IncompatibleUpgrade,
    UpgradeConflict,
    TableUnlockedBeforeUnlockingRows,
    AttemptedUnlockButNoLockHeld,
    TableLockNotPresent,
    Deadlock,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbortReason::LockSharedOnReadUncommitted => "LOCK_SHARED_ON_READ_UNCOMMITTED",
            AbortReason::LockOnShrinking => "LOCK_ON_SHRINKING",
            AbortReason::IncompatibleUpgrade => "INCOMPATIBLE_UPGRADE",
            AbortReason::UpgradeConflict => "UPGRADE_CONFLICT",
            AbortReason::TableUnlockedBeforeUnlockingRows => {
                "TABLE_UNLOCKED_BEFORE_UNLOCKING_ROWS"
            }
            AbortReason::AttemptedUnlockButNoLockHeld => "ATTEMPTED_UNLOCK_BUT_NO_LOCK_HELD",
            AbortReason::TableLockNotPresent => "TABLE_LOCK_NOT_PRESENT",
            AbortReason::Deadlock => "DEADLOCK",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug)]
pub enum TransactionError {
    /// The transaction was marked ABORTED before this error was raised
    #[error("Transaction {txn_id} aborted: {reason}")]
    Abort { txn_id: TxnId, reason: AbortReason },

    #[error("Transaction {0} not found")]
    NotFound(TxnId),

    #[error("Invalid operation on transaction {txn_id} in state {state:?}")]
    InvalidState {
        txn_id: TxnId,
        state: TransactionState,
    },

    #[error("Intention lock modes are illegal on rows (transaction {0})")]
    IntentionLockOnRow(TxnId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Insert,
    Delete,
    Update,
}

/// Undo information captured by the write executors. Abort replays these
/// backwards; commit discards them.
pub enum WriteRecord {
    Table {
        table_id: TableId,
        heap: Arc<TableHeap>,
        rid: Rid,
        write_type: WriteType,
        old_tuple: Option<Tuple>,
    },
    Index {
        tree: Arc<BPlusTree<i64>>,
        key: i64,
        rid: Rid,
        write_type: WriteType,
    },
}

/// Per-mode lock bookkeeping. The lock manager is the only writer; the
/// sets mirror exactly the granted requests in its queues.
#[derive(Default)]
pub struct TransactionLockSets {
    pub shared_tables: HashSet<TableId>,
    pub exclusive_tables: HashSet<TableId>,
    pub intention_shared_tables: HashSet<TableId>,
    pub intention_exclusive_tables: HashSet<TableId>,
    pub shared_intention_exclusive_tables: HashSet<TableId>,
    pub shared_rows: HashMap<TableId, HashSet<Rid>>,
    pub exclusive_rows: HashMap<TableId, HashSet<Rid>>,
}

impl TransactionLockSets {
    fn table_set_mut(&mut self, mode: LockMode) -> &mut HashSet<TableId> {
        match mode {
            LockMode::Shared => &mut self.shared_tables,
            LockMode::Exclusive => &mut self.exclusive_tables,
            LockMode::IntentionShared => &mut self.intention_shared_tables,
            LockMode::IntentionExclusive => &mut self.intention_exclusive_tables,
            LockMode::SharedIntentionExclusive => &mut self.shared_intention_exclusive_tables,
        }
    }

    fn row_map_mut(&mut self, mode: LockMode) -> &mut HashMap<TableId, HashSet<Rid>> {
        match mode {
            LockMode::Shared => &mut self.shared_rows,
            LockMode::Exclusive => &mut self.exclusive_rows,
            _ => unreachable!("intention modes are rejected before bookkeeping"),
        }
    }
}

/// A transaction owned by the `TransactionManager` and shared with every
/// component that acts on its behalf.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: RwLock<TransactionState>,
    lock_sets: Mutex<TransactionLockSets>,
    write_set: Mutex<Vec<WriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: RwLock::new(TransactionState::Growing),
            lock_sets: Mutex::new(TransactionLockSets::default()),
            write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }

    /// The table lock mode currently held on `table_id`, if any
    pub fn table_lock_mode(&self, table_id: TableId) -> Option<LockMode> {
        let sets = self.lock_sets.lock();
        if sets.exclusive_tables.contains(&table_id) {
            Some(LockMode::Exclusive)
        } else if sets.shared_intention_exclusive_tables.contains(&table_id) {
            Some(LockMode::SharedIntentionExclusive)
        } else if sets.intention_exclusive_tables.contains(&table_id) {
            Some(LockMode::IntentionExclusive)
        } else if sets.shared_tables.contains(&table_id) {
            Some(LockMode::Shared)
        } else if sets.intention_shared_tables.contains(&table_id) {
            Some(LockMode::IntentionShared)
        } else {
            None
        }
    }

    pub fn row_lock_mode(&self, table_id: TableId, rid: Rid) -> Option<LockMode> {
        let sets = self.lock_sets.lock();
        if sets
            .exclusive_rows
            .get(&table_id)
            .map_or(false, |rows| rows.contains(&rid))
        {
            Some(LockMode::Exclusive)
        } else if sets
            .shared_rows
            .get(&table_id)
            .map_or(false, |rows| rows.contains(&rid))
        {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    pub fn has_row_locks_on(&self, table_id: TableId) -> bool {
        let sets = self.lock_sets.lock();
        sets.shared_rows
            .get(&table_id)
            .map_or(false, |rows| !rows.is_empty())
            || sets
                .exclusive_rows
                .get(&table_id)
                .map_or(false, |rows| !rows.is_empty())
    }

    pub(crate) fn add_table_lock(&self, mode: LockMode, table_id: TableId) {
        self.lock_sets.lock().table_set_mut(mode).insert(table_id);
    }

    pub(crate) fn remove_table_lock(&self, mode: LockMode, table_id: TableId) {
        self.lock_sets.lock().table_set_mut(mode).remove(&table_id);
    }

    pub(crate) fn add_row_lock(&self, mode: LockMode, table_id: TableId, rid: Rid) {
        self.lock_sets
            .lock()
            .row_map_mut(mode)
            .entry(table_id)
            .or_default()
            .insert(rid);
    }

    pub(crate) fn remove_row_lock(&self, mode: LockMode, table_id: TableId, rid: Rid) {
        let mut sets = self.lock_sets.lock();
        if let Some(rows) = sets.row_map_mut(mode).get_mut(&table_id) {
            rows.remove(&rid);
        }
    }

    /// Drain every held lock for commit/abort release
    pub(crate) fn take_all_locks(&self) -> (Vec<(TableId, LockMode)>, Vec<(TableId, Rid, LockMode)>) {
        let mut guard = self.lock_sets.lock();
        let sets = &mut *guard;
        let mut tables = Vec::new();
        let mut rows = Vec::new();

        for (mode, set) in [
            (LockMode::Shared, &mut sets.shared_tables),
            (LockMode::Exclusive, &mut sets.exclusive_tables),
            (LockMode::IntentionShared, &mut sets.intention_shared_tables),
            (LockMode::IntentionExclusive, &mut sets.intention_exclusive_tables),
            (
                LockMode::SharedIntentionExclusive,
                &mut sets.shared_intention_exclusive_tables,
            ),
        ] {
            for table_id in set.drain() {
                tables.push((table_id, mode));
            }
        }
        for (mode, map) in [
            (LockMode::Shared, &mut sets.shared_rows),
            (LockMode::Exclusive, &mut sets.exclusive_rows),
        ] {
            for (table_id, rids) in map.drain() {
                for rid in rids {
                    rows.push((table_id, rid, mode));
                }
            }
        }
        (tables, rows)
    }

    pub fn append_write_record(&self, record: WriteRecord) {
        self.write_set.lock().push(record);
    }

    pub(crate) fn take_write_set(&self) -> Vec<WriteRecord> {
        std::mem::take(&mut *self.write_set.lock())
    }

    pub fn write_set_len(&self) -> usize {
        self.write_set.lock().len()
    }
}
