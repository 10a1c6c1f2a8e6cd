use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState, WriteRecord, WriteType,
};

/// Creates, tracks, and finalizes transactions. Commit and abort both end
/// with every lock released; abort first undoes the write set in reverse.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
    active: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            lock_manager,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Begin a transaction at the given isolation level
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active.lock().insert(txn_id, txn.clone());
        debug!("began txn {} at {:?}", txn_id, isolation_level);
        txn
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active.lock().get(&txn_id).cloned()
    }

    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Growing | TransactionState::Shrinking => {}
            state => {
                return Err(TransactionError::InvalidState {
                    txn_id: txn.id(),
                    state,
                });
            }
        }

        txn.set_state(TransactionState::Committed);
        // The changes stay; the undo information is no longer needed
        txn.take_write_set();
        self.lock_manager.release_all(txn);
        self.active.lock().remove(&txn.id());
        debug!("committed txn {}", txn.id());
        Ok(())
    }

    /// Abort a transaction: undo its writes (heap and indexes) in reverse
    /// order, release its locks, and retire it. Finalizing a transaction
    /// the deadlock detector already marked ABORTED comes through here too.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Growing | TransactionState::Shrinking | TransactionState::Aborted => {
            }
            state => {
                return Err(TransactionError::InvalidState {
                    txn_id: txn.id(),
                    state,
                });
            }
        }

        txn.set_state(TransactionState::Aborted);
        let write_set = txn.take_write_set();
        for record in write_set.into_iter().rev() {
            match record {
                WriteRecord::Table {
                    heap,
                    rid,
                    write_type,
                    old_tuple,
                    ..
                } => match write_type {
                    WriteType::Insert => {
                        heap.mark_delete(rid);
                    }
                    WriteType::Delete => {
                        if let Some(old) = old_tuple {
                            heap.restore(rid, old);
                        }
                    }
                    WriteType::Update => {
                        if let Some(old) = old_tuple {
                            heap.update(rid, old);
                        }
                    }
                },
                WriteRecord::Index {
                    tree,
                    key,
                    rid,
                    write_type,
                } => {
                    let result = match write_type {
                        WriteType::Insert => tree.remove(&key).map(|_| ()),
                        WriteType::Delete => tree.insert(key, rid).map(|_| ()),
                        // Updates are recorded as delete-then-insert pairs
                        WriteType::Update => Ok(()),
                    };
                    if let Err(e) = result {
                        warn!("index undo failed for txn {}: {}", txn.id(), e);
                    }
                }
            }
        }

        self.lock_manager.release_all(txn);
        self.active.lock().remove(&txn.id());
        debug!("aborted txn {}", txn.id());
        Ok(())
    }
}
