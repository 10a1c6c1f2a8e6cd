// Pessimistic transaction processing: two-phase locking over a
// hierarchical lock table with background deadlock detection.

pub mod concurrency;

pub use concurrency::lock_manager::{LockManager, LockMode};
pub use concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionError, TransactionState, WriteRecord,
    WriteType,
};
pub use concurrency::transaction_manager::TransactionManager;
