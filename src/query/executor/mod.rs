// Iterator-model query execution.
//
// Every operator exposes `init` then repeated `next`, producing a finite
// stream of (tuple, rid) pairs. Operators that touch storage acquire
// their locks through the context's lock manager and maintain index
// entries alongside heap mutations.

pub mod operators;
pub mod result;

use std::sync::Arc;
use parking_lot::RwLock;

use crate::catalog::{Catalog, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::result::{QueryError, QueryResult, Tuple};
use crate::storage::buffer::BufferPoolManager;
use crate::transaction::{LockManager, Transaction, TransactionManager};

/// The interface every execution operator implements
pub trait Executor: Send {
    /// Prepare for execution; locks that cover the whole operator are
    /// taken here.
    fn init(&mut self) -> QueryResult<()>;

    /// Produce the next output row, or `None` when exhausted
    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>>;
}

pub type BoxedExecutor = Box<dyn Executor>;

/// Everything an executor needs from its environment, passed explicitly
/// instead of living in process-wide globals.
#[derive(Clone)]
pub struct ExecutorContext {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub catalog: Arc<RwLock<Catalog>>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    pub txn: Arc<Transaction>,
}

impl ExecutorContext {
    pub fn table(&self, name: &str) -> QueryResult<Arc<TableInfo>> {
        self.catalog
            .read()
            .table(name)
            .ok_or_else(|| QueryError::TableNotFound(name.to_string()))
    }
}

/// Drain an executor into a vector (init + next until exhausted)
pub fn collect(executor: &mut dyn Executor) -> QueryResult<Vec<Tuple>> {
    executor.init()?;
    let mut rows = Vec::new();
    while let Some((tuple, _)) = executor.next()? {
        rows.push(tuple);
    }
    Ok(rows)
}
