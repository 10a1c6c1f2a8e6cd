use std::collections::VecDeque;
use std::sync::Arc;

use crate::catalog::TableInfo;
use crate::common::types::Rid;
use crate::query::executor::result::{QueryResult, Tuple};
use crate::query::executor::{Executor, ExecutorContext};
use crate::transaction::{IsolationLevel, LockMode};

/// Sequential scan over a table heap.
///
/// Locking depends on the isolation level: IS on the table at init unless
/// READ_UNCOMMITTED; READ_COMMITTED additionally takes S on each row for
/// the duration of the read; REPEATABLE_READ relies on the table IS
/// together with writers' row X locks.
pub struct SeqScanExecutor {
    ctx: ExecutorContext,
    table_name: String,
    table: Option<Arc<TableInfo>>,
    predicate: Option<Box<dyn Fn(&Tuple) -> bool + Send>>,
    rows: VecDeque<(Rid, Tuple)>,
}

impl SeqScanExecutor {
    pub fn new(ctx: ExecutorContext, table_name: impl Into<String>) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            table: None,
            predicate: None,
            rows: VecDeque::new(),
        }
    }

    /// Residual predicate pushed down into the scan
    pub fn with_predicate(mut self, predicate: Box<dyn Fn(&Tuple) -> bool + Send>) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> QueryResult<()> {
        let table = self.ctx.table(&self.table_name)?;

        let txn = &self.ctx.txn;
        if txn.isolation_level() != IsolationLevel::ReadUncommitted
            && txn.table_lock_mode(table.id).is_none()
        {
            self.ctx
                .lock_manager
                .lock_table(txn, LockMode::IntentionShared, table.id)?;
        }

        self.rows = table.heap.scan().into();
        self.table = Some(table);
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let table = self.table.as_ref().expect("init called");

        while let Some((rid, _)) = self.rows.pop_front() {
            let tuple = match self.ctx.txn.isolation_level() {
                IsolationLevel::ReadCommitted => {
                    // Lock, re-read, release: reads see only committed rows
                    self.ctx.lock_manager.lock_row(
                        &self.ctx.txn,
                        LockMode::Shared,
                        table.id,
                        rid,
                    )?;
                    let current = table.heap.get(rid);
                    self.ctx
                        .lock_manager
                        .unlock_row(&self.ctx.txn, table.id, rid)?;
                    match current {
                        Some(tuple) => tuple,
                        None => continue,
                    }
                }
                IsolationLevel::ReadUncommitted | IsolationLevel::RepeatableRead => {
                    match table.heap.get(rid) {
                        Some(tuple) => tuple,
                        None => continue,
                    }
                }
            };

            if let Some(predicate) = &self.predicate {
                if !predicate(&tuple) {
                    continue;
                }
            }
            return Ok(Some((tuple, rid)));
        }
        Ok(None)
    }
}
