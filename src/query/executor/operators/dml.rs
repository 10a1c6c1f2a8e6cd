use std::sync::Arc;

use crate::catalog::{DataValue, IndexInfo, TableInfo, Tuple};
use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::QueryResult;
use crate::query::executor::{BoxedExecutor, Executor, ExecutorContext};
use crate::transaction::{LockMode, WriteRecord, WriteType};

fn count_tuple(count: i64) -> (Tuple, Rid) {
    (
        Tuple::new(vec![DataValue::Integer(count)]),
        Rid::new(INVALID_PAGE_ID, 0),
    )
}

/// Take IX on the table unless the transaction already holds a mode that
/// covers writes.
fn lock_table_for_write(ctx: &ExecutorContext, table: &TableInfo) -> QueryResult<()> {
    let held = ctx.txn.table_lock_mode(table.id);
    if !matches!(
        held,
        Some(LockMode::IntentionExclusive)
            | Some(LockMode::Exclusive)
            | Some(LockMode::SharedIntentionExclusive)
    ) {
        ctx.lock_manager
            .lock_table(&ctx.txn, LockMode::IntentionExclusive, table.id)?;
    }
    Ok(())
}

/// Insert every child row into the table, mirroring each into the
/// table's indexes, and emit a single count tuple.
pub struct InsertExecutor {
    ctx: ExecutorContext,
    table_name: String,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    child: BoxedExecutor,
    done: bool,
}

impl InsertExecutor {
    pub fn new(ctx: ExecutorContext, table_name: impl Into<String>, child: BoxedExecutor) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            table: None,
            indexes: Vec::new(),
            child,
            done: false,
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> QueryResult<()> {
        let table = self.ctx.table(&self.table_name)?;
        lock_table_for_write(&self.ctx, &table)?;
        self.indexes = self.ctx.catalog.read().indexes_for_table(table.id);
        self.table = Some(table);
        self.child.init()?;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        let table = self.table.as_ref().expect("init called");
        let txn = &self.ctx.txn;

        let mut count = 0i64;
        while let Some((tuple, _)) = self.child.next()? {
            let rid = table.heap.insert(tuple.clone());
            self.ctx
                .lock_manager
                .lock_row(txn, LockMode::Exclusive, table.id, rid)?;

            txn.append_write_record(WriteRecord::Table {
                table_id: table.id,
                heap: table.heap.clone(),
                rid,
                write_type: WriteType::Insert,
                old_tuple: None,
            });

            for index in &self.indexes {
                if let Some(key) = index.key_of(&tuple) {
                    index.tree.insert(key, rid)?;
                    txn.append_write_record(WriteRecord::Index {
                        tree: index.tree.clone(),
                        key,
                        rid,
                        write_type: WriteType::Insert,
                    });
                }
            }
            count += 1;
        }

        self.done = true;
        Ok(Some(count_tuple(count)))
    }
}

/// Apply a transform to every child row, updating the heap in place and
/// refreshing index entries with a delete-then-insert.
pub struct UpdateExecutor {
    ctx: ExecutorContext,
    table_name: String,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    child: BoxedExecutor,
    transform: Box<dyn Fn(&Tuple) -> Tuple + Send>,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(
        ctx: ExecutorContext,
        table_name: impl Into<String>,
        child: BoxedExecutor,
        transform: Box<dyn Fn(&Tuple) -> Tuple + Send>,
    ) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            table: None,
            indexes: Vec::new(),
            child,
            transform,
            done: false,
        }
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> QueryResult<()> {
        let table = self.ctx.table(&self.table_name)?;
        lock_table_for_write(&self.ctx, &table)?;
        self.indexes = self.ctx.catalog.read().indexes_for_table(table.id);
        self.table = Some(table);
        self.child.init()?;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        let table = self.table.as_ref().expect("init called");
        let txn = &self.ctx.txn;

        let mut count = 0i64;
        while let Some((old, rid)) = self.child.next()? {
            self.ctx
                .lock_manager
                .lock_row(txn, LockMode::Exclusive, table.id, rid)?;

            let new = (self.transform)(&old);
            let Some(previous) = table.heap.update(rid, new.clone()) else {
                continue;
            };

            txn.append_write_record(WriteRecord::Table {
                table_id: table.id,
                heap: table.heap.clone(),
                rid,
                write_type: WriteType::Update,
                old_tuple: Some(previous.clone()),
            });

            for index in &self.indexes {
                if let Some(old_key) = index.key_of(&previous) {
                    index.tree.remove(&old_key)?;
                    txn.append_write_record(WriteRecord::Index {
                        tree: index.tree.clone(),
                        key: old_key,
                        rid,
                        write_type: WriteType::Delete,
                    });
                }
                if let Some(new_key) = index.key_of(&new) {
                    index.tree.insert(new_key, rid)?;
                    txn.append_write_record(WriteRecord::Index {
                        tree: index.tree.clone(),
                        key: new_key,
                        rid,
                        write_type: WriteType::Insert,
                    });
                }
            }
            count += 1;
        }

        self.done = true;
        Ok(Some(count_tuple(count)))
    }
}

/// Delete every child row from the heap and from every index.
pub struct DeleteExecutor {
    ctx: ExecutorContext,
    table_name: String,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    child: BoxedExecutor,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(ctx: ExecutorContext, table_name: impl Into<String>, child: BoxedExecutor) -> Self {
        Self {
            ctx,
            table_name: table_name.into(),
            table: None,
            indexes: Vec::new(),
            child,
            done: false,
        }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> QueryResult<()> {
        let table = self.ctx.table(&self.table_name)?;
        lock_table_for_write(&self.ctx, &table)?;
        self.indexes = self.ctx.catalog.read().indexes_for_table(table.id);
        self.table = Some(table);
        self.child.init()?;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        let table = self.table.as_ref().expect("init called");
        let txn = &self.ctx.txn;

        let mut count = 0i64;
        while let Some((_, rid)) = self.child.next()? {
            self.ctx
                .lock_manager
                .lock_row(txn, LockMode::Exclusive, table.id, rid)?;

            let Some(old) = table.heap.mark_delete(rid) else {
                continue;
            };

            txn.append_write_record(WriteRecord::Table {
                table_id: table.id,
                heap: table.heap.clone(),
                rid,
                write_type: WriteType::Delete,
                old_tuple: Some(old.clone()),
            });

            for index in &self.indexes {
                if let Some(key) = index.key_of(&old) {
                    index.tree.remove(&key)?;
                    txn.append_write_record(WriteRecord::Index {
                        tree: index.tree.clone(),
                        key,
                        rid,
                        write_type: WriteType::Delete,
                    });
                }
            }
            count += 1;
        }

        self.done = true;
        Ok(Some(count_tuple(count)))
    }
}
