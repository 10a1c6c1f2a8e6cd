use std::collections::VecDeque;
use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::result::{QueryError, QueryResult, Tuple};
use crate::query::executor::{Executor, ExecutorContext};

/// Scan a B+ tree index in key order, materializing each tuple from the
/// owning table's heap. An optional start key turns it into a range scan.
pub struct IndexScanExecutor {
    ctx: ExecutorContext,
    index_name: String,
    start_key: Option<i64>,
    table: Option<Arc<TableInfo>>,
    entries: VecDeque<(i64, Rid)>,
}

impl IndexScanExecutor {
    pub fn new(ctx: ExecutorContext, index_name: impl Into<String>) -> Self {
        Self {
            ctx,
            index_name: index_name.into(),
            start_key: None,
            table: None,
            entries: VecDeque::new(),
        }
    }

    pub fn with_start_key(mut self, key: i64) -> Self {
        self.start_key = Some(key);
        self
    }

    fn index(&self) -> QueryResult<Arc<IndexInfo>> {
        self.ctx
            .catalog
            .read()
            .index(&self.index_name)
            .ok_or_else(|| QueryError::IndexNotFound(self.index_name.clone()))
    }
}

impl Executor for IndexScanExecutor {
    fn init(&mut self) -> QueryResult<()> {
        let index = self.index()?;
        let table = self
            .ctx
            .catalog
            .read()
            .table_by_id(index.table_id)
            .ok_or_else(|| QueryError::TableNotFound(format!("table #{}", index.table_id)))?;

        // Materialize the key range up front so no leaf latch is held
        // while downstream operators run.
        let iter = match self.start_key {
            Some(key) => index.tree.iter_from(&key)?,
            None => index.tree.iter()?,
        };
        let mut entries = VecDeque::new();
        for item in iter {
            entries.push_back(item?);
        }

        self.entries = entries;
        self.table = Some(table);
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let table = self.table.as_ref().expect("init called");
        while let Some((_, rid)) = self.entries.pop_front() {
            if let Some(tuple) = table.heap.get(rid) {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }
}
