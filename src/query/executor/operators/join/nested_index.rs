use std::sync::Arc;

use crate::catalog::{DataValue, IndexInfo, TableInfo};
use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::{QueryError, QueryResult, Tuple};
use crate::query::executor::{BoxedExecutor, Executor, ExecutorContext};

use super::JoinType;

/// Index nested-loop join: probes the inner table's B+ tree with each
/// outer row's key instead of scanning the inner table.
pub struct NestedIndexJoinExecutor {
    ctx: ExecutorContext,
    outer: BoxedExecutor,
    index_name: String,
    outer_key: usize,
    join_type: JoinType,
    index: Option<Arc<IndexInfo>>,
    inner_table: Option<Arc<TableInfo>>,
    inner_width: usize,
}

impl NestedIndexJoinExecutor {
    pub fn new(
        ctx: ExecutorContext,
        outer: BoxedExecutor,
        index_name: impl Into<String>,
        outer_key: usize,
        join_type: JoinType,
    ) -> Self {
        Self {
            ctx,
            outer,
            index_name: index_name.into(),
            outer_key,
            join_type,
            index: None,
            inner_table: None,
            inner_width: 0,
        }
    }
}

impl Executor for NestedIndexJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        let index = self
            .ctx
            .catalog
            .read()
            .index(&self.index_name)
            .ok_or_else(|| QueryError::IndexNotFound(self.index_name.clone()))?;
        let table = self
            .ctx
            .catalog
            .read()
            .table_by_id(index.table_id)
            .ok_or_else(|| QueryError::TableNotFound(format!("table #{}", index.table_id)))?;

        self.inner_width = table.schema.column_count();
        self.index = Some(index);
        self.inner_table = Some(table);
        self.outer.init()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let index = self.index.as_ref().expect("init called");
        let table = self.inner_table.as_ref().expect("init called");
        let out_rid = Rid::new(INVALID_PAGE_ID, 0);

        while let Some((outer_tuple, _)) = self.outer.next()? {
            // The index is unique, so each probe yields at most one row
            let inner = match outer_tuple.value(self.outer_key) {
                Some(DataValue::Integer(key)) => index
                    .tree
                    .get_value(key)?
                    .and_then(|rid| table.heap.get(rid)),
                _ => None,
            };

            match inner {
                Some(inner_tuple) => {
                    return Ok(Some((outer_tuple.joined_with(&inner_tuple), out_rid)));
                }
                None if self.join_type == JoinType::Left => {
                    return Ok(Some((outer_tuple.null_padded(self.inner_width), out_rid)));
                }
                None => continue,
            }
        }
        Ok(None)
    }
}
