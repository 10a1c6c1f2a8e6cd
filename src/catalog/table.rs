use std::sync::Arc;
use parking_lot::RwLock;

use crate::catalog::schema::Schema;
use crate::catalog::value::Tuple;
use crate::common::types::{Rid, TableId};
use crate::index::btree::BPlusTree;

/// A latched slot table of rows. Record ids are (table id, slot); slots
/// are never reused within a process, so a deleted row's rid stays free
/// for the owning transaction to restore on abort.
pub struct TableHeap {
    table_id: TableId,
    rows: RwLock<Vec<Option<Tuple>>>,
}

impl TableHeap {
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, tuple: Tuple) -> Rid {
        let mut rows = self.rows.write();
        let slot = rows.len() as u32;
        rows.push(Some(tuple));
        Rid::new(self.table_id, slot)
    }

    pub fn get(&self, rid: Rid) -> Option<Tuple> {
        let rows = self.rows.read();
        rows.get(rid.slot as usize).and_then(|r| r.clone())
    }

    /// Delete a row, returning the old tuple if it was live
    pub fn mark_delete(&self, rid: Rid) -> Option<Tuple> {
        let mut rows = self.rows.write();
        rows.get_mut(rid.slot as usize).and_then(|r| r.take())
    }

    /// Replace a row in place, returning the old tuple
    pub fn update(&self, rid: Rid, tuple: Tuple) -> Option<Tuple> {
        let mut rows = self.rows.write();
        rows.get_mut(rid.slot as usize)
            .and_then(|r| r.replace(tuple))
    }

    /// Put a tuple back into a (possibly deleted) slot; abort undo uses this
    pub fn restore(&self, rid: Rid, tuple: Tuple) -> bool {
        let mut rows = self.rows.write();
        match rows.get_mut(rid.slot as usize) {
            Some(slot) => {
                *slot = Some(tuple);
                true
            }
            None => false,
        }
    }

    /// Snapshot of all live rows in slot order
    pub fn scan(&self) -> Vec<(Rid, Tuple)> {
        let rows = self.rows.read();
        rows.iter()
            .enumerate()
            .filter_map(|(slot, row)| {
                row.as_ref()
                    .map(|t| (Rid::new(self.table_id, slot as u32), t.clone()))
            })
            .collect()
    }

    pub fn live_rows(&self) -> usize {
        self.rows.read().iter().filter(|r| r.is_some()).count()
    }
}

/// A table registered in the catalog
pub struct TableInfo {
    pub id: TableId,
    pub name: String,
    pub schema: Schema,
    pub heap: Arc<TableHeap>,
}

impl TableInfo {
    pub fn new(id: TableId, name: String, schema: Schema) -> Self {
        Self {
            id,
            name,
            schema,
            heap: Arc::new(TableHeap::new(id)),
        }
    }
}

/// A B+ tree index over one integer column of a table
pub struct IndexInfo {
    pub id: u32,
    pub name: String,
    pub table_id: TableId,
    pub key_column: usize,
    pub tree: Arc<BPlusTree<i64>>,
}

impl IndexInfo {
    /// Extract this index's key from a tuple; non-integer values (NULL
    /// included) are not indexed.
    pub fn key_of(&self, tuple: &Tuple) -> Option<i64> {
        match tuple.value(self.key_column) {
            Some(crate::catalog::value::DataValue::Integer(key)) => Some(*key),
            _ => None,
        }
    }
}
