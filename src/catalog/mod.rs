// Minimal catalog collaborators: the executors need schemas, a table
// heap, and a registry mapping tables to their indexes. The engine core
// consumes these through a handful of methods; nothing here is a full
// catalog implementation.

pub mod schema;
pub mod table;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::common::types::TableId;
use crate::index::btree::{BPlusTree, BTreeError};
use crate::storage::buffer::BufferPoolManager;

pub use schema::{Column, DataType, Schema};
pub use table::{IndexInfo, TableHeap, TableInfo};
pub use value::{DataValue, Tuple};

/// Default B+ tree fan-outs for catalog-created indexes
pub const DEFAULT_LEAF_MAX_SIZE: usize = 128;
pub const DEFAULT_INTERNAL_MAX_SIZE: usize = 128;

pub type IndexId = u32;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    DuplicateTable(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    DuplicateIndex(String),

    #[error("Index keys must be integer columns, column {0} is not")]
    UnsupportedKeyColumn(String),

    #[error("B+ tree error: {0}")]
    BTree(#[from] BTreeError),
}

/// Name registry for tables and their indexes
pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    tables: HashMap<TableId, Arc<TableInfo>>,
    table_names: HashMap<String, TableId>,
    indexes: HashMap<IndexId, Arc<IndexInfo>>,
    index_names: HashMap<String, IndexId>,
    table_indexes: HashMap<TableId, Vec<IndexId>>,
    next_table_id: TableId,
    next_index_id: IndexId,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            table_indexes: HashMap::new(),
            next_table_id: 1,
            next_index_id: 1,
        }
    }

    pub fn create_table(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        let name = name.into();
        if self.table_names.contains_key(&name) {
            return Err(CatalogError::DuplicateTable(name));
        }

        let table_id = self.next_table_id;
        self.next_table_id += 1;

        let info = Arc::new(TableInfo::new(table_id, name.clone(), schema));
        self.tables.insert(table_id, info.clone());
        self.table_names.insert(name, table_id);
        self.table_indexes.insert(table_id, Vec::new());
        Ok(info)
    }

    pub fn table(&self, name: &str) -> Option<Arc<TableInfo>> {
        self.table_names
            .get(name)
            .and_then(|id| self.tables.get(id))
            .cloned()
    }

    pub fn table_by_id(&self, table_id: TableId) -> Option<Arc<TableInfo>> {
        self.tables.get(&table_id).cloned()
    }

    /// Create a B+ tree index over an integer column, backfilling it from
    /// the table's current contents.
    pub fn create_index(
        &mut self,
        index_name: impl Into<String>,
        table_name: &str,
        key_column: usize,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let index_name = index_name.into();
        if self.index_names.contains_key(&index_name) {
            return Err(CatalogError::DuplicateIndex(index_name));
        }
        let table = self
            .table(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;

        let column = &table.schema.columns()[key_column];
        if column.data_type() != DataType::Integer {
            return Err(CatalogError::UnsupportedKeyColumn(column.name().to_string()));
        }

        let tree = Arc::new(BPlusTree::<i64>::new(
            index_name.clone(),
            self.buffer_pool.clone(),
            leaf_max_size,
            internal_max_size,
        )?);

        // Backfill from the heap
        for (rid, tuple) in table.heap.scan() {
            if let Some(DataValue::Integer(key)) = tuple.value(key_column) {
                tree.insert(*key, rid)?;
            }
        }

        let index_id = self.next_index_id;
        self.next_index_id += 1;
        let info = Arc::new(IndexInfo {
            id: index_id,
            name: index_name.clone(),
            table_id: table.id,
            key_column,
            tree,
        });
        self.indexes.insert(index_id, info.clone());
        self.index_names.insert(index_name, index_id);
        self.table_indexes
            .entry(table.id)
            .or_default()
            .push(index_id);
        Ok(info)
    }

    pub fn index(&self, name: &str) -> Option<Arc<IndexInfo>> {
        self.index_names
            .get(name)
            .and_then(|id| self.indexes.get(id))
            .cloned()
    }

    pub fn indexes_for_table(&self, table_id: TableId) -> Vec<Arc<IndexInfo>> {
        self.table_indexes
            .get(&table_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.indexes.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
