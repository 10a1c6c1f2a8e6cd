// Result and error types for query execution.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::index::btree::BTreeError;
use crate::storage::buffer::BufferPoolError;
use crate::transaction::TransactionError;

pub use crate::catalog::{DataValue, Tuple};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Lock-layer aborts pass through with their reason intact
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Index error: {0}")]
    BTree(#[from] BTreeError),

    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub type QueryResult<T> = Result<T, QueryError>;
