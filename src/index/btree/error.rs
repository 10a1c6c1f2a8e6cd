use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum BTreeError {
    /// The buffer pool could not free a frame for a page the tree needs.
    #[error("Out of memory: buffer pool exhausted")]
    OutOfMemory,

    #[error("Buffer pool error: {0}")]
    BufferPool(BufferPoolError),

    #[error("Page {0} is not a B+ tree page")]
    CorruptPage(PageId),

    #[error("Header page is full, cannot register index root")]
    HeaderFull,
}

impl From<BufferPoolError> for BTreeError {
    fn from(err: BufferPoolError) -> Self {
        match err {
            // Transient shortage becomes the tree's out-of-memory error;
            // callers decide whether to retry, the tree never does.
            BufferPoolError::PoolExhausted => BTreeError::OutOfMemory,
            other => BTreeError::BufferPool(other),
        }
    }
}
