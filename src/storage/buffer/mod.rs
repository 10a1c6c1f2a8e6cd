// Buffer pool: a fixed frame array over the disk manager, with page
// residency tracked by an extendible hash table and eviction decided by
// an LRU-K replacer.

pub mod error;
pub mod manager;
pub mod page_table;
pub mod replacer;

pub use error::BufferPoolError;
pub use manager::BufferPoolManager;
pub use page_table::ExtendibleHashTable;
pub use replacer::LruKReplacer;
