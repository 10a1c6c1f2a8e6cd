use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use parking_lot::RwLock;
use tempfile::NamedTempFile;

use quartzdb::catalog::{Catalog, Column, DataType, DataValue, Schema, Tuple};
use quartzdb::query::executor::ExecutorContext;
use quartzdb::storage::buffer::BufferPoolManager;
use quartzdb::transaction::{LockManager, Transaction, TransactionManager};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<NamedTempFile> {
    Ok(NamedTempFile::new()?)
}

// Install the env_logger backend so RUST_LOG=debug shows engine logging;
// repeated calls from other tests in the binary are fine.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    init_logging();
    let file = NamedTempFile::new()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, 2, file.path())?);
    Ok((buffer_pool, file))
}

// A full engine context: buffer pool, catalog, lock and transaction managers
#[allow(dead_code)]
pub struct TestDb {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub catalog: Arc<RwLock<Catalog>>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    _file: NamedTempFile,
}

#[allow(dead_code)]
pub fn create_test_db() -> Result<TestDb> {
    init_logging();
    let file = NamedTempFile::new()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(256, 2, file.path())?);
    let catalog = Arc::new(RwLock::new(Catalog::new(buffer_pool.clone())));
    let lock_manager = Arc::new(LockManager::new(Duration::from_millis(50)));
    let txn_manager = Arc::new(TransactionManager::new(lock_manager.clone()));
    Ok(TestDb {
        buffer_pool,
        catalog,
        lock_manager,
        txn_manager,
        _file: file,
    })
}

impl TestDb {
    #[allow(dead_code)]
    pub fn context(&self, txn: &Arc<Transaction>) -> ExecutorContext {
        ExecutorContext {
            buffer_pool: self.buffer_pool.clone(),
            catalog: self.catalog.clone(),
            lock_manager: self.lock_manager.clone(),
            txn_manager: self.txn_manager.clone(),
            txn: txn.clone(),
        }
    }

    // Register an (id INTEGER, name TEXT) table
    #[allow(dead_code)]
    pub fn create_people_table(&self, name: &str) -> Result<()> {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Text),
        ]);
        self.catalog.write().create_table(name, schema)?;
        Ok(())
    }
}

#[allow(dead_code)]
pub fn person(id: i64, name: &str) -> Tuple {
    Tuple::new(vec![
        DataValue::Integer(id),
        DataValue::Text(name.to_string()),
    ])
}
