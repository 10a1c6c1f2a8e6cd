use anyhow::Result;
use quartzdb::storage::buffer::BufferPoolError;

mod common;
use common::create_test_buffer_pool;

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    assert!(page_id > 0);
    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(page_id, false));

    let fetched = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched.read();
        assert_eq!(page_guard.page_id, page_id);
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_page_modification_survives_eviction() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(3)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let data = b"Test Data";
        page_guard.data[100..100 + data.len()].copy_from_slice(data);
    }
    assert!(buffer_pool.unpin_page(page_id, true));

    // Cycle enough pages through the pool to evict the modified one
    for _ in 0..6 {
        let (_, id) = buffer_pool.new_page()?;
        assert!(buffer_pool.unpin_page(id, false));
    }

    let fetched = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched.read();
        assert_eq!(&page_guard.data[100..109], b"Test Data");
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

// A pool with every frame pinned cannot bring in a page; unpinning one
// frame makes exactly that page the eviction victim.
#[test]
fn test_pool_exhaustion_and_recovery() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(3)?;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let (_, id) = buffer_pool.new_page()?;
        ids.push(id);
    }

    assert!(matches!(
        buffer_pool.new_page(),
        Err(BufferPoolError::PoolExhausted)
    ));

    assert!(buffer_pool.unpin_page(ids[1], false));
    let (_, new_id) = buffer_pool.new_page()?;
    assert_ne!(new_id, ids[1]);

    // The previously unpinned page was evicted; everything else is pinned
    assert!(matches!(
        buffer_pool.fetch_page(ids[1]),
        Err(BufferPoolError::PoolExhausted)
    ));
    for &id in [ids[0], ids[2]].iter() {
        buffer_pool.fetch_page(id)?;
        assert!(buffer_pool.unpin_page(id, false));
    }
    Ok(())
}

#[test]
fn test_unpin_semantics() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(4)?;

    assert!(!buffer_pool.unpin_page(42, false));

    let (_, page_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(page_id, false));
    // Already at pin count zero
    assert!(!buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2)?;

    // Unknown page: vacuous success
    assert!(buffer_pool.delete_page(42)?);

    let (_, page_id) = buffer_pool.new_page()?;
    // Pinned page: refused
    assert!(!buffer_pool.delete_page(page_id)?);

    assert!(buffer_pool.unpin_page(page_id, false));
    assert!(buffer_pool.delete_page(page_id)?);

    // Frame returned to the free list; the pool holds two pages again
    let (_, a) = buffer_pool.new_page()?;
    let (_, b) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(a, false));
    assert!(buffer_pool.unpin_page(b, false));
    Ok(())
}

#[test]
fn test_flush_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(4)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_guard.data[0] = 0x5A;
    }
    assert!(buffer_pool.unpin_page(page_id, true));
    buffer_pool.flush_page(page_id)?;

    assert!(matches!(
        buffer_pool.flush_page(999),
        Err(BufferPoolError::PageNotFound(999))
    ));

    buffer_pool.flush_all_pages()?;
    Ok(())
}

#[test]
fn test_concurrent_access() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(16)?;

    let mut ids = Vec::new();
    for i in 0..8u8 {
        let (page, id) = buffer_pool.new_page()?;
        page.write().data[0] = i;
        assert!(buffer_pool.unpin_page(id, true));
        ids.push(id);
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = buffer_pool.clone();
        let ids = ids.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..100 {
                for (i, &id) in ids.iter().enumerate() {
                    let page = pool.fetch_page(id).unwrap();
                    assert_eq!(page.read().data[0], i as u8);
                    assert!(pool.unpin_page(id, false));
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    Ok(())
}
