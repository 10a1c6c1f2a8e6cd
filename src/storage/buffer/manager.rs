use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::types::{Frame, FrameId, FramePtr, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::page_table::ExtendibleHashTable;
use crate::storage::buffer::replacer::LruKReplacer;
use crate::storage::disk::DiskManager;

/// How many (page id, frame id) entries an extendible hash bucket holds
const PAGE_TABLE_BUCKET_SIZE: usize = 4;

/// BufferPoolManager caches disk pages in a fixed array of frames.
///
/// Residency is tracked by an extendible hash table (page id → frame id)
/// and a free list; eviction candidates come from an LRU-K replacer. A
/// frame is in exactly one of {free, resident}; resident pages with a
/// positive pin count are never evicted, and dirty pages are written back
/// before their frame is reused.
///
/// Public operations serialize on the pool latch. Mutating fetched page
/// *data* is protected by the page's own latch, not the pool latch.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<FramePtr>,
    free_list: Mutex<VecDeque<FrameId>>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruKReplacer,
    disk_manager: Arc<DiskManager>,
    latch: Mutex<()>,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        replacer_k: usize,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(pool_size, replacer_k, disk_manager))
    }

    pub fn with_disk_manager(
        pool_size: usize,
        replacer_k: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            let page = Arc::new(parking_lot::RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(parking_lot::RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            free_list: Mutex::new(free_list),
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            replacer: LruKReplacer::new(pool_size, replacer_k),
            disk_manager,
            latch: Mutex::new(()),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Allocate a fresh page and pin it into a frame
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let _guard = self.latch.lock();

        let frame_id = self.acquire_frame()?;
        let page_id = self.disk_manager.allocate_page()?;

        let frame = &self.frames[frame_id];
        {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                *page_guard = Page::new(page_id);
            }
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
        }

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;

        trace!("new page {} in frame {}", page_id, frame_id);
        let frame_guard = frame.read();
        Ok((frame_guard.page.clone(), page_id))
    }

    /// Fetch a page, reading it from disk on a miss. The returned page is
    /// pinned; callers must `unpin_page` when done.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::PageNotFound(page_id));
        }
        let _guard = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id];
            {
                let mut frame_guard = frame.write();
                frame_guard.pin_count += 1;
            }
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            let frame_guard = frame.read();
            return Ok(frame_guard.page.clone());
        }

        let frame_id = self.acquire_frame()?;
        let frame = &self.frames[frame_id];
        {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                self.disk_manager.read_page(page_id, &mut page_guard)?;
            }
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
        }

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;

        let frame_guard = frame.read();
        Ok(frame_guard.page.clone())
    }

    /// Drop one pin on a page, folding `is_dirty` into the frame's dirty
    /// flag. Returns false if the page is unknown or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _guard = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };

        let pin_count = {
            let frame = &self.frames[frame_id];
            let mut frame_guard = frame.write();
            if frame_guard.pin_count == 0 {
                return false;
            }
            frame_guard.is_dirty |= is_dirty;
            frame_guard.pin_count -= 1;
            frame_guard.pin_count
        };

        if pin_count == 0 {
            // Ignore the frame-bound error: the id came from the table
            let _ = self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Write a page to disk unconditionally. The dirty flag is cleared
    /// only after the write succeeds.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let _guard = self.latch.lock();
        self.flush_frame_of(page_id)
    }

    fn flush_frame_of(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Err(BufferPoolError::PageNotFound(page_id));
        };

        let frame = &self.frames[frame_id];
        let page_copy = {
            let frame_guard = frame.read();
            let page_guard = frame_guard.page.read();
            page_guard.clone()
        };
        self.disk_manager.write_page(&page_copy)?;

        let mut frame_guard = frame.write();
        frame_guard.is_dirty = false;
        Ok(())
    }

    /// Flush every resident page
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let _guard = self.latch.lock();

        for frame in &self.frames {
            let page_id = {
                let frame_guard = frame.read();
                let page_guard = frame_guard.page.read();
                page_guard.page_id
            };
            if page_id != INVALID_PAGE_ID && self.page_table.find(&page_id).is_some() {
                self.flush_frame_of(page_id)?;
            }
        }
        Ok(())
    }

    /// Remove a page from the pool and return its frame to the free list.
    /// Ok(true) if the page was absent or deleted; Ok(false) if it is
    /// pinned and cannot be deleted.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let _guard = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };

        let frame = &self.frames[frame_id];
        {
            let frame_guard = frame.read();
            if frame_guard.pin_count > 0 {
                return Ok(false);
            }
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id)?;

        {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                *page_guard = Page::new(INVALID_PAGE_ID);
            }
            frame_guard.is_dirty = false;
            frame_guard.pin_count = 0;
        }
        self.free_list.lock().push_back(frame_id);

        debug!("deleted page {} from frame {}", page_id, frame_id);
        Ok(true)
    }

    /// Get a frame from the free list, or evict a victim (writing it back
    /// if dirty). Called with the pool latch held.
    fn acquire_frame(&self) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = self.free_list.lock().pop_front() {
            return Ok(frame_id);
        }

        let Some(victim_id) = self.replacer.evict() else {
            return Err(BufferPoolError::PoolExhausted);
        };

        let frame = &self.frames[victim_id];
        let (old_page_id, dirty, page_copy) = {
            let frame_guard = frame.read();
            let page_guard = frame_guard.page.read();
            (
                page_guard.page_id,
                frame_guard.is_dirty,
                frame_guard.is_dirty.then(|| page_guard.clone()),
            )
        };

        if dirty {
            debug!("writing back dirty page {} before reuse", old_page_id);
            self.disk_manager.write_page(&page_copy.unwrap())?;
        }
        if old_page_id != INVALID_PAGE_ID {
            self.page_table.remove(&old_page_id);
        }

        Ok(victim_id)
    }
}
