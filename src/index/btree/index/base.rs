use std::marker::PhantomData;
use std::sync::Arc;
use log::debug;
use parking_lot::lock_api::ArcRwLockWriteGuard;
use parking_lot::{RawRwLock, RwLock};

use crate::common::types::{Page, PageId, PagePtr, Rid, INVALID_PAGE_ID, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::node::{
    self, InternalNode, LeafNode, COMMON_HEADER_SIZE, LEAF_HEADER_SIZE, PAGE_TYPE_INTERNAL,
    PAGE_TYPE_LEAF,
};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::HeaderPage;

/// The header page is the first page the engine allocates
pub const HEADER_PAGE_ID: PageId = 1;

/// A page held with its write latch during a pessimistic descent
pub(crate) struct StackEntry {
    pub page_id: PageId,
    pub guard: ArcRwLockWriteGuard<RawRwLock, Page>,
    pub dirty: bool,
}

/// Latch context for a mutating descent: the root-pointer latch plus the
/// write-latched path from the root down. Ancestors are released as soon
/// as a safe node guarantees the mutation cannot propagate past it; pages
/// emptied by coalescing are deleted only after every latch is gone.
#[derive(Default)]
pub(crate) struct WriteContext {
    pub root_guard: Option<ArcRwLockWriteGuard<RawRwLock, PageId>>,
    pub stack: Vec<StackEntry>,
    pub deleted: Vec<PageId>,
}

impl WriteContext {
    /// Release every held latch, unpinning with the recorded dirty flags
    pub fn release_all(&mut self, pool: &BufferPoolManager) {
        self.root_guard = None;
        for entry in self.stack.drain(..) {
            let StackEntry {
                page_id,
                guard,
                dirty,
            } = entry;
            drop(guard);
            pool.unpin_page(page_id, dirty);
        }
    }
}

/// A concurrent, unique-key B+ tree over fixed-width keys.
///
/// Descents couple page latches (crabbing); inserts and deletes first try
/// an optimistic pass that write-latches only the leaf and fall back to a
/// pessimistic full-path descent when the leaf is unsafe. The root page id
/// is mirrored into the header page so the tree can be re-opened.
pub struct BPlusTree<K: IndexKey> {
    name: String,
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) root_page_id: Arc<RwLock<PageId>>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    _phantom: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Open (or create) the index named `name`, re-attaching to a root
    /// recorded in the header page.
    pub fn new(
        name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        assert!(leaf_max_size >= 2, "leaf_max_size must be at least 2");
        assert!(internal_max_size >= 3, "internal_max_size must be at least 3");
        assert!(LEAF_HEADER_SIZE + leaf_max_size * (K::ENCODED_SIZE + 8) <= PAGE_SIZE);
        assert!(COMMON_HEADER_SIZE + (internal_max_size + 1) * (K::ENCODED_SIZE + 4) <= PAGE_SIZE);

        let name = name.into();
        let header = buffer_pool.fetch_page(HEADER_PAGE_ID)?;

        let existing = {
            let guard = header.read();
            HeaderPage::get_root(&guard, &name)
        };
        let root = match existing {
            Some(root) => {
                buffer_pool.unpin_page(HEADER_PAGE_ID, false);
                root
            }
            None => {
                {
                    let mut guard = header.write();
                    if !HeaderPage::set_root(&mut guard, &name, INVALID_PAGE_ID) {
                        drop(guard);
                        buffer_pool.unpin_page(HEADER_PAGE_ID, false);
                        return Err(BTreeError::HeaderFull);
                    }
                }
                buffer_pool.unpin_page(HEADER_PAGE_ID, true);
                // Materialize the header page on disk so the next disk
                // allocation cannot hand out its page id again.
                buffer_pool.flush_page(HEADER_PAGE_ID)?;
                INVALID_PAGE_ID
            }
        };

        Ok(Self {
            name,
            buffer_pool,
            root_page_id: Arc::new(RwLock::new(root)),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id() == INVALID_PAGE_ID
    }

    pub(crate) fn fetch(&self, page_id: PageId) -> Result<PagePtr, BTreeError> {
        Ok(self.buffer_pool.fetch_page(page_id)?)
    }

    pub(crate) fn new_page(&self) -> Result<(PagePtr, PageId), BTreeError> {
        Ok(self.buffer_pool.new_page()?)
    }

    /// Release a write context's latches, then delete the pages coalescing
    /// emptied (deletion must wait until every latch is gone).
    pub(crate) fn finish_write(&self, ctx: &mut WriteContext) {
        ctx.release_all(&self.buffer_pool);
        for page_id in ctx.deleted.drain(..) {
            let _ = self.buffer_pool.delete_page(page_id);
        }
    }

    /// Persist a root change into the header page
    pub(crate) fn sync_root_to_header(&self, root: PageId) -> Result<(), BTreeError> {
        let header = self.fetch(HEADER_PAGE_ID)?;
        {
            let mut guard = header.write();
            if !HeaderPage::set_root(&mut guard, &self.name, root) {
                drop(guard);
                self.buffer_pool.unpin_page(HEADER_PAGE_ID, false);
                return Err(BTreeError::HeaderFull);
            }
        }
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, true);
        debug!("index {} root is now page {}", self.name, root);
        Ok(())
    }

    /// Rewrite a child's parent pointer. The caller must hold write
    /// latches covering the structural change (latch order is top-down,
    /// so briefly latching the child here cannot deadlock).
    pub(crate) fn set_child_parent(
        &self,
        child_id: PageId,
        parent_id: PageId,
    ) -> Result<(), BTreeError> {
        let page = self.fetch(child_id)?;
        {
            let mut guard = page.write();
            node::set_parent_page_id(&mut guard, parent_id);
        }
        self.buffer_pool.unpin_page(child_id, true);
        Ok(())
    }

    /// Point lookup with read-latch coupling: the parent's latch is held
    /// only until the child's is acquired.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>, BTreeError> {
        let root_guard = self.root_page_id.read_arc();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut page_id = root_id;
        let mut guard = self.fetch(page_id)?.read_arc();
        drop(root_guard);

        loop {
            match node::page_type(&guard) {
                PAGE_TYPE_LEAF => {
                    let leaf = LeafNode::<K>::decode(&guard);
                    let result = leaf.lookup(key);
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false);
                    return Ok(result);
                }
                PAGE_TYPE_INTERNAL => {
                    let internal = InternalNode::<K>::decode(&guard);
                    let child_id = internal.child_for(key);
                    let child_guard = match self.fetch(child_id) {
                        Ok(ptr) => ptr.read_arc(),
                        Err(e) => {
                            drop(guard);
                            self.buffer_pool.unpin_page(page_id, false);
                            return Err(e);
                        }
                    };
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false);
                    page_id = child_id;
                    guard = child_guard;
                }
                _ => {
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false);
                    return Err(BTreeError::CorruptPage(page_id));
                }
            }
        }
    }
}
