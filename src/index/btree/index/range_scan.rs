use std::sync::Arc;
use parking_lot::lock_api::ArcRwLockReadGuard;
use parking_lot::RawRwLock;

use crate::common::types::{Page, PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::node::{self, InternalNode, LeafNode, PAGE_TYPE_INTERNAL, PAGE_TYPE_LEAF};
use crate::storage::buffer::BufferPoolManager;

use super::base::BPlusTree;

/// Forward iterator over the leaf chain in ascending key order.
///
/// Holds at most one leaf read latch at a time: stepping past the end of a
/// leaf latches the next leaf before the current one is released and
/// unpinned. Items are `Result`s because stepping fetches pages through
/// the buffer pool.
pub struct BPlusTreeIter<K: IndexKey> {
    buffer_pool: Arc<BufferPoolManager>,
    page_id: PageId,
    guard: Option<ArcRwLockReadGuard<RawRwLock, Page>>,
    leaf: Option<LeafNode<K>>,
    index: usize,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Read-crab down to a leaf: the leftmost one, or the leaf that would
    /// contain `target`.
    fn descend_to_leaf(
        &self,
        target: Option<&K>,
    ) -> Result<Option<(PageId, ArcRwLockReadGuard<RawRwLock, Page>)>, BTreeError> {
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
                PAGE_TYPE_LEAF => return Ok(Some((page_id, guard))),
                PAGE_TYPE_INTERNAL => {
                    let internal = InternalNode::<K>::decode(&guard);
                    let child_id = match target {
                        Some(key) => internal.child_for(key),
                        None => internal.children[0],
                    };
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

    /// Iterate the whole tree in ascending key order
    pub fn iter(&self) -> Result<BPlusTreeIter<K>, BTreeError> {
        match self.descend_to_leaf(None)? {
            None => Ok(BPlusTreeIter::empty(self.buffer_pool.clone())),
            Some((page_id, guard)) => {
                let leaf = LeafNode::<K>::decode(&guard);
                Ok(BPlusTreeIter {
                    buffer_pool: self.buffer_pool.clone(),
                    page_id,
                    guard: Some(guard),
                    leaf: Some(leaf),
                    index: 0,
                })
            }
        }
    }

    /// Iterate starting from the first key >= `key`
    pub fn iter_from(&self, key: &K) -> Result<BPlusTreeIter<K>, BTreeError> {
        match self.descend_to_leaf(Some(key))? {
            None => Ok(BPlusTreeIter::empty(self.buffer_pool.clone())),
            Some((page_id, guard)) => {
                let leaf = LeafNode::<K>::decode(&guard);
                let index = leaf.keys.partition_point(|k| k < key);
                Ok(BPlusTreeIter {
                    buffer_pool: self.buffer_pool.clone(),
                    page_id,
                    guard: Some(guard),
                    leaf: Some(leaf),
                    index,
                })
            }
        }
    }
}

impl<K: IndexKey> BPlusTreeIter<K> {
    fn empty(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            page_id: INVALID_PAGE_ID,
            guard: None,
            leaf: None,
            index: 0,
        }
    }

    /// True when no further entries will be produced
    pub fn is_end(&self) -> bool {
        match &self.leaf {
            None => true,
            Some(leaf) => self.index >= leaf.size() && leaf.next_page_id == INVALID_PAGE_ID,
        }
    }

    pub fn try_next(&mut self) -> Result<Option<(K, Rid)>, BTreeError> {
        loop {
            let Some(leaf) = self.leaf.as_ref() else {
                return Ok(None);
            };
            if self.index < leaf.size() {
                let item = (leaf.keys[self.index], leaf.values[self.index]);
                self.index += 1;
                return Ok(Some(item));
            }
            if leaf.next_page_id == INVALID_PAGE_ID {
                self.release();
                return Ok(None);
            }
            self.advance_leaf()?;
        }
    }

    /// Move to the next leaf: latch it first, then release the current one
    fn advance_leaf(&mut self) -> Result<(), BTreeError> {
        let next_id = self.leaf.as_ref().map(|l| l.next_page_id).unwrap_or(INVALID_PAGE_ID);
        let ptr = self.buffer_pool.fetch_page(next_id)?;
        let next_guard = ptr.read_arc();
        let next_leaf = LeafNode::<K>::decode(&next_guard);

        let old_page_id = self.page_id;
        self.guard = Some(next_guard);
        self.buffer_pool.unpin_page(old_page_id, false);
        self.page_id = next_id;
        self.leaf = Some(next_leaf);
        self.index = 0;
        Ok(())
    }

    fn release(&mut self) {
        if self.guard.take().is_some() {
            self.buffer_pool.unpin_page(self.page_id, false);
        }
        self.leaf = None;
    }
}

impl<K: IndexKey> Iterator for BPlusTreeIter<K> {
    type Item = Result<(K, Rid), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.try_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.release();
                Some(Err(e))
            }
        }
    }
}

impl<K: IndexKey> Drop for BPlusTreeIter<K> {
    fn drop(&mut self) {
        self.release();
    }
}
