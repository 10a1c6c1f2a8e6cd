use log::trace;
use parking_lot::lock_api::ArcRwLockWriteGuard;
use parking_lot::RawRwLock;

use crate::common::types::{Page, PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::node::{self, InternalNode, LeafNode, PAGE_TYPE_INTERNAL, PAGE_TYPE_LEAF};

use super::base::{BPlusTree, StackEntry, WriteContext};

/// A node produced by a split, not yet attached to a parent
pub(crate) enum SplitNode<K: IndexKey> {
    Leaf(LeafNode<K>),
    Internal(InternalNode<K>),
}

impl<K: IndexKey> SplitNode<K> {
    fn set_parent(&mut self, parent: PageId) {
        match self {
            SplitNode::Leaf(n) => n.parent_page_id = parent,
            SplitNode::Internal(n) => n.parent_page_id = parent,
        }
    }

    fn encode(&self, page: &mut Page) {
        match self {
            SplitNode::Leaf(n) => n.encode(page),
            SplitNode::Internal(n) => n.encode(page),
        }
    }
}

impl<K: IndexKey> BPlusTree<K> {
    /// Insert a key. Returns false (tree unchanged) on a duplicate.
    pub fn insert(&self, key: K, rid: Rid) -> Result<bool, BTreeError> {
        if let Some(done) = self.insert_optimistic(&key, rid)? {
            return Ok(done);
        }
        self.insert_pessimistic(key, rid)
    }

    /// Descend with read latches and write-latch only the leaf. The
    /// returned guard is the leaf's; `None` means the tree is empty.
    ///
    /// The caller's mutation must not change the tree structure: the
    /// ancestors are unlatched, so only in-leaf edits are legal.
    pub(crate) fn optimistic_descend(
        &self,
        key: &K,
    ) -> Result<Option<(PageId, ArcRwLockWriteGuard<RawRwLock, Page>)>, BTreeError> {
        let root_guard = self.root_page_id.read_arc();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut page_id = root_id;
        let mut ptr = self.fetch(page_id)?;
        let mut guard = ptr.read_arc();
        loop {
            match node::page_type(&guard) {
                PAGE_TYPE_LEAF => {
                    // Only the root can be a latched leaf here; the
                    // root-pointer latch is still held, so re-taking the
                    // page latch in write mode is race-free.
                    drop(guard);
                    let write_guard = ptr.write_arc();
                    return Ok(Some((page_id, write_guard)));
                }
                PAGE_TYPE_INTERNAL => {
                    let internal = InternalNode::<K>::decode(&guard);
                    let child_id = internal.child_for(key);
                    let child_ptr = match self.fetch(child_id) {
                        Ok(p) => p,
                        Err(e) => {
                            drop(guard);
                            self.buffer_pool.unpin_page(page_id, false);
                            return Err(e);
                        }
                    };
                    let child_guard = child_ptr.read_arc();
                    if node::page_type(&child_guard) == PAGE_TYPE_LEAF {
                        // Upgrade the leaf latch to write mode while the
                        // parent read latch still pins the structure.
                        drop(child_guard);
                        let leaf_guard = child_ptr.write_arc();
                        drop(guard);
                        self.buffer_pool.unpin_page(page_id, false);
                        return Ok(Some((child_id, leaf_guard)));
                    }
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false);
                    page_id = child_id;
                    ptr = child_ptr;
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

    /// First insert pass: write-latch only the leaf and insert if that
    /// cannot trigger a split. `None` means the pessimistic pass must run.
    fn insert_optimistic(&self, key: &K, rid: Rid) -> Result<Option<bool>, BTreeError> {
        let Some((page_id, mut guard)) = self.optimistic_descend(key)? else {
            return Ok(None);
        };

        let mut leaf = LeafNode::<K>::decode(&guard);
        if leaf.lookup(key).is_some() {
            // Duplicates never change the structure
            drop(guard);
            self.buffer_pool.unpin_page(page_id, false);
            return Ok(Some(false));
        }
        if leaf.is_insert_safe() {
            leaf.insert(*key, rid);
            leaf.encode(&mut guard);
            drop(guard);
            self.buffer_pool.unpin_page(page_id, true);
            return Ok(Some(true));
        }

        drop(guard);
        self.buffer_pool.unpin_page(page_id, false);
        Ok(None)
    }

    fn insert_pessimistic(&self, key: K, rid: Rid) -> Result<bool, BTreeError> {
        let mut ctx = WriteContext::default();
        let result = self.insert_pessimistic_inner(key, rid, &mut ctx);
        self.finish_write(&mut ctx);
        result
    }

    fn insert_pessimistic_inner(
        &self,
        key: K,
        rid: Rid,
        ctx: &mut WriteContext,
    ) -> Result<bool, BTreeError> {
        let mut root_guard = self.root_page_id.write_arc();
        let root_id = *root_guard;

        if root_id == INVALID_PAGE_ID {
            // Start a new tree with a single root leaf
            let (ptr, page_id) = self.new_page()?;
            let mut leaf = LeafNode::<K>::new(page_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key, rid);
            {
                let mut guard = ptr.write();
                leaf.encode(&mut guard);
            }
            self.buffer_pool.unpin_page(page_id, true);
            *root_guard = page_id;
            self.sync_root_to_header(page_id)?;
            trace!("created root leaf {}", page_id);
            return Ok(true);
        }
        ctx.root_guard = Some(root_guard);

        // Write-latched descent: a safe node releases every ancestor latch
        let mut page_id = root_id;
        loop {
            let ptr = self.fetch(page_id)?;
            let guard = ptr.write_arc();
            match node::page_type(&guard) {
                PAGE_TYPE_LEAF => {
                    let leaf = LeafNode::<K>::decode(&guard);
                    if leaf.is_insert_safe() {
                        ctx.release_all(&self.buffer_pool);
                    }
                    ctx.stack.push(StackEntry {
                        page_id,
                        guard,
                        dirty: false,
                    });
                    break;
                }
                PAGE_TYPE_INTERNAL => {
                    let internal = InternalNode::<K>::decode(&guard);
                    let child_id = internal.child_for(&key);
                    if internal.is_insert_safe() {
                        ctx.release_all(&self.buffer_pool);
                    }
                    ctx.stack.push(StackEntry {
                        page_id,
                        guard,
                        dirty: false,
                    });
                    page_id = child_id;
                }
                _ => {
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false);
                    return Err(BTreeError::CorruptPage(page_id));
                }
            }
        }

        let mut leaf = {
            let entry = ctx.stack.last().expect("leaf latched");
            LeafNode::<K>::decode(&entry.guard)
        };
        if !leaf.insert(key, rid) {
            return Ok(false);
        }
        if leaf.size() < self.leaf_max_size {
            let entry = ctx.stack.last_mut().expect("leaf latched");
            leaf.encode(&mut entry.guard);
            entry.dirty = true;
            return Ok(true);
        }

        // The leaf filled up: split it and propagate the sibling's first key
        let (mut right_ptr, mut right_id) = self.new_page()?;
        let right_leaf = leaf.split(right_id);
        let mut promoted = right_leaf.keys[0];
        let mut left = SplitNode::Leaf(leaf);
        let mut right = SplitNode::Leaf(right_leaf);
        trace!("leaf split, new sibling page {}", right_id);

        loop {
            let left_entry = ctx.stack.pop().expect("split node latched");

            if ctx.stack.is_empty() {
                // The old root split: grow the tree by one level
                let (root_ptr, new_root_id) = self.new_page()?;
                let StackEntry {
                    page_id: left_id,
                    guard: mut left_guard,
                    ..
                } = left_entry;

                left.set_parent(new_root_id);
                right.set_parent(new_root_id);
                left.encode(&mut left_guard);
                drop(left_guard);
                self.buffer_pool.unpin_page(left_id, true);
                {
                    let mut guard = right_ptr.write();
                    right.encode(&mut guard);
                }
                self.buffer_pool.unpin_page(right_id, true);

                let mut new_root =
                    InternalNode::<K>::new(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                new_root.keys = vec![K::default(), promoted];
                new_root.children = vec![left_id, right_id];
                {
                    let mut guard = root_ptr.write();
                    new_root.encode(&mut guard);
                }
                self.buffer_pool.unpin_page(new_root_id, true);

                if let Some(guard) = ctx.root_guard.as_mut() {
                    **guard = new_root_id;
                }
                self.sync_root_to_header(new_root_id)?;
                trace!("new root {} after split", new_root_id);
                return Ok(true);
            }

            let mut parent = {
                let entry = ctx.stack.last().expect("parent latched");
                InternalNode::<K>::decode(&entry.guard)
            };

            let StackEntry {
                page_id: left_id,
                guard: mut left_guard,
                ..
            } = left_entry;
            left.set_parent(parent.page_id);
            right.set_parent(parent.page_id);
            left.encode(&mut left_guard);
            drop(left_guard);
            self.buffer_pool.unpin_page(left_id, true);
            {
                let mut guard = right_ptr.write();
                right.encode(&mut guard);
            }
            self.buffer_pool.unpin_page(right_id, true);

            let idx = parent
                .child_index_of(left_id)
                .expect("parent references split child");
            parent.insert_after(idx, promoted, right_id);

            if parent.size() <= self.internal_max_size {
                let entry = ctx.stack.last_mut().expect("parent latched");
                parent.encode(&mut entry.guard);
                entry.dirty = true;
                return Ok(true);
            }

            // The parent overflowed as well; split it and keep propagating
            let (new_ptr, new_id) = self.new_page()?;
            let (promoted_key, right_internal) = parent.split(new_id);
            for &child in &right_internal.children {
                self.set_child_parent(child, new_id)?;
            }
            trace!("internal split, new sibling page {}", new_id);

            promoted = promoted_key;
            left = SplitNode::Internal(parent);
            right = SplitNode::Internal(right_internal);
            right_ptr = new_ptr;
            right_id = new_id;
        }
    }
}
