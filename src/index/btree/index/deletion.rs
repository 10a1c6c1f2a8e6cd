use log::trace;

use crate::common::types::{PageId, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::node::{self, InternalNode, LeafNode, PAGE_TYPE_INTERNAL, PAGE_TYPE_LEAF};

use super::base::{BPlusTree, StackEntry, WriteContext};

/// A node that fell below its minimum occupancy
enum UnderflowNode<K: IndexKey> {
    Leaf(LeafNode<K>),
    Internal(InternalNode<K>),
}

impl<K: IndexKey> BPlusTree<K> {
    /// Remove a key; removing an absent key is a no-op.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        if self.remove_optimistic(key)? {
            return Ok(());
        }
        self.remove_pessimistic(key)
    }

    /// First pass: write-latch only the leaf and remove if that cannot
    /// trigger rebalancing. Returns false when the pessimistic pass must run.
    fn remove_optimistic(&self, key: &K) -> Result<bool, BTreeError> {
        let Some((page_id, mut guard)) = self.optimistic_descend(key)? else {
            // Empty tree: nothing to remove
            return Ok(true);
        };

        let mut leaf = LeafNode::<K>::decode(&guard);
        if leaf.lookup(key).is_none() {
            drop(guard);
            self.buffer_pool.unpin_page(page_id, false);
            return Ok(true);
        }

        let is_root = leaf.parent_page_id == INVALID_PAGE_ID;
        if leaf.is_delete_safe(is_root) {
            leaf.remove(key);
            leaf.encode(&mut guard);
            drop(guard);
            self.buffer_pool.unpin_page(page_id, true);
            return Ok(true);
        }

        drop(guard);
        self.buffer_pool.unpin_page(page_id, false);
        Ok(false)
    }

    fn remove_pessimistic(&self, key: &K) -> Result<(), BTreeError> {
        let mut ctx = WriteContext::default();
        let result = self.remove_pessimistic_inner(key, &mut ctx);
        self.finish_write(&mut ctx);
        result
    }

    fn remove_pessimistic_inner(
        &self,
        key: &K,
        ctx: &mut WriteContext,
    ) -> Result<(), BTreeError> {
        let root_guard = self.root_page_id.write_arc();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }
        ctx.root_guard = Some(root_guard);

        // Write-latched descent, releasing ancestors at delete-safe nodes
        let mut page_id = root_id;
        loop {
            let ptr = self.fetch(page_id)?;
            let guard = ptr.write_arc();
            match node::page_type(&guard) {
                PAGE_TYPE_LEAF => {
                    let leaf = LeafNode::<K>::decode(&guard);
                    let is_root = leaf.parent_page_id == INVALID_PAGE_ID;
                    if leaf.is_delete_safe(is_root) {
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
                    let is_root = internal.parent_page_id == INVALID_PAGE_ID;
                    let child_id = internal.child_for(key);
                    if internal.is_delete_safe(is_root) {
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
        if !leaf.remove(key) {
            return Ok(());
        }

        if leaf.parent_page_id == INVALID_PAGE_ID {
            // Root leaf: an emptied root clears the whole tree
            if leaf.size() == 0 {
                let entry = ctx.stack.pop().expect("leaf latched");
                drop(entry.guard);
                self.buffer_pool.unpin_page(entry.page_id, false);
                ctx.deleted.push(entry.page_id);
                if let Some(guard) = ctx.root_guard.as_mut() {
                    **guard = INVALID_PAGE_ID;
                }
                self.sync_root_to_header(INVALID_PAGE_ID)?;
                trace!("tree emptied, root cleared");
            } else {
                let entry = ctx.stack.last_mut().expect("leaf latched");
                leaf.encode(&mut entry.guard);
                entry.dirty = true;
            }
            return Ok(());
        }

        if leaf.size() >= leaf.min_size() {
            let entry = ctx.stack.last_mut().expect("leaf latched");
            leaf.encode(&mut entry.guard);
            entry.dirty = true;
            return Ok(());
        }

        self.rebalance(ctx, UnderflowNode::Leaf(leaf))
    }

    /// Restore the minimum-occupancy invariant for the node at the top of
    /// the latch stack, borrowing from or merging with an adjacent sibling
    /// and recursing into the parent when a merge empties it below minimum.
    fn rebalance(&self, ctx: &mut WriteContext, mut node: UnderflowNode<K>) -> Result<(), BTreeError> {
        loop {
            let node_entry = ctx.stack.pop().expect("underflowing node latched");
            let node_id = node_entry.page_id;
            let mut node_guard = node_entry.guard;

            // The node is not the root, so its parent is still latched
            let mut parent = {
                let entry = ctx.stack.last().expect("parent latched");
                InternalNode::<K>::decode(&entry.guard)
            };
            let idx = parent
                .child_index_of(node_id)
                .expect("parent references child");
            // Right sibling for the leftmost child, left sibling otherwise
            let sibling_idx = if idx == 0 { 1 } else { idx - 1 };
            let sibling_id = parent.children[sibling_idx];

            let sibling_ptr = match self.fetch(sibling_id) {
                Ok(ptr) => ptr,
                Err(e) => {
                    drop(node_guard);
                    self.buffer_pool.unpin_page(node_id, false);
                    return Err(e);
                }
            };
            let mut sibling_guard = sibling_ptr.write_arc();

            match node {
                UnderflowNode::Leaf(mut leaf) => {
                    let mut sibling = LeafNode::<K>::decode(&sibling_guard);

                    if leaf.size() + sibling.size() >= leaf.max_size {
                        // Redistribute one entry across the boundary
                        if sibling_idx < idx {
                            let k = sibling.keys.pop().expect("donor entry");
                            let v = sibling.values.pop().expect("donor entry");
                            leaf.keys.insert(0, k);
                            leaf.values.insert(0, v);
                            parent.keys[idx] = k;
                        } else {
                            let k = sibling.keys.remove(0);
                            let v = sibling.values.remove(0);
                            leaf.keys.push(k);
                            leaf.values.push(v);
                            parent.keys[sibling_idx] = sibling.keys[0];
                        }
                        leaf.encode(&mut node_guard);
                        drop(node_guard);
                        self.buffer_pool.unpin_page(node_id, true);
                        sibling.encode(&mut sibling_guard);
                        drop(sibling_guard);
                        self.buffer_pool.unpin_page(sibling_id, true);

                        let entry = ctx.stack.last_mut().expect("parent latched");
                        parent.encode(&mut entry.guard);
                        entry.dirty = true;
                        return Ok(());
                    }

                    // Coalesce into whichever of the pair is the left one
                    let right_idx = idx.max(sibling_idx);
                    if sibling_idx < idx {
                        sibling.keys.append(&mut leaf.keys);
                        sibling.values.append(&mut leaf.values);
                        sibling.next_page_id = leaf.next_page_id;
                        sibling.encode(&mut sibling_guard);
                        drop(sibling_guard);
                        self.buffer_pool.unpin_page(sibling_id, true);
                        drop(node_guard);
                        self.buffer_pool.unpin_page(node_id, false);
                        ctx.deleted.push(node_id);
                        trace!("coalesced leaf {} into {}", node_id, sibling_id);
                    } else {
                        leaf.keys.append(&mut sibling.keys);
                        leaf.values.append(&mut sibling.values);
                        leaf.next_page_id = sibling.next_page_id;
                        leaf.encode(&mut node_guard);
                        drop(node_guard);
                        self.buffer_pool.unpin_page(node_id, true);
                        drop(sibling_guard);
                        self.buffer_pool.unpin_page(sibling_id, false);
                        ctx.deleted.push(sibling_id);
                        trace!("coalesced leaf {} into {}", sibling_id, node_id);
                    }
                    parent.remove_at(right_idx);
                }
                UnderflowNode::Internal(mut inner) => {
                    let mut sibling = InternalNode::<K>::decode(&sibling_guard);

                    // A strict bound keeps the donor at or above its
                    // (rounded-up) minimum after giving one child away.
                    if inner.size() + sibling.size() > inner.max_size {
                        if sibling_idx < idx {
                            let moved_child = sibling.children.pop().expect("donor child");
                            let moved_key = sibling.keys.pop().expect("donor key");
                            inner.children.insert(0, moved_child);
                            inner.keys.insert(1, parent.keys[idx]);
                            parent.keys[idx] = moved_key;
                            self.set_child_parent(moved_child, node_id)?;
                        } else {
                            let moved_child = sibling.children.remove(0);
                            sibling.keys.remove(0);
                            inner.children.push(moved_child);
                            inner.keys.push(parent.keys[sibling_idx]);
                            parent.keys[sibling_idx] = sibling.keys[0];
                            self.set_child_parent(moved_child, node_id)?;
                        }
                        inner.encode(&mut node_guard);
                        drop(node_guard);
                        self.buffer_pool.unpin_page(node_id, true);
                        sibling.encode(&mut sibling_guard);
                        drop(sibling_guard);
                        self.buffer_pool.unpin_page(sibling_id, true);

                        let entry = ctx.stack.last_mut().expect("parent latched");
                        parent.encode(&mut entry.guard);
                        entry.dirty = true;
                        return Ok(());
                    }

                    // Coalesce: the parent's separator key comes down to
                    // caption the right half's leftmost subtree.
                    let right_idx = idx.max(sibling_idx);
                    let separator = parent.keys[right_idx];
                    if sibling_idx < idx {
                        sibling.keys.push(separator);
                        sibling.keys.extend(inner.keys.drain(..).skip(1));
                        let moved: Vec<PageId> = inner.children.drain(..).collect();
                        for &child in &moved {
                            self.set_child_parent(child, sibling_id)?;
                        }
                        sibling.children.extend(moved);
                        sibling.encode(&mut sibling_guard);
                        drop(sibling_guard);
                        self.buffer_pool.unpin_page(sibling_id, true);
                        drop(node_guard);
                        self.buffer_pool.unpin_page(node_id, false);
                        ctx.deleted.push(node_id);
                        trace!("coalesced internal {} into {}", node_id, sibling_id);
                    } else {
                        inner.keys.push(separator);
                        inner.keys.extend(sibling.keys.drain(..).skip(1));
                        let moved: Vec<PageId> = sibling.children.drain(..).collect();
                        for &child in &moved {
                            self.set_child_parent(child, node_id)?;
                        }
                        inner.children.extend(moved);
                        inner.encode(&mut node_guard);
                        drop(node_guard);
                        self.buffer_pool.unpin_page(node_id, true);
                        drop(sibling_guard);
                        self.buffer_pool.unpin_page(sibling_id, false);
                        ctx.deleted.push(sibling_id);
                        trace!("coalesced internal {} into {}", sibling_id, node_id);
                    }
                    parent.remove_at(right_idx);
                }
            }

            // A merge happened; the parent lost an entry
            if parent.parent_page_id == INVALID_PAGE_ID {
                if parent.size() == 1 {
                    // Root with a single child: promote the child
                    let only_child = parent.children[0];
                    self.set_child_parent(only_child, INVALID_PAGE_ID)?;
                    let entry = ctx.stack.pop().expect("root latched");
                    drop(entry.guard);
                    self.buffer_pool.unpin_page(entry.page_id, false);
                    ctx.deleted.push(entry.page_id);
                    if let Some(guard) = ctx.root_guard.as_mut() {
                        **guard = only_child;
                    }
                    self.sync_root_to_header(only_child)?;
                    trace!("root demoted to page {}", only_child);
                } else {
                    let entry = ctx.stack.last_mut().expect("root latched");
                    parent.encode(&mut entry.guard);
                    entry.dirty = true;
                }
                return Ok(());
            }

            if parent.size() >= parent.min_size() {
                let entry = ctx.stack.last_mut().expect("parent latched");
                parent.encode(&mut entry.guard);
                entry.dirty = true;
                return Ok(());
            }

            node = UnderflowNode::Internal(parent);
        }
    }
}
