use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::types::{PageId, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::deserialize_node;
use super::base::BPlusTree;

impl<K> BPlusTree<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Remove a key. Absent keys are a no-op.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        let _guard = self.latch.write();
        if self.is_empty() {
            return Ok(());
        }

        let leaf_page_id = self.find_leaf_page(Some(key))?;
        let leaf_page = self.buffer_pool.fetch_page(leaf_page_id)?;
        let mut node: BTreeNode<K> = {
            let page_guard = leaf_page.read();
            deserialize_node(&page_guard)?
        };

        if !node.remove_from_leaf(key) {
            self.buffer_pool.unpin_page(leaf_page_id, false);
            return Ok(());
        }

        self.store_node(&leaf_page, &node)?;
        self.buffer_pool.unpin_page(leaf_page_id, true);

        self.rebalance(leaf_page_id)
    }

    /// Restore the occupancy invariant at `page_id` after a removal:
    /// borrow from a sibling when one can spare an entry, merge otherwise,
    /// and let underflow propagate up through the parent.
    fn rebalance(&self, page_id: PageId) -> Result<(), BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let node: BTreeNode<K> = {
            let page_guard = page.read();
            deserialize_node(&page_guard)?
        };

        if node.is_root() {
            return self.adjust_root(node, page_id);
        }
        if node.size() >= node.min_size() {
            self.buffer_pool.unpin_page(page_id, false);
            return Ok(());
        }

        let parent_page_id = node.parent_page_id;
        let parent_page = self.buffer_pool.fetch_page(parent_page_id)?;
        let mut parent: BTreeNode<K> = {
            let page_guard = parent_page.read();
            deserialize_node(&page_guard)?
        };
        let index = parent
            .value_index(page_id)
            .ok_or(BTreeError::InvalidPageFormat)?;

        let mut node = node;

        // Borrow from the left sibling when it can spare an entry.
        if index >= 1 {
            let left_page_id = parent.children[index - 1];
            let left_page = self.buffer_pool.fetch_page(left_page_id)?;
            let mut left: BTreeNode<K> = {
                let page_guard = left_page.read();
                deserialize_node(&page_guard)?
            };

            if left.size() + node.size() > node.max_size {
                self.redistribute_from_left(&mut left, &mut node, &mut parent, index)?;
                self.store_node(&left_page, &left)?;
                self.store_node(&page, &node)?;
                self.store_node(&parent_page, &parent)?;
                self.buffer_pool.unpin_page(left_page_id, true);
                self.buffer_pool.unpin_page(page_id, true);
                self.buffer_pool.unpin_page(parent_page_id, true);
                return Ok(());
            }
            self.buffer_pool.unpin_page(left_page_id, false);
        }

        // Then the right sibling.
        if index + 1 < parent.children.len() {
            let right_page_id = parent.children[index + 1];
            let right_page = self.buffer_pool.fetch_page(right_page_id)?;
            let mut right: BTreeNode<K> = {
                let page_guard = right_page.read();
                deserialize_node(&page_guard)?
            };

            if right.size() + node.size() > node.max_size {
                self.redistribute_from_right(&mut node, &mut right, &mut parent, index)?;
                self.store_node(&right_page, &right)?;
                self.store_node(&page, &node)?;
                self.store_node(&parent_page, &parent)?;
                self.buffer_pool.unpin_page(right_page_id, true);
                self.buffer_pool.unpin_page(page_id, true);
                self.buffer_pool.unpin_page(parent_page_id, true);
                return Ok(());
            }
            self.buffer_pool.unpin_page(right_page_id, false);
        }

        // No sibling can spare an entry: merge, preferring the left one.
        if index >= 1 {
            let left_page_id = parent.children[index - 1];
            let left_page = self.buffer_pool.fetch_page(left_page_id)?;
            let mut left: BTreeNode<K> = {
                let page_guard = left_page.read();
                deserialize_node(&page_guard)?
            };

            self.coalesce(&mut left, &mut node, &parent, index)?;
            parent.remove_at(index);

            self.store_node(&left_page, &left)?;
            self.store_node(&parent_page, &parent)?;
            self.buffer_pool.unpin_page(left_page_id, true);
            self.buffer_pool.unpin_page(page_id, false);
            self.buffer_pool.delete_page(page_id);
        } else {
            let right_page_id = parent.children[index + 1];
            let right_page = self.buffer_pool.fetch_page(right_page_id)?;
            let mut right: BTreeNode<K> = {
                let page_guard = right_page.read();
                deserialize_node(&page_guard)?
            };

            self.coalesce(&mut node, &mut right, &parent, index + 1)?;
            parent.remove_at(index + 1);

            self.store_node(&page, &node)?;
            self.store_node(&parent_page, &parent)?;
            self.buffer_pool.unpin_page(page_id, true);
            self.buffer_pool.unpin_page(right_page_id, false);
            self.buffer_pool.delete_page(right_page_id);
        }

        self.buffer_pool.unpin_page(parent_page_id, true);
        self.rebalance(parent_page_id)
    }

    /// Shrink the root when deletion emptied it: an internal root with one
    /// remaining child promotes that child, an empty leaf root empties the
    /// whole tree.
    fn adjust_root(&self, node: BTreeNode<K>, page_id: PageId) -> Result<(), BTreeError> {
        if !node.is_leaf && node.children.len() == 1 {
            let child_page_id = node.children[0];
            self.set_parent(child_page_id, INVALID_PAGE_ID)?;

            self.buffer_pool.unpin_page(page_id, false);
            self.buffer_pool.delete_page(page_id);
            return self.update_root_page_id(child_page_id);
        }

        if node.is_leaf && node.keys.is_empty() {
            self.buffer_pool.unpin_page(page_id, false);
            self.buffer_pool.delete_page(page_id);
            return self.update_root_page_id(INVALID_PAGE_ID);
        }

        self.buffer_pool.unpin_page(page_id, false);
        Ok(())
    }

    /// Move the left sibling's last entry to the front of `node`. The
    /// parent separator at `index` becomes the new boundary.
    fn redistribute_from_left(
        &self,
        left: &mut BTreeNode<K>,
        node: &mut BTreeNode<K>,
        parent: &mut BTreeNode<K>,
        index: usize,
    ) -> Result<(), BTreeError> {
        if node.is_leaf {
            let (key, value) = match (left.keys.pop(), left.values.pop()) {
                (Some(key), Some(value)) => (key, value),
                _ => return Err(BTreeError::InvalidPageFormat),
            };
            node.keys.insert(0, key);
            node.values.insert(0, value);
            parent.set_key_at(index, node.keys[0].clone());
        } else {
            let (moved_child, moved_key) = match (left.children.pop(), left.keys.pop()) {
                (Some(child), Some(key)) => (child, key),
                _ => return Err(BTreeError::InvalidPageFormat),
            };
            let old_separator = parent.key_at(index).clone();

            node.children.insert(0, moved_child);
            node.keys.insert(1, old_separator);
            parent.set_key_at(index, moved_key);

            self.set_parent(moved_child, node.page_id)?;
        }
        Ok(())
    }

    /// Move the right sibling's first entry to the end of `node`. The
    /// parent separator at `index + 1` becomes the sibling's new first key.
    fn redistribute_from_right(
        &self,
        node: &mut BTreeNode<K>,
        right: &mut BTreeNode<K>,
        parent: &mut BTreeNode<K>,
        index: usize,
    ) -> Result<(), BTreeError> {
        if node.is_leaf {
            node.keys.push(right.keys.remove(0));
            node.values.push(right.values.remove(0));
            parent.set_key_at(index + 1, right.keys[0].clone());
        } else {
            let moved_child = right.children.remove(0);
            let new_separator = right.keys[1].clone();
            let old_separator = parent.key_at(index + 1).clone();

            node.keys.push(old_separator);
            node.children.push(moved_child);
            right.keys.remove(0);
            parent.set_key_at(index + 1, new_separator);

            self.set_parent(moved_child, node.page_id)?;
        }
        Ok(())
    }

    /// Fold `source` (the right node) into `recipient` (its left sibling).
    /// `separator_index` is the source's slot in the parent; the caller
    /// removes it afterwards.
    fn coalesce(
        &self,
        recipient: &mut BTreeNode<K>,
        source: &mut BTreeNode<K>,
        parent: &BTreeNode<K>,
        separator_index: usize,
    ) -> Result<(), BTreeError> {
        if recipient.is_leaf {
            recipient.keys.append(&mut source.keys);
            recipient.values.append(&mut source.values);
            recipient.next_leaf = source.next_leaf;
        } else {
            // The parent separator becomes the key of the source's first
            // child, replacing its sentinel.
            let separator = parent.key_at(separator_index).clone();
            source.set_key_at(0, separator);

            for &child in &source.children {
                self.set_parent(child, recipient.page_id)?;
            }
            recipient.keys.append(&mut source.keys);
            recipient.children.append(&mut source.children);
        }
        Ok(())
    }
}
