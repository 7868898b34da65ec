use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::types::{PageId, PagePtr, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::BufferPoolError;
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::serialize_node;
use super::base::BPlusTree;

impl<K> BPlusTree<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Insert a key/value pair. Returns false on duplicate key.
    pub fn insert(&self, key: K, value: Rid) -> Result<bool, BTreeError> {
        let _guard = self.latch.write();

        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, value)
    }

    fn start_new_tree(&self, key: K, value: Rid) -> Result<(), BTreeError> {
        let (page, page_id) = self.new_tree_page()?;

        let mut node = BTreeNode::new_leaf(page_id, INVALID_PAGE_ID, self.leaf_max_size);
        node.insert_into_leaf(key, value);
        self.store_node(&page, &node)?;

        self.buffer_pool.unpin_page(page_id, true);
        self.update_root_page_id(page_id)
    }

    fn insert_into_leaf(&self, key: K, value: Rid) -> Result<bool, BTreeError> {
        let leaf_page_id = self.find_leaf_page(Some(&key))?;
        let leaf_page = self.buffer_pool.fetch_page(leaf_page_id)?;
        let mut node: BTreeNode<K> = {
            let page_guard = leaf_page.read();
            crate::index::btree::serialization::deserialize_node(&page_guard)?
        };

        if node.lookup(&key).is_some() {
            self.buffer_pool.unpin_page(leaf_page_id, false);
            return Ok(false);
        }

        node.insert_into_leaf(key, value);

        if node.size() > node.max_size {
            let (sibling_page, sibling_page_id) = self.new_tree_page()?;
            let (sibling, separator) = node.split_leaf(sibling_page_id);

            self.store_node(&sibling_page, &sibling)?;
            self.store_node(&leaf_page, &node)?;

            self.insert_into_parent(leaf_page_id, node.parent_page_id, separator, sibling_page_id)?;
            self.buffer_pool.unpin_page(sibling_page_id, true);
        } else {
            self.store_node(&leaf_page, &node)?;
        }

        self.buffer_pool.unpin_page(leaf_page_id, true);
        Ok(true)
    }

    /// Wire a freshly split-off sibling into the tree: either grow a new
    /// root above the old one, or push the separator into the parent,
    /// splitting it in turn when it overflows.
    fn insert_into_parent(
        &self,
        old_page_id: PageId,
        parent_page_id: PageId,
        separator: K,
        new_page_id: PageId,
    ) -> Result<(), BTreeError> {
        if parent_page_id == INVALID_PAGE_ID {
            let (root_page, root_page_id) = self.new_tree_page()?;
            let mut root = BTreeNode::new_internal(root_page_id, INVALID_PAGE_ID, self.internal_max_size);
            root.populate_new_root(old_page_id, separator, new_page_id);
            self.store_node(&root_page, &root)?;
            self.buffer_pool.unpin_page(root_page_id, true);

            self.set_parent(old_page_id, root_page_id)?;
            self.set_parent(new_page_id, root_page_id)?;
            return self.update_root_page_id(root_page_id);
        }

        let parent_page = self.buffer_pool.fetch_page(parent_page_id)?;
        let mut parent: BTreeNode<K> = {
            let page_guard = parent_page.read();
            crate::index::btree::serialization::deserialize_node(&page_guard)?
        };

        let new_size = parent.insert_node_after(old_page_id, separator, new_page_id);
        self.set_parent(new_page_id, parent_page_id)?;

        if new_size > parent.max_size {
            let (sibling_page, sibling_page_id) = self.new_tree_page()?;
            let (sibling, push_up) = parent.split_internal(sibling_page_id);

            // The moved children now live under the new sibling.
            for &child in &sibling.children {
                self.set_parent(child, sibling_page_id)?;
            }

            self.store_node(&sibling_page, &sibling)?;
            self.store_node(&parent_page, &parent)?;

            self.insert_into_parent(parent_page_id, parent.parent_page_id, push_up, sibling_page_id)?;
            self.buffer_pool.unpin_page(sibling_page_id, true);
        } else {
            self.store_node(&parent_page, &parent)?;
        }

        self.buffer_pool.unpin_page(parent_page_id, true);
        Ok(())
    }

    /// Rewrite a node's parent pointer in place.
    pub(crate) fn set_parent(&self, page_id: PageId, parent_page_id: PageId) -> Result<(), BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        {
            let mut page_guard = page.write();
            let mut node: BTreeNode<K> = crate::index::btree::serialization::deserialize_node(&page_guard)?;
            node.parent_page_id = parent_page_id;
            serialize_node(&node, &mut page_guard)?;
        }
        self.buffer_pool.unpin_page(page_id, true);
        Ok(())
    }

    /// Allocate a page for a tree node; an exhausted pool surfaces as
    /// out-of-memory.
    pub(crate) fn new_tree_page(&self) -> Result<(PagePtr, PageId), BTreeError> {
        match self.buffer_pool.new_page() {
            Ok(pair) => Ok(pair),
            Err(BufferPoolError::BufferPoolFull) => Err(BTreeError::OutOfMemory),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn store_node(&self, page: &PagePtr, node: &BTreeNode<K>) -> Result<(), BTreeError> {
        let mut page_guard = page.write();
        serialize_node(node, &mut page_guard)
    }
}
