use std::sync::Arc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::storage::buffer::BufferPoolManager;
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::deserialize_node;
use super::base::BPlusTree;

/// Forward scan over the leaf chain. Each leaf is fetched, decoded and
/// unpinned before iteration continues, so advancing across a leaf
/// boundary touches exactly one page.
pub struct TreeIterator<K> {
    buffer_pool: Arc<BufferPoolManager>,
    node: Option<BTreeNode<K>>,
    index: usize,
}

impl<K> BPlusTree<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<TreeIterator<K>, BTreeError> {
        let _guard = self.latch.read();
        if self.is_empty() {
            return Ok(TreeIterator::exhausted(self.buffer_pool.clone()));
        }

        let leaf_page_id = self.find_leaf_page(None)?;
        let node = self.load_node(leaf_page_id)?;
        self.buffer_pool.unpin_page(leaf_page_id, false);

        let mut iter = TreeIterator {
            buffer_pool: self.buffer_pool.clone(),
            node: Some(node),
            index: 0,
        };
        iter.skip_exhausted()?;
        Ok(iter)
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn begin_at(&self, key: &K) -> Result<TreeIterator<K>, BTreeError> {
        let _guard = self.latch.read();
        if self.is_empty() {
            return Ok(TreeIterator::exhausted(self.buffer_pool.clone()));
        }

        let leaf_page_id = self.find_leaf_page(Some(key))?;
        let node = self.load_node(leaf_page_id)?;
        self.buffer_pool.unpin_page(leaf_page_id, false);

        let index = node.key_index(key);
        let mut iter = TreeIterator {
            buffer_pool: self.buffer_pool.clone(),
            node: Some(node),
            index,
        };
        iter.skip_exhausted()?;
        Ok(iter)
    }
}

impl<K> TreeIterator<K>
where
    K: Clone + Ord + DeserializeOwned + 'static,
{
    fn exhausted(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            node: None,
            index: 0,
        }
    }

    /// True once the scan has moved past the last element of the last leaf.
    pub fn is_end(&self) -> bool {
        self.node.is_none()
    }

    /// The entry under the cursor.
    pub fn current(&self) -> Option<(&K, &Rid)> {
        let node = self.node.as_ref()?;
        Some((&node.keys[self.index], &node.values[self.index]))
    }

    /// Hop leaves while the cursor sits past the current leaf's last key.
    fn skip_exhausted(&mut self) -> Result<(), BTreeError> {
        loop {
            let next_leaf = match &self.node {
                Some(node) if self.index >= node.keys.len() => node.next_leaf,
                _ => return Ok(()),
            };

            if next_leaf == INVALID_PAGE_ID {
                self.node = None;
                return Ok(());
            }

            let page = self.buffer_pool.fetch_page(next_leaf)?;
            let node = {
                let page_guard = page.read();
                deserialize_node(&page_guard)?
            };
            self.buffer_pool.unpin_page(next_leaf, false);
            self.node = Some(node);
            self.index = 0;
        }
    }
}

impl<K> Iterator for TreeIterator<K>
where
    K: Clone + Ord + DeserializeOwned + 'static,
{
    type Item = (K, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node.as_ref()?;
        let entry = (node.keys[self.index].clone(), node.values[self.index]);

        self.index += 1;
        // A failed leaf hop ends the scan.
        if self.skip_exhausted().is_err() {
            self.node = None;
        }

        Some(entry)
    }
}
