use std::marker::PhantomData;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::common::types::{PageId, Rid, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::storage::buffer::BufferPoolManager;
use crate::index::btree::error::BTreeError;
use crate::index::btree::header;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::{deserialize_node, internal_capacity, leaf_capacity};

/// Persistent B+ tree index over fixed-width keys, navigating entirely
/// through the buffer pool. The root page id is registered under the index
/// name in the header page so the tree survives restarts.
///
/// Operations serialize through the tree latch: mutations take it
/// exclusively, lookups and scan starts share it.
pub struct BPlusTree<K> {
    name: String,
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) root_page_id: Mutex<PageId>,
    pub(crate) latch: RwLock<()>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    pub(crate) _phantom: PhantomData<K>,
}

impl<K> BPlusTree<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open (or create) the index named `name`, sizing nodes from the key
    /// width.
    pub fn new(name: impl Into<String>, buffer_pool: Arc<BufferPoolManager>) -> Result<Self, BTreeError> {
        Self::with_max_sizes(name, buffer_pool, leaf_capacity::<K>(), internal_capacity::<K>())
    }

    /// Open with explicit node capacities (small trees in tests).
    pub fn with_max_sizes(
        name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        let name = name.into();

        let header_page = buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let root_page_id = {
            let page_guard = header_page.read();
            header::get_root(&page_guard, &name).unwrap_or(INVALID_PAGE_ID)
        };
        buffer_pool.unpin_page(HEADER_PAGE_ID, false);

        Ok(Self {
            name,
            buffer_pool,
            root_page_id: Mutex::new(root_page_id),
            latch: RwLock::new(()),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.lock() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    /// Point lookup.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>, BTreeError> {
        let _guard = self.latch.read();
        if self.is_empty() {
            return Ok(None);
        }

        let leaf_page_id = self.find_leaf_page(Some(key))?;
        let node = self.load_node(leaf_page_id)?;
        let result = node.lookup(key);
        self.buffer_pool.unpin_page(leaf_page_id, false);
        Ok(result)
    }

    /// Descend from the root to the leaf covering `key` (or the leftmost
    /// leaf when `key` is None), unpinning each internal page as its child
    /// is fetched.
    pub(crate) fn find_leaf_page(&self, key: Option<&K>) -> Result<PageId, BTreeError> {
        let mut page_id = *self.root_page_id.lock();
        debug_assert_ne!(page_id, INVALID_PAGE_ID);

        loop {
            let node = self.load_node(page_id)?;
            if node.is_leaf {
                self.buffer_pool.unpin_page(page_id, false);
                return Ok(page_id);
            }

            let child_index = match key {
                Some(key) => node.child_index_for(key),
                None => 0,
            };
            let child_page_id = node.children[child_index];
            self.buffer_pool.unpin_page(page_id, false);
            page_id = child_page_id;
        }
    }

    /// Fetch a page and deserialize its node. The page stays pinned; the
    /// caller owns the matching unpin.
    pub(crate) fn load_node(&self, page_id: PageId) -> Result<BTreeNode<K>, BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let page_guard = page.read();
        deserialize_node(&page_guard)
    }

    /// Snapshot of the root node, for tests and debugging.
    pub fn root_node(&self) -> Result<Option<BTreeNode<K>>, BTreeError> {
        let root_page_id = *self.root_page_id.lock();
        if root_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        let node = self.load_node(root_page_id)?;
        self.buffer_pool.unpin_page(root_page_id, false);
        Ok(Some(node))
    }

    /// Record a root change in the header page.
    pub(crate) fn update_root_page_id(&self, root_page_id: PageId) -> Result<(), BTreeError> {
        *self.root_page_id.lock() = root_page_id;

        let header_page = self.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        {
            let mut page_guard = header_page.write();
            header::set_root(&mut page_guard, &self.name, root_page_id);
        }
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, true);
        Ok(())
    }
}
