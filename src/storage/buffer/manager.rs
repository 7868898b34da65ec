use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use log::debug;
use parking_lot::Mutex;

use crate::common::types::{Page, PageId, PagePtr, Frame, FrameId, FramePtr, INVALID_PAGE_ID};
use crate::storage::disk::DiskManager;
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::page_table::PageTable;
use crate::storage::buffer::replacer::LruReplacer;
use crate::transaction::wal::log_manager::LogManager;

/// Default bucket capacity for the page table's extendible hash directory.
const PAGE_TABLE_BUCKET_SIZE: usize = 64;

/// Buffer pool manager: mediates every page access, tracking pins and dirty
/// frames and writing victims through the disk manager.
///
/// The pool latch serializes all bookkeeping (page table, free list,
/// replacer, frame metadata). Page latches are the callers' business and are
/// never taken together with the pool latch on behalf of a caller.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<FramePtr>,
    page_table: PageTable,
    free_list: Mutex<VecDeque<FrameId>>,
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
    latch: Mutex<()>,
}

impl BufferPoolManager {
    /// Create a buffer pool over a fresh disk manager, without write-ahead
    /// logging. Convenient for storage-only tests.
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(pool_size, disk_manager, None))
    }

    /// Create a buffer pool over an existing disk manager, optionally wired
    /// to a log manager for the WAL eviction contract.
    pub fn with_disk_manager(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
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
            page_table: PageTable::new(PAGE_TABLE_BUCKET_SIZE),
            free_list: Mutex::new(free_list),
            replacer: LruReplacer::new(),
            disk_manager,
            log_manager,
            latch: Mutex::new(()),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Fetch a page, pinning its frame. On a miss the page is read from disk
    /// into a frame claimed from the free list or evicted via the replacer.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID || page_id < 0 {
            return Err(BufferPoolError::InvalidOperation(
                format!("cannot fetch page {}", page_id),
            ));
        }

        let _guard = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id];
            let mut frame_guard = frame.write();
            frame_guard.pin_count += 1;
            if frame_guard.pin_count == 1 {
                self.replacer.erase(frame_id);
            }
            return Ok(frame_guard.page.clone());
        }

        let frame_id = self.claim_frame()?;
        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();

        self.evict_frame_contents(&mut frame_guard)?;

        {
            let mut page_guard = frame_guard.page.write();
            page_guard.reset();
            self.disk_manager.read_page(page_id, &mut page_guard.data)?;
            page_guard.page_id = page_id;
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = false;

        self.page_table.insert(page_id, frame_id);
        Ok(frame_guard.page.clone())
    }

    /// Allocate a fresh page id and return it with a zeroed pinned frame.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let _guard = self.latch.lock();

        let frame_id = self.claim_frame()?;
        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();

        self.evict_frame_contents(&mut frame_guard)?;

        let page_id = self.disk_manager.allocate_page();
        {
            let mut page_guard = frame_guard.page.write();
            page_guard.reset();
            page_guard.page_id = page_id;
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = false;

        self.page_table.insert(page_id, frame_id);
        Ok((frame_guard.page.clone(), page_id))
    }

    /// Decrement a page's pin count, ORing in the dirty flag. Returns false
    /// when the page is not resident or already unpinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _guard = self.latch.lock();

        let frame_id = match self.page_table.find(&page_id) {
            Some(id) => id,
            None => return false,
        };

        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();
        if frame_guard.pin_count == 0 {
            return false;
        }

        frame_guard.pin_count -= 1;
        if is_dirty {
            frame_guard.is_dirty = true;
        }
        if frame_guard.pin_count == 0 {
            self.replacer.insert(frame_id);
        }
        true
    }

    /// Write a resident page's bytes through to disk. Returns false when the
    /// page id is invalid or the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        if page_id == INVALID_PAGE_ID {
            return false;
        }

        let _guard = self.latch.lock();
        self.flush_resident(page_id)
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) {
        let _guard = self.latch.lock();
        for (page_id, _) in self.page_table.entries() {
            self.flush_resident(page_id);
        }
    }

    /// Drop a page from the pool and deallocate it on disk. Returns false if
    /// the page is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        if page_id == INVALID_PAGE_ID {
            return false;
        }

        let _guard = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id];
            let mut frame_guard = frame.write();
            if frame_guard.pin_count > 0 {
                return false;
            }

            frame_guard.page.write().reset();
            frame_guard.is_dirty = false;

            self.replacer.erase(frame_id);
            self.page_table.remove(&page_id);
            self.free_list.lock().push_back(frame_id);
        }

        self.disk_manager.deallocate_page(page_id);
        true
    }

    /// Claim a frame for a new resident page: free list first, then the
    /// replacer. Fails when every frame is pinned.
    fn claim_frame(&self) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = self.free_list.lock().pop_front() {
            return Ok(frame_id);
        }
        match self.replacer.victim() {
            Some(frame_id) => Ok(frame_id),
            None => Err(BufferPoolError::BufferPoolFull),
        }
    }

    /// Write back a claimed frame's old page if dirty and drop its page
    /// table entry. Honors the WAL contract: the log is forced up to the
    /// page's LSN before the page bytes hit disk.
    fn evict_frame_contents(&self, frame_guard: &mut Frame) -> Result<(), BufferPoolError> {
        let (old_page_id, old_lsn) = {
            let page_guard = frame_guard.page.read();
            (page_guard.page_id, page_guard.lsn)
        };

        if old_page_id == INVALID_PAGE_ID {
            return Ok(());
        }

        if frame_guard.is_dirty {
            if let Some(log_manager) = &self.log_manager {
                if old_lsn > log_manager.persistent_lsn() {
                    log_manager.force_flush(old_lsn);
                }
            }
            debug!("evicting dirty page {} from frame {}", old_page_id, frame_guard.frame_id);
            let page_guard = frame_guard.page.read();
            self.disk_manager.write_page(old_page_id, &page_guard.data)?;
        }

        self.page_table.remove(&old_page_id);
        Ok(())
    }

    fn flush_resident(&self, page_id: PageId) -> bool {
        let frame_id = match self.page_table.find(&page_id) {
            Some(id) => id,
            None => return false,
        };

        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();
        let write_result = {
            let page_guard = frame_guard.page.read();
            self.disk_manager.write_page(page_id, &page_guard.data)
        };
        match write_result {
            Ok(()) => {
                frame_guard.is_dirty = false;
                true
            }
            Err(_) => false,
        }
    }
}
