use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Size of each in-memory log buffer. Large enough that any single record
/// fits: the widest (UPDATE) carries two page-bounded tuple images.
pub const LOG_BUFFER_SIZE: usize = 4 * PAGE_SIZE;

/// Page ID type (4-byte signed)
pub type PageId = i32;

/// Transaction ID type
pub type TxnId = i32;

/// LSN (Log Sequence Number) type
pub type Lsn = i32;

/// Buffer pool frame ID type
pub type FrameId = usize;

pub const INVALID_PAGE_ID: PageId = -1;
pub const INVALID_TXN_ID: TxnId = -1;
pub const INVALID_LSN: Lsn = -1;

/// Reserved page holding (index name -> root page id) records
pub const HEADER_PAGE_ID: PageId = 0;

/// Record ID: locates a tuple as (page, slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_num)
    }
}

/// Page structure: raw bytes plus identity and the LSN of the last
/// log record applied to it
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
    pub lsn: Lsn,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
            lsn: INVALID_LSN,
        }
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
        self.page_id = INVALID_PAGE_ID;
        self.lsn = INVALID_LSN;
    }
}

/// Smart pointer to a page; the RwLock doubles as the per-page latch
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame structure
#[derive(Debug)]
pub struct Frame {
    pub page: PagePtr,
    pub frame_id: FrameId,
    pub is_dirty: bool,
    pub pin_count: u32,
}

impl Frame {
    pub fn new(frame_id: FrameId, page: PagePtr) -> Self {
        Self {
            page,
            frame_id,
            is_dirty: false,
            pin_count: 0,
        }
    }
}

/// Smart pointer to a frame
pub type FramePtr = Arc<RwLock<Frame>>;
