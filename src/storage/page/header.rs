use byteorder::{ByteOrder, LittleEndian};
use crate::common::types::{PageId, Lsn, PAGE_SIZE, INVALID_PAGE_ID, INVALID_LSN};
use crate::storage::page::layout::HEADER_SIZE;

/// Header of a slotted tuple page: free-space bookkeeping, the doubly
/// linked chain of pages forming a heap, and the page LSN of the last log
/// record applied here (recovery's redo skip check reads it).
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub free_space_offset: u32,
    pub free_space_size: u32,
    pub slot_count: u32,
    pub next_page_id: PageId,
    pub prev_page_id: PageId,
    pub lsn: Lsn,
}

impl Default for PageHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl PageHeader {
    pub fn new() -> Self {
        Self {
            free_space_offset: HEADER_SIZE as u32,
            free_space_size: (PAGE_SIZE - HEADER_SIZE) as u32,
            slot_count: 0,
            next_page_id: INVALID_PAGE_ID,
            prev_page_id: INVALID_PAGE_ID,
            lsn: INVALID_LSN,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.free_space_offset);
        LittleEndian::write_u32(&mut bytes[4..8], self.free_space_size);
        LittleEndian::write_u32(&mut bytes[8..12], self.slot_count);
        LittleEndian::write_i32(&mut bytes[12..16], self.next_page_id);
        LittleEndian::write_i32(&mut bytes[16..20], self.prev_page_id);
        LittleEndian::write_i32(&mut bytes[20..24], self.lsn);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            free_space_offset: LittleEndian::read_u32(&bytes[0..4]),
            free_space_size: LittleEndian::read_u32(&bytes[4..8]),
            slot_count: LittleEndian::read_u32(&bytes[8..12]),
            next_page_id: LittleEndian::read_i32(&bytes[12..16]),
            prev_page_id: LittleEndian::read_i32(&bytes[16..20]),
            lsn: LittleEndian::read_i32(&bytes[20..24]),
        }
    }
}
