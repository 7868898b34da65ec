use crate::common::types::{Page, PageId, Rid, PAGE_SIZE};
use crate::storage::page::error::PageError;
use crate::storage::page::header::PageHeader;
use crate::storage::page::layout::{HEADER_SIZE, SLOT_SIZE, DELETE_MASK, Slot};
use crate::transaction::concurrency::transaction::Transaction;
use crate::transaction::wal::log_manager::LogManager;
use crate::transaction::wal::log_record::LogRecord;

/// Tuple-level operations over a slotted page.
///
/// Slots grow backwards from the end of the page, tuple data forward from
/// the header. Deletion is two-phase: `mark_delete` sets the tombstone bit
/// in the slot, `apply_delete` vacates it, `rollback_delete` clears the
/// tombstone. Slot numbers are stable for the page's lifetime so record ids
/// held by the index and the log stay valid.
///
/// When a transaction and log manager are supplied, each mutation appends
/// its log record before the caller can release the page (WAL) and stamps
/// the page's LSN with the record's LSN.
pub struct PageManager;

impl Default for PageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageManager {
    pub fn new() -> Self {
        Self {}
    }

    /// Format `page` as an empty tuple page chained after `prev_page_id`.
    pub fn init_page(
        &self,
        page: &mut Page,
        prev_page_id: PageId,
        txn: Option<&Transaction>,
        log_manager: Option<&LogManager>,
    ) {
        let mut header = PageHeader::new();
        header.prev_page_id = prev_page_id;
        self.set_header(page, &header);

        if let (Some(txn), Some(log_manager)) = (txn, log_manager) {
            let mut record = LogRecord::new_page(txn.id(), txn.prev_lsn(), prev_page_id);
            let lsn = log_manager.append_log_record(&mut record);
            txn.set_prev_lsn(lsn);
            self.set_page_lsn(page, lsn);
        }
    }

    /// Append a tuple, returning its record id.
    pub fn insert_tuple(
        &self,
        page: &mut Page,
        data: &[u8],
        txn: Option<&Transaction>,
        log_manager: Option<&LogManager>,
    ) -> Result<Rid, PageError> {
        let mut header = self.get_header(page);

        let tuple_size = data.len() as u32;
        let space_needed = tuple_size + SLOT_SIZE as u32;
        if header.free_space_size < space_needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot_num = header.slot_count;
        let slot = Slot {
            offset: header.free_space_offset,
            length: tuple_size,
        };

        let data_end = header.free_space_offset as usize + data.len();
        page.data[header.free_space_offset as usize..data_end].copy_from_slice(data);
        self.set_slot(page, slot_num, &slot);

        header.free_space_offset += tuple_size;
        header.free_space_size -= space_needed;
        header.slot_count += 1;
        self.set_header(page, &header);

        let rid = Rid::new(page.page_id, slot_num);
        self.log_tuple_op(page, txn, log_manager, |txn_id, prev_lsn| {
            LogRecord::new_insert(txn_id, prev_lsn, rid, data.to_vec())
        });
        Ok(rid)
    }

    /// Place a tuple at a specific slot, growing the slot directory with
    /// vacant entries as needed. Used when recovery re-applies an insert or
    /// undoes an apply-delete.
    pub fn insert_tuple_at(
        &self,
        page: &mut Page,
        rid: Rid,
        data: &[u8],
        txn: Option<&Transaction>,
        log_manager: Option<&LogManager>,
    ) -> Result<(), PageError> {
        let mut header = self.get_header(page);
        let slot_num = rid.slot_num;

        if slot_num < header.slot_count {
            let slot = self.get_slot(page, slot_num);
            if !slot.is_vacant() {
                return Err(PageError::DuplicateTuple);
            }
        }

        let new_slots = (slot_num + 1).saturating_sub(header.slot_count);
        let tuple_size = data.len() as u32;
        let space_needed = tuple_size + new_slots * SLOT_SIZE as u32;
        if header.free_space_size < space_needed {
            return Err(PageError::InsufficientSpace);
        }

        // Pad the directory out to the target slot.
        for vacant in header.slot_count..slot_num {
            self.set_slot(page, vacant, &Slot { offset: 0, length: 0 });
        }

        let slot = Slot {
            offset: header.free_space_offset,
            length: tuple_size,
        };
        let data_end = header.free_space_offset as usize + data.len();
        page.data[header.free_space_offset as usize..data_end].copy_from_slice(data);
        self.set_slot(page, slot_num, &slot);

        header.free_space_offset += tuple_size;
        header.free_space_size -= space_needed;
        header.slot_count = header.slot_count.max(slot_num + 1);
        self.set_header(page, &header);

        self.log_tuple_op(page, txn, log_manager, |txn_id, prev_lsn| {
            LogRecord::new_insert(txn_id, prev_lsn, rid, data.to_vec())
        });
        Ok(())
    }

    /// Set the tombstone bit on a tuple.
    pub fn mark_delete(
        &self,
        page: &mut Page,
        rid: Rid,
        txn: Option<&Transaction>,
        log_manager: Option<&LogManager>,
    ) -> Result<(), PageError> {
        let mut slot = self.checked_slot(page, rid.slot_num)?;
        if slot.is_deleted() {
            return Err(PageError::TupleNotFound);
        }
        let tuple = self.read_tuple(page, &slot);

        slot.length |= DELETE_MASK;
        self.set_slot(page, rid.slot_num, &slot);

        self.log_tuple_op(page, txn, log_manager, |txn_id, prev_lsn| {
            LogRecord::new_mark_delete(txn_id, prev_lsn, rid, tuple)
        });
        Ok(())
    }

    /// Vacate a tuple's slot. The tuple must have been mark-deleted first,
    /// except during rollback and recovery where the mark may be absent.
    pub fn apply_delete(
        &self,
        page: &mut Page,
        rid: Rid,
        txn: Option<&Transaction>,
        log_manager: Option<&LogManager>,
    ) -> Result<(), PageError> {
        let slot = self.checked_slot(page, rid.slot_num)?;
        let tuple = self.read_tuple(page, &slot);

        self.set_slot(page, rid.slot_num, &Slot { offset: 0, length: 0 });

        self.log_tuple_op(page, txn, log_manager, |txn_id, prev_lsn| {
            LogRecord::new_apply_delete(txn_id, prev_lsn, rid, tuple)
        });
        Ok(())
    }

    /// Clear the tombstone bit set by `mark_delete`.
    pub fn rollback_delete(
        &self,
        page: &mut Page,
        rid: Rid,
        txn: Option<&Transaction>,
        log_manager: Option<&LogManager>,
    ) -> Result<(), PageError> {
        let mut slot = self.checked_slot(page, rid.slot_num)?;
        if !slot.is_deleted() {
            return Err(PageError::NotMarkedForDeletion);
        }

        slot.length &= !DELETE_MASK;
        self.set_slot(page, rid.slot_num, &slot);
        let tuple = self.read_tuple(page, &slot);

        self.log_tuple_op(page, txn, log_manager, |txn_id, prev_lsn| {
            LogRecord::new_rollback_delete(txn_id, prev_lsn, rid, tuple)
        });
        Ok(())
    }

    /// Overwrite a tuple in place (relocating within the page when it
    /// grows). Returns the old image.
    pub fn update_tuple(
        &self,
        page: &mut Page,
        rid: Rid,
        data: &[u8],
        txn: Option<&Transaction>,
        log_manager: Option<&LogManager>,
    ) -> Result<Vec<u8>, PageError> {
        let slot = self.checked_slot(page, rid.slot_num)?;
        if slot.is_deleted() {
            return Err(PageError::TupleNotFound);
        }
        let old_tuple = self.read_tuple(page, &slot);

        let new_size = data.len() as u32;
        if new_size <= slot.tuple_len() {
            let start = slot.offset as usize;
            page.data[start..start + data.len()].copy_from_slice(data);
            self.set_slot(page, rid.slot_num, &Slot { offset: slot.offset, length: new_size });
        } else {
            let mut header = self.get_header(page);
            if header.free_space_size < new_size {
                return Err(PageError::InsufficientSpace);
            }

            let new_offset = header.free_space_offset;
            let data_end = new_offset as usize + data.len();
            page.data[new_offset as usize..data_end].copy_from_slice(data);
            self.set_slot(page, rid.slot_num, &Slot { offset: new_offset, length: new_size });

            header.free_space_offset += new_size;
            header.free_space_size -= new_size;
            self.set_header(page, &header);
        }

        self.log_tuple_op(page, txn, log_manager, |txn_id, prev_lsn| {
            LogRecord::new_update(txn_id, prev_lsn, rid, old_tuple.clone(), data.to_vec())
        });
        Ok(old_tuple)
    }

    /// Read a live tuple's bytes.
    pub fn get_tuple(&self, page: &Page, rid: Rid) -> Result<Vec<u8>, PageError> {
        let slot = self.checked_slot(page, rid.slot_num)?;
        if slot.is_deleted() {
            return Err(PageError::TupleNotFound);
        }
        Ok(self.read_tuple(page, &slot))
    }

    /// Number of live (non-vacant, non-tombstoned) tuples.
    pub fn live_tuple_count(&self, page: &Page) -> u32 {
        let header = self.get_header(page);
        (0..header.slot_count)
            .map(|slot_num| self.get_slot(page, slot_num))
            .filter(|slot| !slot.is_vacant() && !slot.is_deleted())
            .count() as u32
    }

    pub fn get_header(&self, page: &Page) -> PageHeader {
        PageHeader::from_bytes(&page.data[0..HEADER_SIZE])
    }

    pub fn next_page_id(&self, page: &Page) -> PageId {
        self.get_header(page).next_page_id
    }

    /// LSN persisted in the page bytes; recovery's redo skip check.
    pub fn page_lsn(&self, page: &Page) -> crate::common::types::Lsn {
        self.get_header(page).lsn
    }

    pub fn set_page_lsn(&self, page: &mut Page, lsn: crate::common::types::Lsn) {
        let mut header = self.get_header(page);
        header.lsn = lsn;
        self.set_header(page, &header);
        page.lsn = lsn;
    }

    pub fn set_next_page_id(&self, page: &mut Page, next_page_id: PageId) {
        let mut header = self.get_header(page);
        header.next_page_id = next_page_id;
        self.set_header(page, &header);
    }

    fn set_header(&self, page: &mut Page, header: &PageHeader) {
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    fn slot_position(&self, slot_num: u32) -> usize {
        PAGE_SIZE - SLOT_SIZE * (slot_num as usize + 1)
    }

    fn get_slot(&self, page: &Page, slot_num: u32) -> Slot {
        let pos = self.slot_position(slot_num);
        Slot::from_bytes(&page.data[pos..pos + SLOT_SIZE])
    }

    fn set_slot(&self, page: &mut Page, slot_num: u32, slot: &Slot) {
        let pos = self.slot_position(slot_num);
        page.data[pos..pos + SLOT_SIZE].copy_from_slice(&slot.to_bytes());
    }

    /// Fetch a slot, rejecting out-of-range and vacant slots.
    fn checked_slot(&self, page: &Page, slot_num: u32) -> Result<Slot, PageError> {
        let header = self.get_header(page);
        if slot_num >= header.slot_count {
            return Err(PageError::InvalidSlot);
        }
        let slot = self.get_slot(page, slot_num);
        if slot.is_vacant() {
            return Err(PageError::TupleNotFound);
        }
        Ok(slot)
    }

    fn read_tuple(&self, page: &Page, slot: &Slot) -> Vec<u8> {
        let start = slot.offset as usize;
        let end = start + slot.tuple_len() as usize;
        page.data[start..end].to_vec()
    }

    fn log_tuple_op<F>(
        &self,
        page: &mut Page,
        txn: Option<&Transaction>,
        log_manager: Option<&LogManager>,
        make_record: F,
    ) where
        F: FnOnce(crate::common::types::TxnId, crate::common::types::Lsn) -> LogRecord,
    {
        if let (Some(txn), Some(log_manager)) = (txn, log_manager) {
            let mut record = make_record(txn.id(), txn.prev_lsn());
            let lsn = log_manager.append_log_record(&mut record);
            txn.set_prev_lsn(lsn);
            self.set_page_lsn(page, lsn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_page() -> (PageManager, Page) {
        let pm = PageManager::new();
        let mut page = Page::new(7);
        pm.init_page(&mut page, -1, None, None);
        (pm, page)
    }

    #[test]
    fn test_insert_and_get() {
        let (pm, mut page) = fresh_page();

        let rid_a = pm.insert_tuple(&mut page, b"alpha", None, None).unwrap();
        let rid_b = pm.insert_tuple(&mut page, b"beta", None, None).unwrap();
        assert_eq!(rid_a.slot_num, 0);
        assert_eq!(rid_b.slot_num, 1);

        assert_eq!(pm.get_tuple(&page, rid_a).unwrap(), b"alpha");
        assert_eq!(pm.get_tuple(&page, rid_b).unwrap(), b"beta");
        assert_eq!(pm.live_tuple_count(&page), 2);
    }

    #[test]
    fn test_delete_lifecycle() {
        let (pm, mut page) = fresh_page();
        let rid = pm.insert_tuple(&mut page, b"victim", None, None).unwrap();

        pm.mark_delete(&mut page, rid, None, None).unwrap();
        assert!(pm.get_tuple(&page, rid).is_err());
        assert_eq!(pm.live_tuple_count(&page), 0);

        pm.rollback_delete(&mut page, rid, None, None).unwrap();
        assert_eq!(pm.get_tuple(&page, rid).unwrap(), b"victim");

        pm.mark_delete(&mut page, rid, None, None).unwrap();
        pm.apply_delete(&mut page, rid, None, None).unwrap();
        assert!(pm.get_tuple(&page, rid).is_err());

        // The vacated slot can be refilled at the same rid.
        pm.insert_tuple_at(&mut page, rid, b"reborn", None, None).unwrap();
        assert_eq!(pm.get_tuple(&page, rid).unwrap(), b"reborn");
    }

    #[test]
    fn test_update_grow_and_shrink() {
        let (pm, mut page) = fresh_page();
        let rid = pm.insert_tuple(&mut page, b"short", None, None).unwrap();

        let old = pm.update_tuple(&mut page, rid, b"a much longer tuple", None, None).unwrap();
        assert_eq!(old, b"short");
        assert_eq!(pm.get_tuple(&page, rid).unwrap(), b"a much longer tuple");

        let old = pm.update_tuple(&mut page, rid, b"tiny", None, None).unwrap();
        assert_eq!(old, b"a much longer tuple");
        assert_eq!(pm.get_tuple(&page, rid).unwrap(), b"tiny");
    }

    #[test]
    fn test_insert_at_pads_directory() {
        let (pm, mut page) = fresh_page();
        let rid = Rid::new(7, 3);
        pm.insert_tuple_at(&mut page, rid, b"sparse", None, None).unwrap();

        assert_eq!(pm.get_tuple(&page, rid).unwrap(), b"sparse");
        assert_eq!(pm.get_header(&page).slot_count, 4);
        assert!(pm.get_tuple(&page, Rid::new(7, 1)).is_err());
        assert_eq!(pm.live_tuple_count(&page), 1);
    }

    #[test]
    fn test_insufficient_space() {
        let (pm, mut page) = fresh_page();
        let big = vec![0xabu8; PAGE_SIZE];
        assert!(matches!(
            pm.insert_tuple(&mut page, &big, None, None),
            Err(PageError::InsufficientSpace)
        ));
    }
}
