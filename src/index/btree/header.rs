use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId};

// The header page (page 0) stores (index-name -> root-page-id) records so
// indexes can be reopened by name: a u32 record count followed by fixed
// 36-byte records (32-byte padded name + 4-byte root page id).

const NAME_LEN: usize = 32;
const RECORD_SIZE: usize = NAME_LEN + 4;
const COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

fn padded_name(name: &str) -> [u8; NAME_LEN] {
    let mut padded = [0u8; NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_LEN);
    padded[..len].copy_from_slice(&bytes[..len]);
    padded
}

fn record_count(page: &Page) -> usize {
    LittleEndian::read_u32(&page.data[COUNT_OFFSET..COUNT_OFFSET + 4]) as usize
}

fn record_offset(index: usize) -> usize {
    RECORDS_OFFSET + index * RECORD_SIZE
}

fn find_record(page: &Page, name: &str) -> Option<usize> {
    let target = padded_name(name);
    (0..record_count(page)).find(|&i| {
        let offset = record_offset(i);
        page.data[offset..offset + NAME_LEN] == target
    })
}

/// Root page id registered under `name`, if any.
pub fn get_root(page: &Page, name: &str) -> Option<PageId> {
    let index = find_record(page, name)?;
    let offset = record_offset(index) + NAME_LEN;
    Some(LittleEndian::read_i32(&page.data[offset..offset + 4]))
}

/// Insert or update the root record for `name`.
pub fn set_root(page: &mut Page, name: &str, root_page_id: PageId) {
    let index = match find_record(page, name) {
        Some(index) => index,
        None => {
            let count = record_count(page);
            let offset = record_offset(count);
            page.data[offset..offset + NAME_LEN].copy_from_slice(&padded_name(name));
            LittleEndian::write_u32(&mut page.data[COUNT_OFFSET..COUNT_OFFSET + 4], count as u32 + 1);
            count
        }
    };
    let offset = record_offset(index) + NAME_LEN;
    LittleEndian::write_i32(&mut page.data[offset..offset + 4], root_page_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_record() {
        let page = Page::new(0);
        assert_eq!(get_root(&page, "orders_pk"), None);
    }

    #[test]
    fn test_insert_then_update() {
        let mut page = Page::new(0);
        set_root(&mut page, "orders_pk", 3);
        set_root(&mut page, "users_pk", 9);
        assert_eq!(get_root(&page, "orders_pk"), Some(3));
        assert_eq!(get_root(&page, "users_pk"), Some(9));

        set_root(&mut page, "orders_pk", 12);
        assert_eq!(get_root(&page, "orders_pk"), Some(12));
        assert_eq!(record_count(&page), 2);
    }
}
