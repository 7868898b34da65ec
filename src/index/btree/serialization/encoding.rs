use std::any::TypeId;
use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::common::types::{Page, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;

// Node page layout:
// - is_leaf: u8 (1 byte)
// - key_count: u16
// - value_count: u16 (children for internal, rids for leaf)
// - page_id: i32
// - parent_page_id: i32
// - next_leaf: i32
// - max_size: u16
// then the keys, then the values/children.
pub(crate) const NODE_HEADER_SIZE: usize = 19;

pub(crate) const RID_BYTES: usize = 8;
pub(crate) const CHILD_BYTES: usize = 4;

/// Serialize a B+ tree node into a page.
pub fn serialize_node<K>(node: &BTreeNode<K>, page: &mut Page) -> Result<(), BTreeError>
where
    K: Serialize + Clone + Ord + 'static,
{
    page.data.fill(0);

    page.data[0] = if node.is_leaf { 1 } else { 0 };
    LittleEndian::write_u16(&mut page.data[1..3], node.keys.len() as u16);
    let value_count = if node.is_leaf { node.values.len() } else { node.children.len() };
    LittleEndian::write_u16(&mut page.data[3..5], value_count as u16);
    LittleEndian::write_i32(&mut page.data[5..9], node.page_id);
    LittleEndian::write_i32(&mut page.data[9..13], node.parent_page_id);
    LittleEndian::write_i32(&mut page.data[13..17], node.next_leaf);
    LittleEndian::write_u16(&mut page.data[17..19], node.max_size as u16);

    let mut offset = NODE_HEADER_SIZE;

    // Fast path for i32 keys, bincode with a length prefix otherwise.
    if TypeId::of::<K>() == TypeId::of::<i32>() {
        let keys = unsafe { &*(node.keys.as_slice() as *const [K] as *const [i32]) };
        for &key in keys {
            if offset + 4 > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            LittleEndian::write_i32(&mut page.data[offset..offset + 4], key);
            offset += 4;
        }
    } else {
        for key in &node.keys {
            let key_bytes = bincode::serialize(key)
                .map_err(|e| BTreeError::SerializationError(e.to_string()))?;
            if offset + 2 + key_bytes.len() > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            LittleEndian::write_u16(&mut page.data[offset..offset + 2], key_bytes.len() as u16);
            offset += 2;
            page.data[offset..offset + key_bytes.len()].copy_from_slice(&key_bytes);
            offset += key_bytes.len();
        }
    }

    if node.is_leaf {
        for value in &node.values {
            if offset + RID_BYTES > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            LittleEndian::write_i32(&mut page.data[offset..offset + 4], value.page_id);
            LittleEndian::write_u32(&mut page.data[offset + 4..offset + 8], value.slot_num);
            offset += RID_BYTES;
        }
    } else {
        for &child in &node.children {
            if offset + CHILD_BYTES > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            LittleEndian::write_i32(&mut page.data[offset..offset + 4], child);
            offset += CHILD_BYTES;
        }
    }

    Ok(())
}
