use std::any::TypeId;
use byteorder::{ByteOrder, LittleEndian};
use serde::de::DeserializeOwned;

use crate::common::types::{Page, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use super::encoding::{NODE_HEADER_SIZE, RID_BYTES, CHILD_BYTES};

/// Deserialize a B+ tree node from a page.
pub fn deserialize_node<K>(page: &Page) -> Result<BTreeNode<K>, BTreeError>
where
    K: DeserializeOwned + Clone + Ord + 'static,
{
    let is_leaf = page.data[0] == 1;
    let key_count = LittleEndian::read_u16(&page.data[1..3]) as usize;
    let value_count = LittleEndian::read_u16(&page.data[3..5]) as usize;
    let page_id = LittleEndian::read_i32(&page.data[5..9]);
    let parent_page_id = LittleEndian::read_i32(&page.data[9..13]);
    let next_leaf = LittleEndian::read_i32(&page.data[13..17]);
    let max_size = LittleEndian::read_u16(&page.data[17..19]) as usize;

    let mut node = if is_leaf {
        BTreeNode::new_leaf(page_id, parent_page_id, max_size)
    } else {
        BTreeNode::new_internal(page_id, parent_page_id, max_size)
    };
    node.next_leaf = if is_leaf { next_leaf } else { INVALID_PAGE_ID };

    let mut offset = NODE_HEADER_SIZE;

    if TypeId::of::<K>() == TypeId::of::<i32>() {
        for _ in 0..key_count {
            let raw = LittleEndian::read_i32(&page.data[offset..offset + 4]);
            // Safe: K is i32, checked above.
            node.keys.push(unsafe { std::mem::transmute_copy::<i32, K>(&raw) });
            offset += 4;
        }
    } else {
        for _ in 0..key_count {
            let key_len = LittleEndian::read_u16(&page.data[offset..offset + 2]) as usize;
            offset += 2;
            let key = bincode::deserialize(&page.data[offset..offset + key_len])
                .map_err(|e| BTreeError::SerializationError(e.to_string()))?;
            offset += key_len;
            node.keys.push(key);
        }
    }

    if is_leaf {
        for _ in 0..value_count {
            let rid_page = LittleEndian::read_i32(&page.data[offset..offset + 4]);
            let rid_slot = LittleEndian::read_u32(&page.data[offset + 4..offset + 8]);
            node.values.push(Rid::new(rid_page, rid_slot));
            offset += RID_BYTES;
        }
    } else {
        for _ in 0..value_count {
            node.children.push(LittleEndian::read_i32(&page.data[offset..offset + 4]));
            offset += CHILD_BYTES;
        }
    }

    Ok(node)
}
