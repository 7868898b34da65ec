use std::mem;
use crate::common::types::PAGE_SIZE;
use super::encoding::{NODE_HEADER_SIZE, RID_BYTES, CHILD_BYTES};

// Rough estimates based on in-memory key width; variable-width keys pay
// serialization overhead the estimate ignores, which the encoder catches
// with NodeTooLarge.

/// Max entries in a leaf page, with one slot reserved so an insert can
/// overflow before the split.
pub fn leaf_capacity<K>() -> usize {
    let key_size = mem::size_of::<K>();
    let capacity = (PAGE_SIZE - NODE_HEADER_SIZE) / (key_size + RID_BYTES);
    capacity.saturating_sub(1).max(2)
}

/// Max children in an internal page.
pub fn internal_capacity<K>() -> usize {
    let key_size = mem::size_of::<K>();
    let capacity = (PAGE_SIZE - NODE_HEADER_SIZE) / (key_size + CHILD_BYTES);
    capacity.max(3)
}
