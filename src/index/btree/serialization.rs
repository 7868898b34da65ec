mod decoding;
mod encoding;
mod order;

pub use decoding::deserialize_node;
pub use encoding::serialize_node;
pub use order::{internal_capacity, leaf_capacity};
