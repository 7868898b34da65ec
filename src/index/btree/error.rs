use thiserror::Error;
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Out of memory: no frame available for a tree page")]
    OutOfMemory,

    #[error("Serialized node does not fit in a page")]
    NodeTooLarge,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid page format")]
    InvalidPageFormat,
}
