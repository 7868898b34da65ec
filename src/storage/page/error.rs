use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Not enough space in page")]
    InsufficientSpace,
    #[error("Tuple not found")]
    TupleNotFound,
    #[error("Invalid slot number")]
    InvalidSlot,
    #[error("Tuple already exists at this slot")]
    DuplicateTuple,
    #[error("Tuple is not marked for deletion")]
    NotMarkedForDeletion,
}
