mod error;
mod header;
mod index;
mod node;
mod serialization;

pub use error::BTreeError;
pub use index::{BPlusTree, TreeIterator};
pub use node::BTreeNode;
