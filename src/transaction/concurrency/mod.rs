pub mod lock_manager;
pub mod transaction;
pub mod transaction_manager;

pub use lock_manager::{LockManager, LockMode};
pub use transaction::{Transaction, TransactionState};
pub use transaction_manager::TransactionManager;
