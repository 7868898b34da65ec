use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{Transaction, TransactionState};
use crate::transaction::wal::log_manager::LogManager;
use crate::transaction::wal::log_record::LogRecord;

/// Creates and tracks transactions, writing their BEGIN/COMMIT/ABORT log
/// records and releasing their locks when they finish.
pub struct TransactionManager {
    next_txn_id: AtomicI32,
    log_manager: Arc<LogManager>,
    lock_manager: Arc<LockManager>,
    active_transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(log_manager: Arc<LogManager>, lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicI32::new(0),
            log_manager,
            lock_manager,
            active_transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a new transaction, logging BEGIN.
    pub fn begin(&self) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id));

        let mut record = LogRecord::new_begin(txn_id);
        let lsn = self.log_manager.append_log_record(&mut record);
        txn.set_prev_lsn(lsn);

        self.active_transactions.lock().insert(txn_id, txn.clone());
        txn
    }

    /// Commit: log COMMIT, block until it is durable, then release locks.
    pub fn commit(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Committed);

        let mut record = LogRecord::new_commit(txn.id(), txn.prev_lsn());
        let lsn = self.log_manager.append_log_record(&mut record);
        txn.set_prev_lsn(lsn);
        self.log_manager.force_flush(lsn);

        self.lock_manager.unlock_all(txn);
        self.active_transactions.lock().remove(&txn.id());
    }

    /// Abort: log ABORT and release locks. Reversal of the transaction's
    /// effects is recovery's undo pass.
    pub fn abort(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Aborted);

        let mut record = LogRecord::new_abort(txn.id(), txn.prev_lsn());
        let lsn = self.log_manager.append_log_record(&mut record);
        txn.set_prev_lsn(lsn);

        self.lock_manager.unlock_all(txn);
        self.active_transactions.lock().remove(&txn.id());
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active_transactions.lock().get(&txn_id).cloned()
    }

    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.active_transactions.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use crate::storage::disk::DiskManager;

    fn test_manager() -> (TransactionManager, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let disk_manager = Arc::new(DiskManager::new(file.path()).unwrap());
        let log_manager = Arc::new(LogManager::new(disk_manager));
        let lock_manager = Arc::new(LockManager::new(false));
        (TransactionManager::new(log_manager, lock_manager), file)
    }

    #[test]
    fn test_begin_assigns_sequential_ids() {
        let (tm, _file) = test_manager();
        let t0 = tm.begin();
        let t1 = tm.begin();
        assert_eq!(t0.id(), 0);
        assert_eq!(t1.id(), 1);
        assert_eq!(tm.active_transaction_ids().len(), 2);
    }

    #[test]
    fn test_commit_releases_and_untracks() {
        let (tm, _file) = test_manager();
        let txn = tm.begin();
        let begin_lsn = txn.prev_lsn();

        tm.commit(&txn);
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(txn.prev_lsn() > begin_lsn);
        assert!(tm.get_transaction(txn.id()).is_none());
    }

    #[test]
    fn test_abort_untracks() {
        let (tm, _file) = test_manager();
        let txn = tm.begin();
        tm.abort(&txn);
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(tm.get_transaction(txn.id()).is_none());
    }
}
