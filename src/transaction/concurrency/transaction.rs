use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Lsn, Rid, TxnId, INVALID_LSN};

/// Two-phase-locking transaction states. A transaction starts GROWING,
/// moves to SHRINKING on its first (non-strict) unlock, and ends in
/// COMMITTED or ABORTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// An active transaction. Identity orders transactions for wait-die:
/// smaller id means older. State and prev-LSN are mutated through `&self`
/// because the lock manager and the WAL touch them from other threads.
pub struct Transaction {
    id: TxnId,
    state: RwLock<TransactionState>,
    /// LSN of this transaction's most recent log record.
    prev_lsn: AtomicI32,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            state: RwLock::new(TransactionState::Growing),
            prev_lsn: AtomicI32::new(INVALID_LSN),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn.load(Ordering::SeqCst)
    }

    pub fn set_prev_lsn(&self, lsn: Lsn) {
        self.prev_lsn.store(lsn, Ordering::SeqCst);
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: &Rid) {
        self.shared_lock_set.lock().remove(rid);
    }

    pub fn remove_exclusive_lock(&self, rid: &Rid) {
        self.exclusive_lock_set.lock().remove(rid);
    }

    pub fn holds_shared_lock(&self, rid: &Rid) -> bool {
        self.shared_lock_set.lock().contains(rid)
    }

    pub fn holds_exclusive_lock(&self, rid: &Rid) -> bool {
        self.exclusive_lock_set.lock().contains(rid)
    }

    /// Every rid this transaction currently holds, in either mode.
    pub fn held_locks(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }
}
