use std::collections::{HashMap, HashSet, VecDeque};
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{Transaction, TransactionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
struct WaitingItem {
    txn_id: TxnId,
    mode: LockMode,
}

/// Per-rid lock state: the granted set with its mode, the oldest granted
/// transaction (wait-die pivot), and the FIFO queue of waiters.
struct LockRequest {
    mode: LockMode,
    granted: HashSet<TxnId>,
    oldest: TxnId,
    waiting: VecDeque<WaitingItem>,
}

impl LockRequest {
    fn new() -> Self {
        Self {
            mode: LockMode::Shared,
            granted: HashSet::new(),
            oldest: TxnId::MAX,
            waiting: VecDeque::new(),
        }
    }
}

/// Tuple-level lock manager implementing wait-die deadlock avoidance:
/// older transactions (smaller id) may wait for a lock, younger ones are
/// aborted the moment they would block on an older holder.
///
/// One mutex guards the whole lock table; grants wake every waiter because
/// the heterogeneous queues make targeted signaling unsafe.
pub struct LockManager {
    strict_2pl: bool,
    table: Mutex<HashMap<Rid, LockRequest>>,
    cv: Condvar,
}

impl LockManager {
    pub fn new(strict_2pl: bool) -> Self {
        Self {
            strict_2pl,
            table: Mutex::new(HashMap::new()),
            cv: Condvar::new(),
        }
    }

    /// Acquire a shared lock. Returns false when the transaction is aborted
    /// by wait-die (its state is set to ABORTED).
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.table.lock();
        if !self.can_acquire(txn) {
            return false;
        }
        let txn_id = txn.id();

        {
            let req = table.entry(rid).or_insert_with(LockRequest::new);
            if req.granted.is_empty() {
                req.mode = LockMode::Shared;
                req.granted.insert(txn_id);
                req.oldest = txn_id;
                txn.add_shared_lock(rid);
                return true;
            }
            if req.mode == LockMode::Shared {
                req.granted.insert(txn_id);
                req.oldest = req.oldest.min(txn_id);
                txn.add_shared_lock(rid);
                return true;
            }

            // Exclusively held. Die if we are younger than the holder.
            if txn_id > req.oldest {
                debug!("wait-die: aborting txn {} (S on {} held X by older)", txn_id, rid);
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            req.waiting.push_back(WaitingItem { txn_id, mode: LockMode::Shared });
        }

        if self.wait_for_grant(&mut table, txn, rid) {
            txn.add_shared_lock(rid);
            true
        } else {
            false
        }
    }

    /// Acquire an exclusive lock. Wait-die: abort if any current holder is
    /// older, otherwise queue up behind them.
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.table.lock();
        if !self.can_acquire(txn) {
            return false;
        }
        let txn_id = txn.id();

        {
            let req = table.entry(rid).or_insert_with(LockRequest::new);
            if req.granted.is_empty() {
                req.mode = LockMode::Exclusive;
                req.granted.insert(txn_id);
                req.oldest = txn_id;
                txn.add_exclusive_lock(rid);
                return true;
            }
            if req.granted.contains(&txn_id) && req.mode == LockMode::Exclusive {
                return true;
            }

            if req.oldest < txn_id {
                debug!("wait-die: aborting txn {} (X on {} held by older)", txn_id, rid);
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            req.waiting.push_back(WaitingItem { txn_id, mode: LockMode::Exclusive });
        }

        if self.wait_for_grant(&mut table, txn, rid) {
            txn.add_exclusive_lock(rid);
            true
        } else {
            false
        }
    }

    /// Upgrade a held shared lock to exclusive. The sole holder upgrades in
    /// place; otherwise the transaction steps out of the granted set and
    /// waits at the front of the queue.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.table.lock();
        if !self.can_acquire(txn) {
            return false;
        }
        let txn_id = txn.id();

        {
            let req = match table.get_mut(&rid) {
                Some(req) => req,
                None => return false,
            };
            if req.mode != LockMode::Shared || !req.granted.contains(&txn_id) {
                return false;
            }

            if req.granted.len() == 1 {
                req.mode = LockMode::Exclusive;
                req.oldest = txn_id;
                txn.remove_shared_lock(&rid);
                txn.add_exclusive_lock(rid);
                return true;
            }

            req.granted.remove(&txn_id);
            req.waiting.push_front(WaitingItem { txn_id, mode: LockMode::Exclusive });
        }

        if self.wait_for_grant(&mut table, txn, rid) {
            txn.remove_shared_lock(&rid);
            txn.add_exclusive_lock(rid);
            true
        } else {
            false
        }
    }

    /// Release a lock. Under strict 2PL only committed or aborted
    /// transactions may unlock; otherwise the first unlock moves the
    /// transaction to SHRINKING.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.table.lock();

        if self.strict_2pl
            && !matches!(txn.state(), TransactionState::Committed | TransactionState::Aborted)
        {
            return false;
        }
        if txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }

        let txn_id = txn.id();
        let req = match table.get_mut(&rid) {
            Some(req) => req,
            None => return false,
        };
        if !req.granted.remove(&txn_id) {
            return false;
        }

        match req.mode {
            LockMode::Shared => txn.remove_shared_lock(&rid),
            LockMode::Exclusive => txn.remove_exclusive_lock(&rid),
        }

        req.oldest = req.granted.iter().copied().min().unwrap_or(TxnId::MAX);
        if req.granted.is_empty() {
            Self::grant_from_queue(req);
        }
        self.cv.notify_all();
        true
    }

    /// Release everything a finished transaction still holds.
    pub fn unlock_all(&self, txn: &Transaction) {
        for rid in txn.held_locks() {
            self.unlock(txn, rid);
        }
    }

    /// A transaction in SHRINKING (or finished) may not acquire new locks.
    fn can_acquire(&self, txn: &Transaction) -> bool {
        txn.state() == TransactionState::Growing
    }

    /// Move the head of the waiting queue into the granted set; a shared
    /// head pulls every adjacent shared waiter with it.
    fn grant_from_queue(req: &mut LockRequest) {
        let head = match req.waiting.pop_front() {
            Some(item) => item,
            None => return,
        };
        req.mode = head.mode;
        req.granted.insert(head.txn_id);
        req.oldest = head.txn_id;

        if head.mode == LockMode::Shared {
            while let Some(next) = req.waiting.front().copied() {
                if next.mode != LockMode::Shared {
                    break;
                }
                req.waiting.pop_front();
                req.granted.insert(next.txn_id);
                req.oldest = req.oldest.min(next.txn_id);
            }
        }
    }

    /// Park on the condition variable until our queued request is granted.
    /// A waiter that was aborted while parked (wait-die elsewhere, or an
    /// external abort) withdraws its queue entry and reports failure.
    fn wait_for_grant(
        &self,
        table: &mut parking_lot::MutexGuard<'_, HashMap<Rid, LockRequest>>,
        txn: &Transaction,
        rid: Rid,
    ) -> bool {
        let txn_id = txn.id();
        loop {
            self.cv.wait(table);

            if txn.state() == TransactionState::Aborted {
                if let Some(req) = table.get_mut(&rid) {
                    req.waiting.retain(|item| item.txn_id != txn_id);
                    req.granted.remove(&txn_id);
                }
                return false;
            }
            if let Some(req) = table.get(&rid) {
                if req.granted.contains(&txn_id) {
                    return true;
                }
            }
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_locks_coexist() {
        let lm = LockManager::new(false);
        let t1 = Transaction::new(1);
        let t2 = Transaction::new(2);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_shared(&t1, rid));
        assert!(lm.lock_shared(&t2, rid));
        assert!(t1.holds_shared_lock(&rid));
        assert!(t2.holds_shared_lock(&rid));

        assert!(lm.unlock(&t1, rid));
        assert!(lm.unlock(&t2, rid));
    }

    #[test]
    fn test_wait_die_aborts_younger() {
        let lm = LockManager::new(false);
        let holder = Transaction::new(1);
        let younger = Transaction::new(2);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_exclusive(&holder, rid));
        assert!(!lm.lock_shared(&younger, rid));
        assert_eq!(younger.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_upgrade_sole_holder() {
        let lm = LockManager::new(false);
        let txn = Transaction::new(1);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_shared(&txn, rid));
        assert!(lm.lock_upgrade(&txn, rid));
        assert!(txn.holds_exclusive_lock(&rid));
        assert!(!txn.holds_shared_lock(&rid));
    }

    #[test]
    fn test_strict_2pl_rejects_early_unlock() {
        let lm = LockManager::new(true);
        let txn = Transaction::new(1);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_shared(&txn, rid));
        assert!(!lm.unlock(&txn, rid));

        txn.set_state(TransactionState::Committed);
        assert!(lm.unlock(&txn, rid));
    }

    #[test]
    fn test_shrinking_blocks_new_locks() {
        let lm = LockManager::new(false);
        let txn = Transaction::new(1);
        let rid_a = Rid::new(1, 0);
        let rid_b = Rid::new(1, 1);

        assert!(lm.lock_shared(&txn, rid_a));
        assert!(lm.unlock(&txn, rid_a));
        assert_eq!(txn.state(), TransactionState::Shrinking);
        assert!(!lm.lock_shared(&txn, rid_b));
    }
}
