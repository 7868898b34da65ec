use anyhow::Result;

mod common;
use common::create_test_wal_stack;

use petradb::common::types::{INVALID_LSN, INVALID_PAGE_ID};
use petradb::storage::page::PageManager;
use petradb::transaction::concurrency::{LockManager, TransactionManager};
use std::sync::Arc;

#[test]
fn test_commit_forces_log_to_disk() -> Result<()> {
    let (disk_manager, log_manager, buffer_pool, _temp_file) = create_test_wal_stack(8)?;
    log_manager.run_flush_thread();

    let lock_manager = Arc::new(LockManager::new(false));
    let txn_manager = TransactionManager::new(log_manager.clone(), lock_manager);
    let page_manager = PageManager::new();

    let txn = txn_manager.begin();
    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_manager.init_page(&mut page_guard, INVALID_PAGE_ID, Some(&txn), Some(&log_manager));
        page_manager.insert_tuple(&mut page_guard, b"durable", Some(&txn), Some(&log_manager))?;
    }
    assert!(buffer_pool.unpin_page(page_id, true));

    txn_manager.commit(&txn);

    // BEGIN, NEWPAGE, INSERT and COMMIT are all durable after commit.
    assert!(log_manager.persistent_lsn() >= txn.prev_lsn());
    assert!(disk_manager.log_size()? > 0);

    log_manager.stop_flush_thread();
    Ok(())
}

#[test]
fn test_eviction_respects_wal_ordering() -> Result<()> {
    // Two frames and no explicit flush: evicting the dirty tuple page must
    // first push the log out to at least the page's LSN.
    let (disk_manager, log_manager, buffer_pool, _temp_file) = create_test_wal_stack(2)?;

    let lock_manager = Arc::new(LockManager::new(false));
    let txn_manager = TransactionManager::new(log_manager.clone(), lock_manager);
    let page_manager = PageManager::new();

    let txn = txn_manager.begin();
    let (page, page_id) = buffer_pool.new_page()?;
    let page_lsn = {
        let mut page_guard = page.write();
        page_manager.init_page(&mut page_guard, INVALID_PAGE_ID, Some(&txn), Some(&log_manager));
        page_manager.insert_tuple(&mut page_guard, b"must follow log", Some(&txn), Some(&log_manager))?;
        page_guard.lsn
    };
    assert!(page_lsn != INVALID_LSN);
    assert!(buffer_pool.unpin_page(page_id, true));
    assert_eq!(log_manager.persistent_lsn(), INVALID_LSN);

    // Churn enough new pages through the two frames to evict our page.
    for _ in 0..4 {
        let (_, id) = buffer_pool.new_page()?;
        assert!(buffer_pool.unpin_page(id, false));
    }

    assert!(log_manager.persistent_lsn() >= page_lsn);
    assert!(disk_manager.log_size()? > 0);
    Ok(())
}
