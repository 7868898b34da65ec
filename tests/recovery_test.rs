use std::sync::Arc;
use anyhow::Result;

mod common;
use common::create_temp_db_file;

use petradb::common::types::{PageId, Rid, INVALID_PAGE_ID};
use petradb::storage::buffer::BufferPoolManager;
use petradb::storage::disk::DiskManager;
use petradb::storage::page::PageManager;
use petradb::transaction::concurrency::{LockManager, TransactionManager};
use petradb::transaction::wal::{LogManager, LogRecovery};

struct WalStack {
    log_manager: Arc<LogManager>,
    buffer_pool: Arc<BufferPoolManager>,
    txn_manager: TransactionManager,
    page_manager: PageManager,
}

fn open_stack(path: &str) -> Result<WalStack> {
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let log_manager = Arc::new(LogManager::new(disk_manager.clone()));
    let buffer_pool = Arc::new(BufferPoolManager::with_disk_manager(
        16,
        disk_manager,
        Some(log_manager.clone()),
    ));
    let lock_manager = Arc::new(LockManager::new(false));
    let txn_manager = TransactionManager::new(log_manager.clone(), lock_manager);
    Ok(WalStack {
        log_manager,
        buffer_pool,
        txn_manager,
        page_manager: PageManager::new(),
    })
}

/// Reopen the database after a simulated crash and run recovery.
fn recover(path: &str) -> Result<(Arc<BufferPoolManager>, PageManager)> {
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let buffer_pool = Arc::new(BufferPoolManager::with_disk_manager(16, disk_manager, None));
    let mut recovery = LogRecovery::new(buffer_pool.clone());
    recovery.recover()?;
    Ok((buffer_pool, PageManager::new()))
}

#[test]
fn test_redo_applies_committed_undo_removes_loser() -> Result<()> {
    let (_temp_file, path) = create_temp_db_file()?;

    let page_id: PageId;
    {
        let stack = open_stack(&path)?;

        // T1 creates the page, inserts "x" and commits.
        let t1 = stack.txn_manager.begin();
        let (page, id) = stack.buffer_pool.new_page()?;
        page_id = id;
        let rid_x = {
            let mut page_guard = page.write();
            stack.page_manager.init_page(
                &mut page_guard,
                INVALID_PAGE_ID,
                Some(&t1),
                Some(&stack.log_manager),
            );
            stack.page_manager.insert_tuple(
                &mut page_guard,
                b"x",
                Some(&t1),
                Some(&stack.log_manager),
            )?
        };
        assert_eq!(rid_x, Rid::new(page_id, 0));
        assert!(stack.buffer_pool.unpin_page(page_id, true));
        stack.txn_manager.commit(&t1);

        // T2 inserts "y" and never commits; its records still reach disk.
        let t2 = stack.txn_manager.begin();
        let page = stack.buffer_pool.fetch_page(page_id)?;
        {
            let mut page_guard = page.write();
            stack.page_manager.insert_tuple(
                &mut page_guard,
                b"y",
                Some(&t2),
                Some(&stack.log_manager),
            )?;
        }
        assert!(stack.buffer_pool.unpin_page(page_id, true));
        stack.log_manager.force_flush(t2.prev_lsn());

        // Crash: the stack drops with the data pages never flushed.
    }

    let (buffer_pool, page_manager) = recover(&path)?;

    let page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = page.read();
        // Redo replayed both inserts, undo removed the loser's.
        assert_eq!(page_manager.get_tuple(&page_guard, Rid::new(page_id, 0))?, b"x");
        assert!(page_manager.get_tuple(&page_guard, Rid::new(page_id, 1)).is_err());
        assert_eq!(page_manager.live_tuple_count(&page_guard), 1);
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_committed_workload_round_trip() -> Result<()> {
    let (_temp_file, path) = create_temp_db_file()?;

    let page_id: PageId;
    let rid_keep: Rid;
    let rid_updated: Rid;
    let rid_deleted: Rid;
    {
        let stack = open_stack(&path)?;
        let txn = stack.txn_manager.begin();
        let (page, id) = stack.buffer_pool.new_page()?;
        page_id = id;
        {
            let mut page_guard = page.write();
            stack.page_manager.init_page(
                &mut page_guard,
                INVALID_PAGE_ID,
                Some(&txn),
                Some(&stack.log_manager),
            );
            rid_keep = stack.page_manager.insert_tuple(
                &mut page_guard, b"keep", Some(&txn), Some(&stack.log_manager))?;
            rid_updated = stack.page_manager.insert_tuple(
                &mut page_guard, b"original", Some(&txn), Some(&stack.log_manager))?;
            rid_deleted = stack.page_manager.insert_tuple(
                &mut page_guard, b"doomed", Some(&txn), Some(&stack.log_manager))?;

            stack.page_manager.update_tuple(
                &mut page_guard, rid_updated, b"rewritten", Some(&txn), Some(&stack.log_manager))?;
            stack.page_manager.mark_delete(
                &mut page_guard, rid_deleted, Some(&txn), Some(&stack.log_manager))?;
            stack.page_manager.apply_delete(
                &mut page_guard, rid_deleted, Some(&txn), Some(&stack.log_manager))?;
        }
        assert!(stack.buffer_pool.unpin_page(page_id, true));
        stack.txn_manager.commit(&txn);
        // Crash without flushing any data page.
    }

    let (buffer_pool, page_manager) = recover(&path)?;

    let page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = page.read();
        assert_eq!(page_manager.get_tuple(&page_guard, rid_keep)?, b"keep");
        assert_eq!(page_manager.get_tuple(&page_guard, rid_updated)?, b"rewritten");
        assert!(page_manager.get_tuple(&page_guard, rid_deleted).is_err());
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_loser_update_and_delete_undone() -> Result<()> {
    let (_temp_file, path) = create_temp_db_file()?;

    let page_id: PageId;
    let rid_a: Rid;
    let rid_b: Rid;
    {
        let stack = open_stack(&path)?;

        // Committed baseline: two tuples.
        let t1 = stack.txn_manager.begin();
        let (page, id) = stack.buffer_pool.new_page()?;
        page_id = id;
        {
            let mut page_guard = page.write();
            stack.page_manager.init_page(
                &mut page_guard, INVALID_PAGE_ID, Some(&t1), Some(&stack.log_manager));
            rid_a = stack.page_manager.insert_tuple(
                &mut page_guard, b"alpha", Some(&t1), Some(&stack.log_manager))?;
            rid_b = stack.page_manager.insert_tuple(
                &mut page_guard, b"beta", Some(&t1), Some(&stack.log_manager))?;
        }
        assert!(stack.buffer_pool.unpin_page(page_id, true));
        stack.txn_manager.commit(&t1);

        // Loser transaction rewrites alpha and mark-deletes beta.
        let t2 = stack.txn_manager.begin();
        let page = stack.buffer_pool.fetch_page(page_id)?;
        {
            let mut page_guard = page.write();
            stack.page_manager.update_tuple(
                &mut page_guard, rid_a, b"mangled", Some(&t2), Some(&stack.log_manager))?;
            stack.page_manager.mark_delete(
                &mut page_guard, rid_b, Some(&t2), Some(&stack.log_manager))?;
        }
        assert!(stack.buffer_pool.unpin_page(page_id, true));
        stack.log_manager.force_flush(t2.prev_lsn());
        // Crash with T2 still active.
    }

    let (buffer_pool, page_manager) = recover(&path)?;

    let page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = page.read();
        assert_eq!(page_manager.get_tuple(&page_guard, rid_a)?, b"alpha");
        assert_eq!(page_manager.get_tuple(&page_guard, rid_b)?, b"beta");
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_recovery_idempotent_on_flushed_pages() -> Result<()> {
    // When the dirty page did reach disk before the crash, redo must skip
    // records the page LSN already covers.
    let (_temp_file, path) = create_temp_db_file()?;

    let page_id: PageId;
    let rid: Rid;
    {
        let stack = open_stack(&path)?;
        let txn = stack.txn_manager.begin();
        let (page, id) = stack.buffer_pool.new_page()?;
        page_id = id;
        {
            let mut page_guard = page.write();
            stack.page_manager.init_page(
                &mut page_guard, INVALID_PAGE_ID, Some(&txn), Some(&stack.log_manager));
            rid = stack.page_manager.insert_tuple(
                &mut page_guard, b"flushed", Some(&txn), Some(&stack.log_manager))?;
        }
        assert!(stack.buffer_pool.unpin_page(page_id, true));
        stack.txn_manager.commit(&txn);
        assert!(stack.buffer_pool.flush_page(page_id));
    }

    let (buffer_pool, page_manager) = recover(&path)?;

    let page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = page.read();
        assert_eq!(page_manager.get_tuple(&page_guard, rid)?, b"flushed");
        assert_eq!(page_manager.live_tuple_count(&page_guard), 1);
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}
