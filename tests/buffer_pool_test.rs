use anyhow::Result;

mod common;
use common::create_test_buffer_pool;

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;

    // Page 0 is reserved for the header page
    assert!(page_id > 0);
    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(page_id, false));

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(page_guard.page_id, page_id);
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_double_unpin_rejected() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(page_id, false));
    assert!(!buffer_pool.unpin_page(page_id, false));
    assert!(!buffer_pool.unpin_page(999, false));
    Ok(())
}

#[test]
fn test_dirty_page_survives_eviction() -> Result<()> {
    // Pool of 3 frames; writing 6 pages forces dirty evictions.
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let mut page_ids = Vec::new();
    for i in 0..6u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[0] = i + 1;
        }
        assert!(buffer_pool.unpin_page(page_id, true));
        page_ids.push(page_id);
    }

    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = buffer_pool.fetch_page(page_id)?;
        {
            let page_guard = page.read();
            assert_eq!(page_guard.data[0], i as u8 + 1);
        }
        assert!(buffer_pool.unpin_page(page_id, false));
    }
    Ok(())
}

#[test]
fn test_all_pinned_exhausts_pool() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let mut pinned = Vec::new();
    for _ in 0..3 {
        let (_, page_id) = buffer_pool.new_page()?;
        pinned.push(page_id);
    }

    assert!(buffer_pool.new_page().is_err());
    assert!(buffer_pool.fetch_page(pinned[0]).is_ok()); // resident, re-pin ok

    assert!(buffer_pool.unpin_page(pinned[0], false));
    assert!(buffer_pool.unpin_page(pinned[0], false));
    assert!(buffer_pool.new_page().is_ok());
    Ok(())
}

#[test]
fn test_lru_victim_order() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let mut page_ids = Vec::new();
    for i in 0..3u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        page.write().data[0] = i + 10;
        assert!(buffer_pool.unpin_page(page_id, true));
        page_ids.push(page_id);
    }

    // Touch the oldest page so the middle one becomes the LRU victim.
    buffer_pool.fetch_page(page_ids[0])?;
    assert!(buffer_pool.unpin_page(page_ids[0], false));

    let (_, new_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(new_id, false));

    // Whatever was evicted went through disk: every page still reads back.
    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = buffer_pool.fetch_page(page_id)?;
        assert_eq!(page.read().data[0], i as u8 + 10);
        assert!(buffer_pool.unpin_page(page_id, false));
    }
    Ok(())
}

#[test]
fn test_flush_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_guard.data[100..109].copy_from_slice(b"Test Data");
    }
    assert!(buffer_pool.unpin_page(page_id, true));
    assert!(buffer_pool.flush_page(page_id));
    assert!(!buffer_pool.flush_page(12345));

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(&page_guard.data[100..109], b"Test Data");
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;

    // Pinned pages cannot be deleted.
    assert!(!buffer_pool.delete_page(page_id));

    assert!(buffer_pool.unpin_page(page_id, false));
    assert!(buffer_pool.delete_page(page_id));

    // The freed frame is reusable.
    let (_, new_page_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(new_page_id, false));
    Ok(())
}
