use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use petradb::storage::buffer::BufferPoolManager;
use petradb::storage::disk::DiskManager;
use petradb::transaction::wal::LogManager;

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager over a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, path)?);
    Ok((buffer_pool, file))
}

// Create a disk manager, log manager and buffer pool sharing one database
#[allow(dead_code)]
pub fn create_test_wal_stack(
    pool_size: usize,
) -> Result<(Arc<DiskManager>, Arc<LogManager>, Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let log_manager = Arc::new(LogManager::new(disk_manager.clone()));
    let buffer_pool = Arc::new(BufferPoolManager::with_disk_manager(
        pool_size,
        disk_manager.clone(),
        Some(log_manager.clone()),
    ));
    Ok((disk_manager, log_manager, buffer_pool, file))
}
