use std::fs::{File, OpenOptions};
use std::io::{Read, Write, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, PAGE_SIZE, HEADER_PAGE_ID};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager handles fixed-size page I/O against the database file and
/// append-only I/O against the log file kept beside it.
pub struct DiskManager {
    db_file: Mutex<File>,
    log_file: Mutex<File>,
    log_path: PathBuf,
    next_page_id: AtomicI32,
}

impl DiskManager {
    /// Open (or create) the database file and its companion log file.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let db_path = db_path.as_ref();
        let db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        let mut log_path = db_path.as_os_str().to_owned();
        log_path.push(".log");
        let log_path = PathBuf::from(log_path);
        let log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&log_path)?;

        // Page 0 is the reserved header page; allocation resumes past
        // whatever the file already holds.
        let pages_on_disk = (db_file.metadata()?.len() / PAGE_SIZE as u64) as PageId;
        let next_page_id = pages_on_disk.max(HEADER_PAGE_ID + 1);

        Ok(Self {
            db_file: Mutex::new(db_file),
            log_file: Mutex::new(log_file),
            log_path,
            next_page_id: AtomicI32::new(next_page_id),
        })
    }

    /// Read a page into `buf`. Reads past the end of the file yield a zeroed
    /// page, so freshly allocated pages are valid before their first write.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        let file_size = file.metadata()?.len();

        if offset >= file_size {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Write a page to its slot in the database file.
    pub fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    /// Hand out the next page id. Never returns HEADER_PAGE_ID.
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Deallocation only forgets the page; reuse of freed slots is handled
    /// by a free-space map above this layer.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Append raw bytes to the log file and sync them to stable storage.
    pub fn write_log(&self, buf: &[u8]) -> Result<(), DiskManagerError> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut file = self.log_file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(buf)?;
        file.sync_data()?;
        Ok(())
    }

    /// Read up to `buf.len()` bytes of log starting at `offset`. Returns
    /// false once the offset is at or past the end of the log. Short reads
    /// near the tail leave the rest of `buf` zeroed.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> Result<bool, DiskManagerError> {
        let mut file = self.log_file.lock();
        let file_size = file.metadata()?.len();
        if offset >= file_size {
            return Ok(false);
        }

        file.seek(SeekFrom::Start(offset))?;
        buf.fill(0);
        let available = (file_size - offset) as usize;
        let to_read = available.min(buf.len());
        file.read_exact(&mut buf[..to_read])?;
        Ok(true)
    }

    /// Size of the log file in bytes.
    pub fn log_size(&self) -> Result<u64, DiskManagerError> {
        Ok(self.log_file.lock().metadata()?.len())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_page_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path()).unwrap();

        let page_id = dm.allocate_page();
        let mut buf = [0u8; PAGE_SIZE];
        buf[0..4].copy_from_slice(b"abcd");
        dm.write_page(page_id, &buf).unwrap();

        let mut read_buf = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_buf).unwrap();
        assert_eq!(&read_buf[0..4], b"abcd");
    }

    #[test]
    fn test_read_past_eof_zeroed() {
        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path()).unwrap();

        let mut buf = [1u8; PAGE_SIZE];
        dm.read_page(42, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_allocate_skips_header_page() {
        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path()).unwrap();
        assert_eq!(dm.allocate_page(), HEADER_PAGE_ID + 1);
        assert_eq!(dm.allocate_page(), HEADER_PAGE_ID + 2);
    }

    #[test]
    fn test_log_append_and_read() {
        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path()).unwrap();

        dm.write_log(b"hello").unwrap();
        dm.write_log(b" world").unwrap();

        let mut buf = [0u8; 16];
        assert!(dm.read_log(&mut buf, 0).unwrap());
        assert_eq!(&buf[0..11], b"hello world");
        assert!(!dm.read_log(&mut buf, 11).unwrap());
    }
}
