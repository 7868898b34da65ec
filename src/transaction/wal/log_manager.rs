use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Lsn, INVALID_LSN, LOG_BUFFER_SIZE};
use crate::storage::disk::DiskManager;
use crate::transaction::wal::log_record::LogRecord;

/// How long the flush thread sleeps before flushing on its own.
pub const LOG_TIMEOUT: Duration = Duration::from_millis(300);

struct LogBuffers {
    log_buffer: Vec<u8>,
    log_offset: usize,
    log_last_lsn: Lsn,
    flush_buffer: Vec<u8>,
    flush_size: usize,
    flush_last_lsn: Lsn,
}

impl LogBuffers {
    fn new() -> Self {
        Self {
            log_buffer: vec![0; LOG_BUFFER_SIZE],
            log_offset: 0,
            log_last_lsn: INVALID_LSN,
            flush_buffer: vec![0; LOG_BUFFER_SIZE],
            flush_size: 0,
            flush_last_lsn: INVALID_LSN,
        }
    }

    /// Swap the append buffer into flush position. Caller must have ensured
    /// the flush buffer is drained.
    fn swap(&mut self) {
        std::mem::swap(&mut self.log_buffer, &mut self.flush_buffer);
        self.flush_size = self.log_offset;
        self.flush_last_lsn = self.log_last_lsn;
        self.log_offset = 0;
        self.log_last_lsn = INVALID_LSN;
    }
}

/// Write-ahead log manager: serializes records into an in-memory buffer and
/// hands full buffers to a background flush thread. `append_log_record`
/// itself never performs I/O.
pub struct LogManager {
    disk_manager: Arc<DiskManager>,
    buffers: Mutex<LogBuffers>,
    next_lsn: AtomicI32,
    persistent_lsn: AtomicI32,
    logging_enabled: AtomicBool,
    /// Signaled when a swapped buffer is ready (or at shutdown).
    flush_requested: Condvar,
    /// Signaled after the flush thread advances persistent_lsn.
    flush_done: Condvar,
    flush_thread: Mutex<Option<JoinHandle<()>>>,
}

impl LogManager {
    /// Open over a disk manager. An existing log file seeds the LSN
    /// counters so new records continue past what is already durable.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let max_durable_lsn = Self::scan_max_lsn(&disk_manager);
        let next_lsn = match max_durable_lsn {
            INVALID_LSN => 0,
            lsn => lsn + 1,
        };

        Self {
            disk_manager,
            buffers: Mutex::new(LogBuffers::new()),
            next_lsn: AtomicI32::new(next_lsn),
            persistent_lsn: AtomicI32::new(max_durable_lsn),
            logging_enabled: AtomicBool::new(false),
            flush_requested: Condvar::new(),
            flush_done: Condvar::new(),
            flush_thread: Mutex::new(None),
        }
    }

    /// Highest LSN present in the log file, INVALID_LSN when the log is
    /// empty or unreadable.
    fn scan_max_lsn(disk_manager: &DiskManager) -> Lsn {
        let mut buffer = vec![0u8; LOG_BUFFER_SIZE];
        let mut file_offset: u64 = 0;
        let mut max_lsn = INVALID_LSN;

        'scan: loop {
            match disk_manager.read_log(&mut buffer, file_offset) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!("log scan failed at offset {}: {}", file_offset, e);
                    break;
                }
            }

            let mut pos = 0usize;
            loop {
                match LogRecord::deserialize(&buffer[pos..]) {
                    Some(record) => {
                        max_lsn = max_lsn.max(record.lsn);
                        pos += record.size as usize;
                    }
                    None if pos == 0 => break 'scan,
                    None => {
                        file_offset += pos as u64;
                        continue 'scan;
                    }
                }
            }
        }

        max_lsn
    }

    /// LSN that will be handed to the next appended record.
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn.load(Ordering::SeqCst)
    }

    /// Highest LSN known durable on disk.
    pub fn persistent_lsn(&self) -> Lsn {
        self.persistent_lsn.load(Ordering::SeqCst)
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled.load(Ordering::SeqCst)
    }

    /// Append a record, assigning its LSN. When the record does not fit the
    /// current buffer the buffers are swapped and the flush thread is woken;
    /// the append itself only waits if the previous swap is still being
    /// written out.
    pub fn append_log_record(&self, record: &mut LogRecord) -> Lsn {
        let size = record.size as usize;
        debug_assert!(size <= LOG_BUFFER_SIZE);

        let mut buffers = self.buffers.lock();
        if buffers.log_offset + size > LOG_BUFFER_SIZE {
            while buffers.flush_size != 0 {
                if self.flush_thread.lock().is_none() {
                    // No flush thread to drain for us.
                    self.flush_locked(&mut buffers);
                    break;
                }
                self.flush_requested.notify_one();
                self.flush_done.wait_for(&mut buffers, LOG_TIMEOUT);
            }
            buffers.swap();
            self.flush_requested.notify_one();
        }

        record.lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);

        let offset = buffers.log_offset;
        record.serialize_into(&mut buffers.log_buffer[offset..offset + size]);
        buffers.log_offset += size;
        buffers.log_last_lsn = record.lsn;
        record.lsn
    }

    /// Block until every record up to `lsn` is durable. With the flush
    /// thread running this swaps and waits; otherwise it writes the buffers
    /// out synchronously.
    pub fn force_flush(&self, lsn: Lsn) {
        if lsn == INVALID_LSN {
            return;
        }

        let mut buffers = self.buffers.lock();
        while self.persistent_lsn() < lsn {
            if self.flush_thread.lock().is_some() {
                if buffers.flush_size == 0 && buffers.log_offset > 0 {
                    buffers.swap();
                }
                self.flush_requested.notify_one();
                self.flush_done.wait_for(&mut buffers, LOG_TIMEOUT);
            } else {
                self.flush_locked(&mut buffers);
            }
        }
    }

    /// Start the background flush thread and enable logging.
    pub fn run_flush_thread(self: &Arc<Self>) {
        let mut handle = self.flush_thread.lock();
        if handle.is_some() {
            return;
        }
        self.logging_enabled.store(true, Ordering::SeqCst);

        let manager = Arc::clone(self);
        *handle = Some(std::thread::spawn(move || manager.flush_loop()));
    }

    /// Disable logging, join the flush thread and drain the buffers.
    pub fn stop_flush_thread(&self) {
        self.logging_enabled.store(false, Ordering::SeqCst);
        self.flush_requested.notify_one();

        let handle = {
            let mut guard = self.flush_thread.lock();
            guard.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        let mut buffers = self.buffers.lock();
        self.flush_locked(&mut buffers);
    }

    fn flush_loop(&self) {
        loop {
            let mut buffers = self.buffers.lock();
            self.flush_requested.wait_for(&mut buffers, LOG_TIMEOUT);

            // Timeout path: claim whatever has accumulated.
            if buffers.flush_size == 0 && buffers.log_offset > 0 {
                buffers.swap();
            }

            if buffers.flush_size > 0 {
                let data = buffers.flush_buffer[..buffers.flush_size].to_vec();
                let last_lsn = buffers.flush_last_lsn;
                drop(buffers);

                // Log I/O failure is fatal in this engine.
                if let Err(e) = self.disk_manager.write_log(&data) {
                    panic!("log flush failed: {}", e);
                }
                debug!("flushed {} log bytes up to lsn {}", data.len(), last_lsn);

                let mut buffers = self.buffers.lock();
                buffers.flush_size = 0;
                buffers.flush_last_lsn = INVALID_LSN;
                self.persistent_lsn.fetch_max(last_lsn, Ordering::SeqCst);
                self.flush_done.notify_all();
            }

            if !self.logging_enabled() {
                return;
            }
        }
    }

    /// Synchronous flush of both buffers, used when no flush thread runs
    /// (shutdown, tests, recovery).
    fn flush_locked(&self, buffers: &mut LogBuffers) {
        if buffers.flush_size > 0 {
            if let Err(e) = self.disk_manager.write_log(&buffers.flush_buffer[..buffers.flush_size]) {
                panic!("log flush failed: {}", e);
            }
            self.persistent_lsn.fetch_max(buffers.flush_last_lsn, Ordering::SeqCst);
            buffers.flush_size = 0;
            buffers.flush_last_lsn = INVALID_LSN;
        }
        if buffers.log_offset > 0 {
            buffers.swap();
            if let Err(e) = self.disk_manager.write_log(&buffers.flush_buffer[..buffers.flush_size]) {
                panic!("log flush failed: {}", e);
            }
            self.persistent_lsn.fetch_max(buffers.flush_last_lsn, Ordering::SeqCst);
            buffers.flush_size = 0;
            buffers.flush_last_lsn = INVALID_LSN;
        }
        self.flush_done.notify_all();
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        self.stop_flush_thread();
    }
}
