use std::collections::HashMap;
use std::sync::Arc;
use log::{debug, info, warn};
use thiserror::Error;

use crate::common::types::{Lsn, TxnId, INVALID_LSN, INVALID_PAGE_ID, LOG_BUFFER_SIZE, Rid};
use crate::storage::buffer::{BufferPoolManager, BufferPoolError};
use crate::storage::disk::DiskManagerError;
use crate::storage::page::{PageManager, PageError};
use crate::transaction::wal::log_record::{LogPayload, LogRecord};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Disk manager error: {0}")]
    DiskManager(#[from] DiskManagerError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;

/// ARIES-style crash recovery: a forward redo scan over the whole log
/// followed by backward undo of every transaction still active at the end
/// of the scan. Both passes run with logging disabled, so no new records
/// are emitted while old ones replay.
pub struct LogRecovery {
    buffer_pool: Arc<BufferPoolManager>,
    page_manager: PageManager,
    /// Transactions with no COMMIT/ABORT seen, mapped to their last LSN.
    active_txn: HashMap<TxnId, Lsn>,
    /// LSN -> byte offset of the record in the log file.
    lsn_mapping: HashMap<Lsn, u64>,
}

impl LogRecovery {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            page_manager: PageManager::new(),
            active_txn: HashMap::new(),
            lsn_mapping: HashMap::new(),
        }
    }

    /// Run both passes and flush the repaired pages.
    pub fn recover(&mut self) -> Result<()> {
        info!("starting crash recovery");
        self.redo()?;
        self.undo()?;
        self.buffer_pool.flush_all_pages();
        info!("recovery complete");
        Ok(())
    }

    /// Forward scan: replay every operation whose effects did not reach the
    /// page (page LSN < record LSN), building the active-transaction table
    /// and the LSN-to-offset index for undo.
    pub fn redo(&mut self) -> Result<()> {
        self.active_txn.clear();
        self.lsn_mapping.clear();

        let disk_manager = self.buffer_pool.disk_manager().clone();
        let mut buffer = vec![0u8; LOG_BUFFER_SIZE];
        let mut file_offset: u64 = 0;

        'scan: while disk_manager.read_log(&mut buffer, file_offset)? {
            let mut pos = 0usize;
            loop {
                let record = match LogRecord::deserialize(&buffer[pos..]) {
                    Some(record) => record,
                    None => {
                        if pos == 0 {
                            // Corrupt header or end of log: stop scanning.
                            break 'scan;
                        }
                        // Record straddles the buffer edge; refill from it.
                        file_offset += pos as u64;
                        continue 'scan;
                    }
                };

                self.lsn_mapping.insert(record.lsn, file_offset + pos as u64);
                self.apply_redo(&record)?;

                match record.payload {
                    LogPayload::Commit | LogPayload::Abort => {
                        self.active_txn.remove(&record.txn_id);
                    }
                    _ => {
                        self.active_txn.insert(record.txn_id, record.lsn);
                    }
                }

                pos += record.size as usize;
            }
        }

        debug!(
            "redo done: {} active transactions, {} records indexed",
            self.active_txn.len(),
            self.lsn_mapping.len()
        );
        Ok(())
    }

    /// Backward pass: walk each loser transaction's prev-LSN chain,
    /// applying the compensating operation for every record.
    pub fn undo(&mut self) -> Result<()> {
        let disk_manager = self.buffer_pool.disk_manager().clone();
        let mut buffer = vec![0u8; LOG_BUFFER_SIZE];

        let losers: Vec<(TxnId, Lsn)> =
            self.active_txn.iter().map(|(&txn, &lsn)| (txn, lsn)).collect();

        for (txn_id, last_lsn) in losers {
            debug!("undoing transaction {}", txn_id);
            let mut lsn = last_lsn;
            while lsn != INVALID_LSN {
                let offset = match self.lsn_mapping.get(&lsn) {
                    Some(&offset) => offset,
                    None => {
                        warn!("lsn {} of txn {} missing from log index", lsn, txn_id);
                        break;
                    }
                };
                if !disk_manager.read_log(&mut buffer, offset)? {
                    break;
                }
                let record = match LogRecord::deserialize(&buffer) {
                    Some(record) => record,
                    None => break,
                };

                self.apply_undo(&record)?;
                lsn = record.prev_lsn;
            }
        }

        self.active_txn.clear();
        Ok(())
    }

    fn apply_redo(&self, record: &LogRecord) -> Result<()> {
        match &record.payload {
            LogPayload::Insert { rid, tuple } => {
                self.redo_on_page(*rid, record.lsn, |pm, page| {
                    pm.insert_tuple_at(page, *rid, tuple, None, None)
                })
            }
            LogPayload::MarkDelete { rid, .. } => {
                self.redo_on_page(*rid, record.lsn, |pm, page| {
                    pm.mark_delete(page, *rid, None, None)
                })
            }
            LogPayload::ApplyDelete { rid, .. } => {
                self.redo_on_page(*rid, record.lsn, |pm, page| {
                    pm.apply_delete(page, *rid, None, None)
                })
            }
            LogPayload::RollbackDelete { rid, .. } => {
                self.redo_on_page(*rid, record.lsn, |pm, page| {
                    pm.rollback_delete(page, *rid, None, None)
                })
            }
            LogPayload::Update { rid, new_tuple, .. } => {
                self.redo_on_page(*rid, record.lsn, |pm, page| {
                    pm.update_tuple(page, *rid, new_tuple, None, None).map(|_| ())
                })
            }
            LogPayload::NewPage { prev_page_id } => self.redo_new_page(*prev_page_id),
            LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => Ok(()),
        }
    }

    fn apply_undo(&self, record: &LogRecord) -> Result<()> {
        match &record.payload {
            LogPayload::Insert { rid, .. } => self.undo_on_page(*rid, |pm, page| {
                pm.apply_delete(page, *rid, None, None)
            }),
            LogPayload::MarkDelete { rid, .. } => self.undo_on_page(*rid, |pm, page| {
                pm.rollback_delete(page, *rid, None, None)
            }),
            LogPayload::ApplyDelete { rid, tuple } => self.undo_on_page(*rid, |pm, page| {
                pm.insert_tuple_at(page, *rid, tuple, None, None)
            }),
            LogPayload::RollbackDelete { rid, .. } => self.undo_on_page(*rid, |pm, page| {
                pm.mark_delete(page, *rid, None, None)
            }),
            LogPayload::Update { rid, old_tuple, .. } => self.undo_on_page(*rid, |pm, page| {
                pm.update_tuple(page, *rid, old_tuple, None, None).map(|_| ())
            }),
            LogPayload::NewPage { .. }
            | LogPayload::Begin
            | LogPayload::Commit
            | LogPayload::Abort => Ok(()),
        }
    }

    /// Fetch the target page and re-apply an operation unless the page's
    /// persisted LSN already covers it.
    fn redo_on_page<F>(&self, rid: Rid, record_lsn: Lsn, op: F) -> Result<()>
    where
        F: FnOnce(&PageManager, &mut crate::common::types::Page) -> std::result::Result<(), PageError>,
    {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut dirtied = false;
        {
            let mut page_guard = page.write();
            self.ensure_initialized(&mut page_guard);

            if self.page_manager.page_lsn(&page_guard) < record_lsn {
                Self::tolerate_replay(op(&self.page_manager, &mut page_guard))?;
                self.page_manager.set_page_lsn(&mut page_guard, record_lsn);
                dirtied = true;
            }
        }
        self.buffer_pool.unpin_page(rid.page_id, dirtied);
        Ok(())
    }

    fn undo_on_page<F>(&self, rid: Rid, op: F) -> Result<()>
    where
        F: FnOnce(&PageManager, &mut crate::common::types::Page) -> std::result::Result<(), PageError>,
    {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        {
            let mut page_guard = page.write();
            self.ensure_initialized(&mut page_guard);
            Self::tolerate_replay(op(&self.page_manager, &mut page_guard))?;
        }
        self.buffer_pool.unpin_page(rid.page_id, true);
        Ok(())
    }

    /// Replay the chain of NEWPAGE records: the first page of a heap is
    /// created outright, later pages are created and linked behind their
    /// predecessor.
    fn redo_new_page(&self, prev_page_id: i32) -> Result<()> {
        if prev_page_id == INVALID_PAGE_ID {
            let (page, page_id) = self.buffer_pool.new_page()?;
            {
                let mut page_guard = page.write();
                self.page_manager.init_page(&mut page_guard, INVALID_PAGE_ID, None, None);
            }
            self.buffer_pool.unpin_page(page_id, true);
            return Ok(());
        }

        let prev_page = self.buffer_pool.fetch_page(prev_page_id)?;
        let needs_link = {
            let mut prev_guard = prev_page.write();
            self.ensure_initialized(&mut prev_guard);
            self.page_manager.next_page_id(&prev_guard) == INVALID_PAGE_ID
        };

        if needs_link {
            let (page, page_id) = self.buffer_pool.new_page()?;
            {
                let mut page_guard = page.write();
                self.page_manager.init_page(&mut page_guard, prev_page_id, None, None);
            }
            self.buffer_pool.unpin_page(page_id, true);

            let mut prev_guard = prev_page.write();
            self.page_manager.set_next_page_id(&mut prev_guard, page_id);
        }
        self.buffer_pool.unpin_page(prev_page_id, true);
        Ok(())
    }

    /// A page read from past the end of the file is all zeroes; give it a
    /// valid empty header before applying tuples to it.
    fn ensure_initialized(&self, page: &mut crate::common::types::Page) {
        let header = self.page_manager.get_header(page);
        if header.free_space_offset == 0 {
            self.page_manager.init_page(page, INVALID_PAGE_ID, None, None);
        }
    }

    /// Replay collisions (tuple already present, already deleted) mean the
    /// page had absorbed the effect some other way; they are not fatal.
    fn tolerate_replay(result: std::result::Result<(), PageError>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(PageError::DuplicateTuple)
            | Err(PageError::TupleNotFound)
            | Err(PageError::NotMarkedForDeletion) => {
                debug!("replay collision tolerated");
                Ok(())
            }
            Err(e) => Err(RecoveryError::Page(e)),
        }
    }
}
