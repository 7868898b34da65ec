use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, PageId, Rid, TxnId, INVALID_LSN, INVALID_TXN_ID};

/// Fixed header preceding every record on the wire:
/// size:i32, lsn:i32, txn_id:i32, prev_lsn:i32, type:i32 (little-endian).
pub const LOG_HEADER_SIZE: usize = 20;

const RID_SIZE: usize = 8;

/// Record type discriminants as stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LogRecordType {
    Invalid = 0,
    Insert = 1,
    MarkDelete = 2,
    ApplyDelete = 3,
    RollbackDelete = 4,
    Update = 5,
    Begin = 6,
    Commit = 7,
    Abort = 8,
    NewPage = 9,
}

impl LogRecordType {
    fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Insert),
            2 => Some(Self::MarkDelete),
            3 => Some(Self::ApplyDelete),
            4 => Some(Self::RollbackDelete),
            5 => Some(Self::Update),
            6 => Some(Self::Begin),
            7 => Some(Self::Commit),
            8 => Some(Self::Abort),
            9 => Some(Self::NewPage),
            _ => None,
        }
    }
}

/// Type-specific payload following the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPayload {
    Insert { rid: Rid, tuple: Vec<u8> },
    MarkDelete { rid: Rid, tuple: Vec<u8> },
    ApplyDelete { rid: Rid, tuple: Vec<u8> },
    RollbackDelete { rid: Rid, tuple: Vec<u8> },
    Update { rid: Rid, old_tuple: Vec<u8>, new_tuple: Vec<u8> },
    NewPage { prev_page_id: PageId },
    Begin,
    Commit,
    Abort,
}

/// A write-ahead log record. The LSN is assigned by the log manager when
/// the record is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub size: i32,
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub payload: LogPayload,
}

impl LogRecord {
    fn new(txn_id: TxnId, prev_lsn: Lsn, payload: LogPayload) -> Self {
        let payload_size = match &payload {
            LogPayload::Insert { tuple, .. }
            | LogPayload::MarkDelete { tuple, .. }
            | LogPayload::ApplyDelete { tuple, .. }
            | LogPayload::RollbackDelete { tuple, .. } => RID_SIZE + 4 + tuple.len(),
            LogPayload::Update { old_tuple, new_tuple, .. } => {
                RID_SIZE + 4 + old_tuple.len() + 4 + new_tuple.len()
            }
            LogPayload::NewPage { .. } => 4,
            LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => 0,
        };
        Self {
            size: (LOG_HEADER_SIZE + payload_size) as i32,
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            payload,
        }
    }

    pub fn new_begin(txn_id: TxnId) -> Self {
        Self::new(txn_id, INVALID_LSN, LogPayload::Begin)
    }

    pub fn new_commit(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Commit)
    }

    pub fn new_abort(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Abort)
    }

    pub fn new_insert(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Vec<u8>) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Insert { rid, tuple })
    }

    pub fn new_mark_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Vec<u8>) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::MarkDelete { rid, tuple })
    }

    pub fn new_apply_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Vec<u8>) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::ApplyDelete { rid, tuple })
    }

    pub fn new_rollback_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Vec<u8>) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::RollbackDelete { rid, tuple })
    }

    pub fn new_update(
        txn_id: TxnId,
        prev_lsn: Lsn,
        rid: Rid,
        old_tuple: Vec<u8>,
        new_tuple: Vec<u8>,
    ) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Update { rid, old_tuple, new_tuple })
    }

    pub fn new_page(txn_id: TxnId, prev_lsn: Lsn, prev_page_id: PageId) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::NewPage { prev_page_id })
    }

    pub fn record_type(&self) -> LogRecordType {
        match self.payload {
            LogPayload::Insert { .. } => LogRecordType::Insert,
            LogPayload::MarkDelete { .. } => LogRecordType::MarkDelete,
            LogPayload::ApplyDelete { .. } => LogRecordType::ApplyDelete,
            LogPayload::RollbackDelete { .. } => LogRecordType::RollbackDelete,
            LogPayload::Update { .. } => LogRecordType::Update,
            LogPayload::NewPage { .. } => LogRecordType::NewPage,
            LogPayload::Begin => LogRecordType::Begin,
            LogPayload::Commit => LogRecordType::Commit,
            LogPayload::Abort => LogRecordType::Abort,
        }
    }

    /// Serialize into `buf`, which must hold at least `self.size` bytes.
    pub fn serialize_into(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.size);
        LittleEndian::write_i32(&mut buf[4..8], self.lsn);
        LittleEndian::write_i32(&mut buf[8..12], self.txn_id);
        LittleEndian::write_i32(&mut buf[12..16], self.prev_lsn);
        LittleEndian::write_i32(&mut buf[16..20], self.record_type() as i32);

        let mut pos = LOG_HEADER_SIZE;
        match &self.payload {
            LogPayload::Insert { rid, tuple }
            | LogPayload::MarkDelete { rid, tuple }
            | LogPayload::ApplyDelete { rid, tuple }
            | LogPayload::RollbackDelete { rid, tuple } => {
                pos = write_rid(buf, pos, rid);
                write_tuple(buf, pos, tuple);
            }
            LogPayload::Update { rid, old_tuple, new_tuple } => {
                pos = write_rid(buf, pos, rid);
                pos = write_tuple(buf, pos, old_tuple);
                write_tuple(buf, pos, new_tuple);
            }
            LogPayload::NewPage { prev_page_id } => {
                LittleEndian::write_i32(&mut buf[pos..pos + 4], *prev_page_id);
            }
            LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => {}
        }
    }

    /// Deserialize the record at the start of `buf`. Returns None for a
    /// truncated buffer or a header that fails sanity checks (negative or
    /// undersized length, invalid lsn/txn/type); callers stop scanning the
    /// current buffer on None.
    pub fn deserialize(buf: &[u8]) -> Option<Self> {
        if buf.len() < LOG_HEADER_SIZE {
            return None;
        }

        let size = LittleEndian::read_i32(&buf[0..4]);
        let lsn = LittleEndian::read_i32(&buf[4..8]);
        let txn_id = LittleEndian::read_i32(&buf[8..12]);
        let prev_lsn = LittleEndian::read_i32(&buf[12..16]);
        let record_type = LogRecordType::from_i32(LittleEndian::read_i32(&buf[16..20]))?;

        if size < LOG_HEADER_SIZE as i32 || lsn == INVALID_LSN || txn_id == INVALID_TXN_ID {
            return None;
        }
        if buf.len() < size as usize {
            return None;
        }

        let body = &buf[LOG_HEADER_SIZE..size as usize];
        let payload = match record_type {
            LogRecordType::Insert => {
                let (rid, pos) = read_rid(body, 0)?;
                let (tuple, _) = read_tuple(body, pos)?;
                LogPayload::Insert { rid, tuple }
            }
            LogRecordType::MarkDelete => {
                let (rid, pos) = read_rid(body, 0)?;
                let (tuple, _) = read_tuple(body, pos)?;
                LogPayload::MarkDelete { rid, tuple }
            }
            LogRecordType::ApplyDelete => {
                let (rid, pos) = read_rid(body, 0)?;
                let (tuple, _) = read_tuple(body, pos)?;
                LogPayload::ApplyDelete { rid, tuple }
            }
            LogRecordType::RollbackDelete => {
                let (rid, pos) = read_rid(body, 0)?;
                let (tuple, _) = read_tuple(body, pos)?;
                LogPayload::RollbackDelete { rid, tuple }
            }
            LogRecordType::Update => {
                let (rid, pos) = read_rid(body, 0)?;
                let (old_tuple, pos) = read_tuple(body, pos)?;
                let (new_tuple, _) = read_tuple(body, pos)?;
                LogPayload::Update { rid, old_tuple, new_tuple }
            }
            LogRecordType::NewPage => {
                if body.len() < 4 {
                    return None;
                }
                LogPayload::NewPage { prev_page_id: LittleEndian::read_i32(&body[0..4]) }
            }
            LogRecordType::Begin => LogPayload::Begin,
            LogRecordType::Commit => LogPayload::Commit,
            LogRecordType::Abort => LogPayload::Abort,
            LogRecordType::Invalid => return None,
        };

        Some(Self { size, lsn, txn_id, prev_lsn, payload })
    }
}

fn write_rid(buf: &mut [u8], pos: usize, rid: &Rid) -> usize {
    LittleEndian::write_i32(&mut buf[pos..pos + 4], rid.page_id);
    LittleEndian::write_u32(&mut buf[pos + 4..pos + 8], rid.slot_num);
    pos + RID_SIZE
}

fn read_rid(buf: &[u8], pos: usize) -> Option<(Rid, usize)> {
    if buf.len() < pos + RID_SIZE {
        return None;
    }
    let page_id = LittleEndian::read_i32(&buf[pos..pos + 4]);
    let slot_num = LittleEndian::read_u32(&buf[pos + 4..pos + 8]);
    Some((Rid::new(page_id, slot_num), pos + RID_SIZE))
}

fn write_tuple(buf: &mut [u8], pos: usize, tuple: &[u8]) -> usize {
    LittleEndian::write_i32(&mut buf[pos..pos + 4], tuple.len() as i32);
    buf[pos + 4..pos + 4 + tuple.len()].copy_from_slice(tuple);
    pos + 4 + tuple.len()
}

fn read_tuple(buf: &[u8], pos: usize) -> Option<(Vec<u8>, usize)> {
    if buf.len() < pos + 4 {
        return None;
    }
    let len = LittleEndian::read_i32(&buf[pos..pos + 4]);
    if len < 0 {
        return None;
    }
    let len = len as usize;
    if buf.len() < pos + 4 + len {
        return None;
    }
    Some((buf[pos + 4..pos + 4 + len].to_vec(), pos + 4 + len))
}
