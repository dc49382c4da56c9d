/// WAL record types.
///
/// Record body layout on disk (all integers big-endian):
///   [lsn: u64] [kind: u32] [tx_id: i32] [record_id: i32]
///   [before_len: u32] [before bytes] [after_len: u32] [after bytes]
///
/// A zero-length image means "absent". Control records (BEGIN, COMMIT,
/// ROLLBACK) carry record_id = -1 and no images; CHECKPOINT additionally
/// carries tx_id = -1.
use crate::error::{LedgerError, Result};
use crate::storage::page::RecordId;

pub type TxId = i32;
pub type Lsn = u64;

/// record_id value for records that do not address a slot.
pub const NO_RECORD: i32 = -1;
/// tx_id value for records outside any transaction (CHECKPOINT).
pub const NO_TX: TxId = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Begin = 0,
    Commit = 1,
    Rollback = 2,
    Update = 3,
    Insert = 4,
    Checkpoint = 5,
}

impl LogKind {
    fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(LogKind::Begin),
            1 => Some(LogKind::Commit),
            2 => Some(LogKind::Rollback),
            3 => Some(LogKind::Update),
            4 => Some(LogKind::Insert),
            5 => Some(LogKind::Checkpoint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub kind: LogKind,
    pub tx_id: TxId,
    pub record_id: i32,
    pub before: Option<Vec<u8>>,
    pub after: Option<Vec<u8>>,
}

impl LogRecord {
    pub fn begin(lsn: Lsn, tx_id: TxId) -> Self {
        Self::control(lsn, LogKind::Begin, tx_id)
    }

    pub fn commit(lsn: Lsn, tx_id: TxId) -> Self {
        Self::control(lsn, LogKind::Commit, tx_id)
    }

    pub fn rollback(lsn: Lsn, tx_id: TxId) -> Self {
        Self::control(lsn, LogKind::Rollback, tx_id)
    }

    pub fn checkpoint(lsn: Lsn) -> Self {
        Self::control(lsn, LogKind::Checkpoint, NO_TX)
    }

    pub fn update(lsn: Lsn, tx_id: TxId, rid: RecordId, before: Vec<u8>, after: Vec<u8>) -> Self {
        LogRecord {
            lsn,
            kind: LogKind::Update,
            tx_id,
            record_id: rid as i32,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn insert(lsn: Lsn, tx_id: TxId, rid: RecordId, after: Vec<u8>) -> Self {
        LogRecord {
            lsn,
            kind: LogKind::Insert,
            tx_id,
            record_id: rid as i32,
            before: None,
            after: Some(after),
        }
    }

    fn control(lsn: Lsn, kind: LogKind, tx_id: TxId) -> Self {
        LogRecord {
            lsn,
            kind,
            tx_id,
            record_id: NO_RECORD,
            before: None,
            after: None,
        }
    }

    /// Slot address of an UPDATE/INSERT record.
    pub fn rid(&self) -> RecordId {
        debug_assert!(self.record_id >= 0);
        self.record_id as RecordId
    }

    /// Serialize the record body (frame length prefix excluded).
    pub fn encode(&self) -> Vec<u8> {
        let before = self.before.as_deref().unwrap_or(&[]);
        let after = self.after.as_deref().unwrap_or(&[]);

        let mut buf = Vec::with_capacity(28 + before.len() + after.len());
        buf.extend_from_slice(&self.lsn.to_be_bytes());
        buf.extend_from_slice(&(self.kind as u32).to_be_bytes());
        buf.extend_from_slice(&self.tx_id.to_be_bytes());
        buf.extend_from_slice(&self.record_id.to_be_bytes());
        buf.extend_from_slice(&(before.len() as u32).to_be_bytes());
        buf.extend_from_slice(before);
        buf.extend_from_slice(&(after.len() as u32).to_be_bytes());
        buf.extend_from_slice(after);
        buf
    }

    /// Deserialize a record body. Malformed bodies are corruption, never a
    /// best guess.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { data, pos: 0 };

        let lsn = u64::from_be_bytes(cursor.take::<8>()?);
        let raw_kind = u32::from_be_bytes(cursor.take::<4>()?);
        let kind = LogKind::from_u32(raw_kind)
            .ok_or_else(|| LedgerError::CorruptLog(format!("unknown record kind {raw_kind}")))?;
        let tx_id = i32::from_be_bytes(cursor.take::<4>()?);
        let record_id = i32::from_be_bytes(cursor.take::<4>()?);
        let before = cursor.take_image()?;
        let after = cursor.take_image()?;

        if cursor.pos != data.len() {
            return Err(LedgerError::CorruptLog(format!(
                "{} trailing bytes after record body",
                data.len() - cursor.pos
            )));
        }

        Ok(LogRecord {
            lsn,
            kind,
            tx_id,
            record_id,
            before,
            after,
        })
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.data.len() - self.pos < N {
            return Err(LedgerError::CorruptLog("record body truncated".into()));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    fn take_image(&mut self) -> Result<Option<Vec<u8>>> {
        let len = u32::from_be_bytes(self.take::<4>()?) as usize;
        if len == 0 {
            return Ok(None);
        }
        if self.data.len() - self.pos < len {
            return Err(LedgerError::CorruptLog(format!(
                "image length {len} exceeds record body"
            )));
        }
        let image = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(Some(image))
    }
}
