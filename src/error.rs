use thiserror::Error;

use crate::storage::page::RecordId;
use crate::wal::record::TxId;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found: rid={0}")]
    NotFound(RecordId),

    #[error("record {rid} is locked by transaction {owner}")]
    LockConflict { rid: RecordId, owner: TxId },

    #[error("corrupt log: {0}")]
    CorruptLog(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
