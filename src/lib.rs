//! LedgerDB: embedded transactional record store.
//!
//! A single-file store of fixed-width records with:
//! - Paged data file behind a fix/unfix buffer pool with dirty tracking
//! - Record-level no-wait locking and before-image page snapshots
//! - Write-ahead logging with an in-memory staging buffer and checkpoints
//! - UNDO/REDO crash recovery
//!
//! Single-threaded by design: one operation runs at a time, one
//! transaction is open at a time. Durability of a commit comes from the
//! log alone; data pages are flushed lazily by checkpoints.

pub mod concurrency;
pub mod error;
pub mod storage;
pub mod tx;
pub mod wal;

use std::path::{Path, PathBuf};

use crate::concurrency::ProcessLock;
use crate::tx::manager::TransactionManager;
use crate::wal::recovery::RecoveryReport;

pub use crate::error::{LedgerError, Result};
pub use crate::storage::page::{RecordId, HEADER_SIZE, PAGE_SIZE, RECORDS_PER_PAGE, RECORD_SIZE};
pub use crate::wal::record::TxId;

/// Main database handle.
#[derive(Debug)]
pub struct Database {
    manager: TransactionManager,
    #[allow(dead_code)]
    db_path: PathBuf,
    _lock: ProcessLock,
}

fn log_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("log")
}

impl Database {
    /// Open or create the database at `path`. The write-ahead log lives
    /// beside it with a `.log` suffix. The on-disk log is replayed before
    /// the handle is returned, so a crashed database comes back consistent.
    pub fn open(path: &Path) -> Result<Self> {
        let lock = ProcessLock::acquire(path)?;
        let mut manager = TransactionManager::open(path, &log_path(path))?;
        manager.recover()?;

        Ok(Database {
            manager,
            db_path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Append a record. Durable immediately outside a transaction; logged
    /// and locked inside one.
    pub fn insert(&mut self, payload: &[u8]) -> Result<RecordId> {
        self.manager.insert(payload)
    }

    /// Overwrite an existing record.
    pub fn update(&mut self, rid: RecordId, payload: &[u8]) -> Result<()> {
        self.manager.update(rid, payload)
    }

    /// Transactional update under an explicit transaction id (see
    /// [`TransactionManager::update_as`]).
    pub fn update_as(&mut self, tx: TxId, rid: RecordId, payload: &[u8]) -> Result<()> {
        self.manager.update_as(tx, rid, payload)
    }

    /// Read a record, trailing padding stripped.
    pub fn read(&mut self, rid: RecordId) -> Result<Vec<u8>> {
        self.manager.read(rid)
    }

    /// Read as an explicit logical transaction (see
    /// [`TransactionManager::read_as`]).
    pub fn read_as(&mut self, tx: TxId, rid: RecordId) -> Result<Vec<u8>> {
        self.manager.read_as(tx, rid)
    }

    pub fn begin(&mut self) -> Result<()> {
        self.manager.begin()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.manager.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.manager.rollback()
    }

    /// Force all dirty pages and mark the log.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.manager.checkpoint()
    }

    /// Replay the on-disk log. `open` already does this; calling it again
    /// is harmless and yields the same state.
    pub fn recover(&mut self) -> Result<RecoveryReport> {
        self.manager.recover()
    }

    /// Number of live records (the high-water mark).
    pub fn record_count(&self) -> u64 {
        self.manager.record_count()
    }

    pub fn in_transaction(&self) -> bool {
        self.manager.in_transaction()
    }

    pub fn current_tx_id(&self) -> TxId {
        self.manager.current_tx_id()
    }

    /// Flush the log staging buffer, persist the header and release the
    /// files.
    pub fn close(self) -> Result<()> {
        self.manager.close()
    }
}
