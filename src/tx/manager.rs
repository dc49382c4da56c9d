use std::path::{Path, PathBuf};

use crate::error::{LedgerError, Result};
use crate::storage::buffer::BufferPool;
use crate::storage::file::PageFile;
use crate::storage::page::{first_rid_of, page_of, slot_of, trim_record, RecordId};
use crate::tx::before_image::BeforeImageBuffer;
use crate::tx::locks::LockTable;
use crate::wal::reader::WalReader;
use crate::wal::record::{LogRecord, TxId};
use crate::wal::recovery::{self, RecoveryReport};
use crate::wal::writer::WalWriter;

/// Transaction and recovery manager.
///
/// Owns every moving part: the buffer pool (and through it the data file),
/// the log writer, the lock table and the before-image buffer. At most one
/// transaction is open at a time; the transaction id is a logical identity
/// so the log and the lock table can tell callers apart.
///
/// Write path: lock, snapshot the page, mutate in memory, stage a log
/// record. Commit makes the log durable and releases transaction state —
/// data pages stay dirty until a checkpoint forces them (no-force policy);
/// crash durability comes entirely from the log.
#[derive(Debug)]
pub struct TransactionManager {
    pool: BufferPool,
    wal: WalWriter,
    log_path: PathBuf,
    locks: LockTable,
    bib: BeforeImageBuffer,
    in_transaction: bool,
    current_tx_id: TxId,
    record_count: u64,
    record_count_before_tx: u64,
}

impl TransactionManager {
    /// Open the data and log files. No replay happens here; the caller
    /// decides when to run `recover`.
    pub fn open(data_path: &Path, log_path: &Path) -> Result<Self> {
        let file = PageFile::open(data_path)?;
        let mut pool = BufferPool::new(file);
        let record_count = pool.read_header()?;
        let wal = WalWriter::open(log_path)?;

        Ok(TransactionManager {
            pool,
            wal,
            log_path: log_path.to_path_buf(),
            locks: LockTable::new(),
            bib: BeforeImageBuffer::new(),
            in_transaction: false,
            current_tx_id: 0,
            record_count,
            record_count_before_tx: record_count,
        })
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn current_tx_id(&self) -> TxId {
        self.current_tx_id
    }

    /// Open a transaction. A transaction that is still open gets committed
    /// first.
    pub fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            self.commit()?;
        }

        self.current_tx_id += 1;
        self.record_count_before_tx = self.record_count;
        let lsn = self.wal.next_lsn();
        self.wal.log(LogRecord::begin(lsn, self.current_tx_id));
        self.in_transaction = true;
        Ok(())
    }

    /// Overwrite an existing record.
    ///
    /// Inside a transaction this locks, snapshots and logs. Outside one the
    /// write goes straight through and the page is forced — there is no log
    /// record to recover it from.
    pub fn update(&mut self, rid: RecordId, payload: &[u8]) -> Result<()> {
        if self.in_transaction {
            self.update_as(self.current_tx_id, rid, payload)
        } else {
            self.update_untracked(rid, payload)
        }
    }

    /// Transactional update under an explicit transaction id.
    ///
    /// `update` delegates here with the current id; callers probing lock
    /// behavior across logical transactions pass their own.
    pub fn update_as(&mut self, tx: TxId, rid: RecordId, payload: &[u8]) -> Result<()> {
        if rid as u64 >= self.record_count {
            return Err(LedgerError::NotFound(rid));
        }
        if let Some(owner) = self.locks.owner(rid) {
            if owner != tx {
                return Err(LedgerError::LockConflict { rid, owner });
            }
        }

        let page_id = page_of(rid);
        let slot = slot_of(rid);

        let first_touch = !self.locks.owned_by(rid, tx);
        if first_touch {
            self.locks.acquire(rid, tx)?;
        }

        let entry = self.pool.fix(page_id)?;
        // The snapshot must capture the page before this mutation.
        if first_touch {
            self.bib.snapshot(page_id, &entry.page);
        }

        let before = entry.page.slot(slot).to_vec();
        entry.page.write_slot(slot, payload);
        let after = entry.page.slot(slot).to_vec();

        self.pool.mark_dirty(page_id)?;
        self.pool.mark_transactional(page_id)?;
        self.pool.unfix(page_id)?;

        let lsn = self.wal.next_lsn();
        self.wal.log(LogRecord::update(lsn, tx, rid, before, after));
        Ok(())
    }

    fn update_untracked(&mut self, rid: RecordId, payload: &[u8]) -> Result<()> {
        if rid as u64 >= self.record_count {
            return Err(LedgerError::NotFound(rid));
        }
        if let Some(owner) = self.locks.owner(rid) {
            return Err(LedgerError::LockConflict { rid, owner });
        }

        let page_id = page_of(rid);
        let entry = self.pool.fix(page_id)?;
        entry.page.write_slot(slot_of(rid), payload);
        self.pool.mark_dirty(page_id)?;
        let forced = self.pool.force(page_id);
        self.pool.unfix(page_id)?;
        forced
    }

    /// Append a record at the high-water mark.
    ///
    /// The new count is persisted immediately, even mid-transaction:
    /// recovery decrements it again when an uncommitted tail insert is
    /// undone, so a transiently-high on-disk count is safe.
    pub fn insert(&mut self, payload: &[u8]) -> Result<RecordId> {
        let rid = self.record_count as RecordId;
        let page_id = page_of(rid);
        let slot = slot_of(rid);

        if self.in_transaction {
            self.locks.acquire(rid, self.current_tx_id)?;
        }

        let entry = self.pool.fix(page_id)?;
        if self.in_transaction {
            self.bib.snapshot(page_id, &entry.page);
        }
        entry.page.write_slot(slot, payload);
        let after = entry.page.slot(slot).to_vec();

        self.pool.mark_dirty(page_id)?;
        if self.in_transaction {
            self.pool.mark_transactional(page_id)?;
        } else {
            // No log record outside a transaction; the forced page is the
            // only durable copy.
            self.pool.force(page_id)?;
        }
        self.pool.unfix(page_id)?;

        if self.in_transaction {
            let lsn = self.wal.next_lsn();
            self.wal
                .log(LogRecord::insert(lsn, self.current_tx_id, rid, after));
            // The header bump below is durable right away; the INSERT
            // record must already be on disk or recovery could not trim an
            // uncommitted tail insert back off the count.
            self.wal.flush()?;
        }

        self.record_count += 1;
        self.pool.write_header(self.record_count)?;
        Ok(rid)
    }

    /// Read a record.
    ///
    /// A record locked by some other transaction is served from that
    /// transaction's before-image snapshot: readers see the pre-write state
    /// of an uncommitted row without blocking. Everything else reads the
    /// current in-memory page, so a transaction sees its own writes.
    pub fn read(&mut self, rid: RecordId) -> Result<Vec<u8>> {
        let observer = self.in_transaction.then_some(self.current_tx_id);
        self.read_impl(observer, rid)
    }

    /// Read as an explicit logical transaction: the lock owner's own
    /// writes are visible to it, everyone else gets the pre-image.
    pub fn read_as(&mut self, tx: TxId, rid: RecordId) -> Result<Vec<u8>> {
        self.read_impl(Some(tx), rid)
    }

    fn read_impl(&mut self, observer: Option<TxId>, rid: RecordId) -> Result<Vec<u8>> {
        if rid as u64 >= self.record_count {
            return Err(LedgerError::NotFound(rid));
        }

        let page_id = page_of(rid);
        let slot = slot_of(rid);

        if let Some(owner) = self.locks.owner(rid) {
            if observer != Some(owner) {
                if let Some(snapshot) = self.bib.get(page_id) {
                    return Ok(trim_record(snapshot.slot(slot)).to_vec());
                }
            }
        }

        let entry = self.pool.fix(page_id)?;
        let bytes = trim_record(entry.page.slot(slot)).to_vec();
        self.pool.unfix(page_id)?;
        Ok(bytes)
    }

    /// Close the transaction, keeping its effects.
    ///
    /// The COMMIT record reaching stable storage is the commit point. Data
    /// pages are not forced — they stay dirty until a checkpoint, and a
    /// crash in between replays them from the log.
    pub fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(LedgerError::InvariantViolation(
                "commit with no open transaction".into(),
            ));
        }

        let lsn = self.wal.next_lsn();
        self.wal.log(LogRecord::commit(lsn, self.current_tx_id));
        self.wal.flush()?;

        self.pool.clear_transactional_flags();
        self.locks.release_all(self.current_tx_id);
        self.bib.clear();
        self.in_transaction = false;
        Ok(())
    }

    /// Close the transaction, discarding its effects.
    ///
    /// Every snapshotted page is put back the way disk remembers it; pages
    /// that exist only because of this transaction's inserts are dropped
    /// outright. The record count rewinds to its pre-transaction value.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(LedgerError::InvariantViolation(
                "rollback with no open transaction".into(),
            ));
        }

        for (page_id, snapshot) in self.bib.take() {
            if first_rid_of(page_id) >= self.record_count_before_tx {
                self.pool.evict(page_id)?;
            } else {
                self.pool.restore(page_id, &snapshot);
            }
        }

        let lsn = self.wal.next_lsn();
        self.wal.log(LogRecord::rollback(lsn, self.current_tx_id));
        self.wal.flush()?;

        self.locks.release_all(self.current_tx_id);

        self.record_count = self.record_count_before_tx;
        self.pool.write_header(self.record_count)?;
        self.in_transaction = false;
        Ok(())
    }

    /// Force all dirty pages, then mark the log.
    ///
    /// Pages reach disk before the CHECKPOINT record does; recovery leans
    /// on that order when it skips everything before the checkpoint.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.pool.force_all()?;
        self.pool.write_header(self.record_count)?;

        let lsn = self.wal.next_lsn();
        self.wal.log(LogRecord::checkpoint(lsn));
        self.wal.flush()?;
        log::debug!(
            "checkpoint at lsn {lsn} (log offset {:?})",
            self.wal.last_checkpoint_pos()
        );
        Ok(())
    }

    /// Replay the on-disk log: analysis, REDO for winners, UNDO for losers.
    /// Safe to run repeatedly; a second pass finds the same winners and
    /// losers and reapplies the same images.
    pub fn recover(&mut self) -> Result<RecoveryReport> {
        // Whatever was in flight died with the crash.
        self.wal.discard_staged();
        self.locks.clear();
        self.bib.clear();
        self.in_transaction = false;

        let mut reader = WalReader::open(&self.log_path)?;
        let records = reader.read_all()?;
        recovery::run(&mut self.pool, &records, &mut self.record_count)
    }

    /// Flush the log staging buffer and persist the header.
    pub fn close(mut self) -> Result<()> {
        self.wal.flush()?;
        self.pool.write_header(self.record_count)?;
        Ok(())
    }
}
