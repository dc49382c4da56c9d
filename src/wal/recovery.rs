use std::collections::HashSet;

use crate::error::{LedgerError, Result};
use crate::storage::buffer::BufferPool;
use crate::storage::page::{page_of, slot_of, RecordId};
use crate::wal::record::{LogKind, LogRecord, TxId};

/// Outcome summary of one recovery pass.
#[derive(Debug)]
pub struct RecoveryReport {
    pub committed: Vec<TxId>,
    pub losers: Vec<TxId>,
    pub redo_applied: usize,
    pub undo_applied: usize,
}

/// Replay a crashed log into the buffer pool.
///
/// The scan starts strictly after the most recent CHECKPOINT record —
/// everything before it already reached the data file when the checkpoint
/// forced the pool.
///
/// Three passes over the tail:
///   1. analysis (forward): sort transactions into winners (COMMIT seen)
///      and losers (BEGIN without COMMIT or ROLLBACK);
///   2. REDO (forward): reapply winners' after-images;
///   3. UNDO (backward): restore losers' before-images and trim tail
///      inserts from the record count.
///
/// REDO runs before UNDO: a winner and a later loser may have touched the
/// same slot, and the loser's before-image carries the winner's bytes.
///
/// Undoing a non-tail insert cannot reclaim the slot — the count only
/// shrinks while the loser's record is the last one. Such interior slots
/// stay allocated but unreachable.
pub fn run(
    pool: &mut BufferPool,
    records: &[LogRecord],
    record_count: &mut u64,
) -> Result<RecoveryReport> {
    let start = records
        .iter()
        .rposition(|record| record.kind == LogKind::Checkpoint)
        .map_or(0, |index| index + 1);
    let tail = &records[start..];

    let mut committed: HashSet<TxId> = HashSet::new();
    let mut active: HashSet<TxId> = HashSet::new();
    for record in tail {
        match record.kind {
            LogKind::Begin => {
                active.insert(record.tx_id);
            }
            LogKind::Commit => {
                active.remove(&record.tx_id);
                committed.insert(record.tx_id);
            }
            LogKind::Rollback => {
                active.remove(&record.tx_id);
            }
            _ => {}
        }
    }

    let mut redo_applied = 0;
    for record in tail {
        if !committed.contains(&record.tx_id) {
            continue;
        }
        if !matches!(record.kind, LogKind::Update | LogKind::Insert) {
            continue;
        }
        let rid = slot_rid(record)?;
        let after = record.after.as_deref().ok_or_else(|| {
            LedgerError::CorruptLog(format!(
                "{:?} record at lsn {} has no after-image",
                record.kind, record.lsn
            ))
        })?;
        apply_image(pool, rid, after)?;
        if record.kind == LogKind::Insert {
            let needed = rid as u64 + 1;
            if needed > *record_count {
                *record_count = needed;
            }
        }
        redo_applied += 1;
    }

    let mut undo_applied = 0;
    for record in tail.iter().rev() {
        if !active.contains(&record.tx_id) {
            continue;
        }
        match record.kind {
            LogKind::Update => {
                let before = record.before.as_deref().ok_or_else(|| {
                    LedgerError::CorruptLog(format!(
                        "UPDATE record at lsn {} has no before-image",
                        record.lsn
                    ))
                })?;
                apply_image(pool, slot_rid(record)?, before)?;
                undo_applied += 1;
            }
            LogKind::Insert => {
                // Only a tail insert can give its slot back.
                if slot_rid(record)? as u64 + 1 == *record_count {
                    *record_count -= 1;
                }
                undo_applied += 1;
            }
            _ => {}
        }
    }

    pool.force_all()?;
    pool.write_header(*record_count)?;

    log::debug!(
        "recovery: {} records scanned, {} redone, {} undone, {} winner(s), {} loser(s)",
        tail.len(),
        redo_applied,
        undo_applied,
        committed.len(),
        active.len()
    );

    Ok(RecoveryReport {
        committed: committed.into_iter().collect(),
        losers: active.into_iter().collect(),
        redo_applied,
        undo_applied,
    })
}

fn slot_rid(record: &LogRecord) -> Result<RecordId> {
    if record.record_id < 0 {
        return Err(LedgerError::CorruptLog(format!(
            "{:?} record at lsn {} has no slot address",
            record.kind, record.lsn
        )));
    }
    Ok(record.record_id as RecordId)
}

fn apply_image(pool: &mut BufferPool, rid: RecordId, image: &[u8]) -> Result<()> {
    let page_id = page_of(rid);
    let entry = pool.fix(page_id)?;
    entry.page.write_slot(slot_of(rid), image);
    pool.mark_dirty(page_id)?;
    pool.unfix(page_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::PageFile;
    use crate::storage::page::trim_record;
    use tempfile::TempDir;

    fn pool(dir: &TempDir) -> BufferPool {
        BufferPool::new(PageFile::open(&dir.path().join("test.db")).unwrap())
    }

    fn read_slot(pool: &mut BufferPool, rid: RecordId) -> Vec<u8> {
        let entry = pool.fix(page_of(rid)).unwrap();
        let bytes = trim_record(entry.page.slot(slot_of(rid))).to_vec();
        pool.unfix(page_of(rid)).unwrap();
        bytes
    }

    #[test]
    fn test_committed_work_is_redone() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);
        let mut count = 0;

        let records = vec![
            LogRecord::begin(1, 1),
            LogRecord::insert(2, 1, 0, b"Alice".to_vec()),
            LogRecord::update(3, 1, 0, b"Alice".to_vec(), b"A2".to_vec()),
            LogRecord::commit(4, 1),
        ];

        let report = run(&mut pool, &records, &mut count).unwrap();
        assert_eq!(report.committed, vec![1]);
        assert!(report.losers.is_empty());
        assert_eq!(report.redo_applied, 2);
        assert_eq!(count, 1);
        assert_eq!(read_slot(&mut pool, 0), b"A2");
    }

    #[test]
    fn test_loser_update_is_undone() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);

        // Record 0 exists on disk as "Alice".
        let entry = pool.fix(0).unwrap();
        entry.page.write_slot(0, b"Alice");
        pool.mark_dirty(0).unwrap();
        pool.unfix(0).unwrap();
        pool.force(0).unwrap();
        let mut count = 1;

        let records = vec![
            LogRecord::begin(1, 1),
            LogRecord::update(2, 1, 0, b"Alice".to_vec(), b"A2".to_vec()),
            // Crash before commit.
        ];

        let report = run(&mut pool, &records, &mut count).unwrap();
        assert_eq!(report.losers, vec![1]);
        assert_eq!(report.undo_applied, 1);
        assert_eq!(read_slot(&mut pool, 0), b"Alice");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_redo_runs_before_undo_on_shared_slot() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);
        let mut count = 1;

        // Winner writes "W", loser overwrites with "L" and crashes. The
        // loser's before-image carries the winner's bytes, so undoing it
        // after REDO lands back on "W".
        let records = vec![
            LogRecord::begin(1, 1),
            LogRecord::update(2, 1, 0, b"base".to_vec(), b"W".to_vec()),
            LogRecord::commit(3, 1),
            LogRecord::begin(4, 2),
            LogRecord::update(5, 2, 0, b"W".to_vec(), b"L".to_vec()),
        ];

        run(&mut pool, &records, &mut count).unwrap();
        assert_eq!(read_slot(&mut pool, 0), b"W");
    }

    #[test]
    fn test_loser_tail_insert_shrinks_count() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);
        // The crashed inserts already pushed the persisted count to 4.
        let mut count = 4;

        let records = vec![
            LogRecord::begin(1, 1),
            LogRecord::insert(2, 1, 2, b"Dx".to_vec()),
            LogRecord::insert(3, 1, 3, b"Ex".to_vec()),
        ];

        run(&mut pool, &records, &mut count).unwrap();
        // Undone back-to-front, so both tail inserts unwind.
        assert_eq!(count, 2);
    }

    #[test]
    fn test_interior_insert_undo_leaves_count() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);
        let mut count = 1;

        // Loser inserted rid 1, then a committed insert took rid 2.
        let records = vec![
            LogRecord::begin(1, 1),
            LogRecord::insert(2, 1, 1, b"loser".to_vec()),
            LogRecord::begin(3, 2),
            LogRecord::insert(4, 2, 2, b"winner".to_vec()),
            LogRecord::commit(5, 2),
        ];

        run(&mut pool, &records, &mut count).unwrap();
        // rid 1 is an interior hole the count cannot reclaim.
        assert_eq!(count, 3);
        assert_eq!(read_slot(&mut pool, 2), b"winner");
    }

    #[test]
    fn test_scan_starts_after_last_checkpoint() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);
        let mut count = 1;

        // The pre-checkpoint transaction must contribute nothing; its data
        // already reached the file when the checkpoint forced the pool.
        let records = vec![
            LogRecord::begin(1, 1),
            LogRecord::update(2, 1, 0, b"base".to_vec(), b"pre".to_vec()),
            LogRecord::commit(3, 1),
            LogRecord::checkpoint(4),
            LogRecord::begin(5, 2),
            LogRecord::update(6, 2, 0, b"pre".to_vec(), b"post".to_vec()),
            LogRecord::commit(7, 2),
        ];

        let report = run(&mut pool, &records, &mut count).unwrap();
        assert_eq!(report.committed, vec![2]);
        assert_eq!(report.redo_applied, 1);
        assert_eq!(read_slot(&mut pool, 0), b"post");
    }

    #[test]
    fn test_rolled_back_transaction_is_neither_redone_nor_undone() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);
        let mut count = 1;

        let records = vec![
            LogRecord::begin(1, 1),
            LogRecord::update(2, 1, 0, b"base".to_vec(), b"gone".to_vec()),
            LogRecord::rollback(3, 1),
        ];

        let report = run(&mut pool, &records, &mut count).unwrap();
        assert!(report.committed.is_empty());
        assert!(report.losers.is_empty());
        assert_eq!(report.redo_applied, 0);
        assert_eq!(report.undo_applied, 0);
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);
        // The loser's insert already pushed the persisted count to 2.
        let mut count = 2;

        let records = vec![
            LogRecord::begin(1, 1),
            LogRecord::update(2, 1, 0, b"base".to_vec(), b"W".to_vec()),
            LogRecord::commit(3, 1),
            LogRecord::begin(4, 2),
            LogRecord::insert(5, 2, 1, b"loser".to_vec()),
        ];

        run(&mut pool, &records, &mut count).unwrap();
        let first = (read_slot(&mut pool, 0), count);

        run(&mut pool, &records, &mut count).unwrap();
        assert_eq!((read_slot(&mut pool, 0), count), first);
    }
}
