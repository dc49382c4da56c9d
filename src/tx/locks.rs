use std::collections::HashMap;

use crate::error::{LedgerError, Result};
use crate::storage::page::RecordId;
use crate::wal::record::TxId;

/// Record-granularity exclusive locks.
///
/// Strict no-wait policy: acquiring a record another transaction owns
/// fails immediately with `LockConflict`. Nothing ever blocks, so there is
/// no deadlock to detect.
#[derive(Debug, Default)]
pub struct LockTable {
    owners: HashMap<RecordId, TxId>,
}

impl LockTable {
    pub fn new() -> Self {
        LockTable::default()
    }

    pub fn owner(&self, rid: RecordId) -> Option<TxId> {
        self.owners.get(&rid).copied()
    }

    pub fn is_locked(&self, rid: RecordId) -> bool {
        self.owners.contains_key(&rid)
    }

    pub fn owned_by(&self, rid: RecordId, tx: TxId) -> bool {
        self.owner(rid) == Some(tx)
    }

    /// Take the lock for `tx`. Re-acquiring an owned lock is a no-op.
    pub fn acquire(&mut self, rid: RecordId, tx: TxId) -> Result<()> {
        match self.owners.get(&rid) {
            Some(&owner) if owner != tx => Err(LedgerError::LockConflict { rid, owner }),
            _ => {
                self.owners.insert(rid, tx);
                Ok(())
            }
        }
    }

    pub fn release(&mut self, rid: RecordId) {
        self.owners.remove(&rid);
    }

    /// Drop every lock `tx` owns (commit/rollback).
    pub fn release_all(&mut self, tx: TxId) {
        self.owners.retain(|_, owner| *owner != tx);
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_reacquire() {
        let mut locks = LockTable::new();
        locks.acquire(0, 1).unwrap();
        locks.acquire(0, 1).unwrap();
        assert!(locks.owned_by(0, 1));
    }

    #[test]
    fn test_conflict_is_immediate() {
        let mut locks = LockTable::new();
        locks.acquire(7, 1).unwrap();

        let err = locks.acquire(7, 2).unwrap_err();
        match err {
            LedgerError::LockConflict { rid, owner } => {
                assert_eq!(rid, 7);
                assert_eq!(owner, 1);
            }
            other => panic!("expected LockConflict, got {other:?}"),
        }
        // The denied transaction took nothing.
        assert!(locks.owned_by(7, 1));
    }

    #[test]
    fn test_release_all_only_drops_own_locks() {
        let mut locks = LockTable::new();
        locks.acquire(0, 1).unwrap();
        locks.acquire(1, 1).unwrap();
        locks.acquire(2, 2).unwrap();

        locks.release_all(1);
        assert!(!locks.is_locked(0));
        assert!(!locks.is_locked(1));
        assert!(locks.owned_by(2, 2));
    }

    #[test]
    fn test_release_frees_record_for_others() {
        let mut locks = LockTable::new();
        locks.acquire(3, 1).unwrap();
        locks.release(3);
        locks.acquire(3, 2).unwrap();
        assert!(locks.owned_by(3, 2));
    }
}
