/// Process-level exclusivity.
///
/// The data and log files belong to exactly one process at a time. An
/// advisory lock on a `.lock` file beside the database is taken when the
/// database opens and held for the life of the handle.
use std::fs::{File, OpenOptions};
use std::path::Path;

use fs4::fs_std::FileExt;

use crate::error::{LedgerError, Result};

#[derive(Debug)]
pub struct ProcessLock {
    lock_file: File,
}

impl ProcessLock {
    /// Block until the database's lock file can be held exclusively.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let lock_path = db_path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)?;

        lock_file
            .lock_exclusive()
            .map_err(|e| LedgerError::Lock(format!("failed to acquire exclusive file lock: {e}")))?;

        Ok(ProcessLock { lock_file })
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}
