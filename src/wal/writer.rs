use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::wal::reader::WalReader;
use crate::wal::record::{LogKind, LogRecord, Lsn};

/// Append-only log writer with an in-memory staging buffer.
///
/// Framing on disk:
///   [frame_len: u32, big-endian] [record body]
///
/// `log` stages a record; nothing reaches the file until `flush`, which
/// appends every staged frame and fsyncs. Readers only ever see flushed
/// frames.
#[derive(Debug)]
pub struct WalWriter {
    file: File,
    current_lsn: Lsn,
    staged: Vec<LogRecord>,
    last_checkpoint_pos: Option<u64>,
}

impl WalWriter {
    /// Open the log for appending, creating it if absent. The LSN counter
    /// resumes from the last record already on disk. A torn tail — the
    /// remains of an append cut short by a crash — is chopped off so new
    /// frames land on a valid boundary; mid-log corruption is left in
    /// place for recovery to report.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let scan = scan_log(path);
        let file_len = file.metadata()?.len();
        if scan.clean_end && scan.valid_end < file_len {
            log::warn!(
                "discarding {} bytes of torn log tail",
                file_len - scan.valid_end
            );
            file.set_len(scan.valid_end)?;
            file.sync_all()?;
        }

        Ok(WalWriter {
            file,
            current_lsn: scan.last_lsn,
            staged: Vec::new(),
            last_checkpoint_pos: None,
        })
    }

    /// Hand out the next LSN. Strictly monotonic within one writer.
    pub fn next_lsn(&mut self) -> Lsn {
        self.current_lsn += 1;
        self.current_lsn
    }

    pub fn current_lsn(&self) -> Lsn {
        self.current_lsn
    }

    /// Stage a record. It becomes durable at the next `flush`.
    pub fn log(&mut self, record: LogRecord) {
        self.staged.push(record);
    }

    /// Append all staged frames to the file, fsync, clear the staging
    /// buffer. On failure the staging buffer is left intact.
    pub fn flush(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let mut pos = self.file.metadata()?.len();
        for record in &self.staged {
            if record.kind == LogKind::Checkpoint {
                self.last_checkpoint_pos = Some(pos);
            }
            let body = record.encode();
            self.file.write_all(&(body.len() as u32).to_be_bytes())?;
            self.file.write_all(&body)?;
            pos += 4 + body.len() as u64;
        }
        self.file.sync_all()?;
        self.staged.clear();
        Ok(())
    }

    /// Drop staged records without writing them (crash recovery entry).
    pub fn discard_staged(&mut self) {
        self.staged.clear();
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// File offset of the most recently flushed CHECKPOINT frame, if any.
    /// A hint only; recovery rescans the log from the start.
    pub fn last_checkpoint_pos(&self) -> Option<u64> {
        self.last_checkpoint_pos
    }
}

struct LogScan {
    last_lsn: Lsn,
    /// End offset of the last frame that read back whole.
    valid_end: u64,
    /// The scan hit end-of-log (possibly a torn tail) rather than mid-log
    /// corruption.
    clean_end: bool,
}

/// Walk an existing log, best-effort: the scan stops at a torn or corrupt
/// frame and keeps the last LSN it saw.
fn scan_log(path: &Path) -> LogScan {
    let mut scan = LogScan {
        last_lsn: 0,
        valid_end: 0,
        clean_end: false,
    };
    let mut reader = match WalReader::open(path) {
        Ok(reader) => reader,
        Err(_) => return scan,
    };

    loop {
        match reader.next() {
            Ok(Some(record)) => {
                scan.last_lsn = record.lsn;
                scan.valid_end = reader.position().unwrap_or(scan.valid_end);
            }
            Ok(None) => {
                scan.clean_end = true;
                return scan;
            }
            Err(err) => {
                log::warn!("LSN seed scan stopped early: {err}");
                return scan;
            }
        }
    }
}
