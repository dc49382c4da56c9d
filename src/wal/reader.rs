use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{LedgerError, Result};
use crate::wal::record::LogRecord;
use crate::wal::MAX_FRAME_LEN;

/// Sequential log reader used by recovery and LSN seeding.
///
/// Always reads the on-disk file; staged-but-unflushed records do not
/// exist as far as a reader is concerned.
///
/// A frame whose payload overruns the file is a torn tail — the partial
/// append is discarded and the scan ends. A frame that is structurally
/// intact but does not decode (zero or oversized length, unknown kind,
/// image lengths overrunning the body) is mid-log corruption and aborts
/// the scan with `CorruptLog`.
#[derive(Debug)]
pub struct WalReader {
    file: File,
    file_len: u64,
}

impl WalReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(WalReader { file, file_len })
    }

    /// Read the next record. `None` at end-of-log, including a torn tail.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<LogRecord>> {
        let pos = self.file.stream_position()?;
        let remaining = self.file_len.saturating_sub(pos);

        // Not even room for a length prefix.
        if remaining < 4 {
            return Ok(None);
        }

        let mut len_buf = [0u8; 4];
        self.file.read_exact(&mut len_buf)?;
        let frame_len = u32::from_be_bytes(len_buf) as u64;
        let remaining_payload = remaining - 4;

        // Torn tail: the append was cut short, discard the partial frame.
        if frame_len > remaining_payload {
            return Ok(None);
        }

        if frame_len == 0 {
            // Four NUL bytes at the exact end of the file are a torn
            // prefix write; anything else is corruption.
            if remaining_payload == 0 {
                return Ok(None);
            }
            return Err(LedgerError::CorruptLog("zero-length frame".into()));
        }
        if frame_len > MAX_FRAME_LEN as u64 {
            return Err(LedgerError::CorruptLog(format!(
                "frame length {frame_len} exceeds max {MAX_FRAME_LEN}"
            )));
        }

        let mut body = vec![0u8; frame_len as usize];
        self.file.read_exact(&mut body)?;
        LogRecord::decode(&body).map(Some)
    }

    /// Current byte offset in the log file.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    /// Read every record from the start of the log.
    pub fn read_all(&mut self) -> Result<Vec<LogRecord>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut records = Vec::new();
        while let Some(record) = self.next()? {
            records.push(record);
        }
        Ok(records)
    }
}
