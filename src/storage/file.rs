use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;
use crate::storage::page::{Page, PageId, HEADER_SIZE, PAGE_SIZE};

/// Paged data file.
///
/// Layout:
///   [header: u64 record count, big-endian]
///   [page 0] [page 1] ...
///
/// Page p lives at offset HEADER_SIZE + p * PAGE_SIZE. Pages are
/// materialised lazily: reading past end-of-file yields a zero page,
/// writing extends the file as needed.
#[derive(Debug)]
pub struct PageFile {
    file: File,
}

impl PageFile {
    /// Open the data file, creating it with a zero header if absent.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut store = PageFile { file };
        if store.file.metadata()?.len() < HEADER_SIZE {
            store.write_header(0)?;
        }
        Ok(store)
    }

    /// Read the persisted record count.
    pub fn read_header(&mut self) -> Result<u64> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_SIZE as usize];
        self.file.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Persist the record count and sync.
    pub fn write_header(&mut self, record_count: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&record_count.to_be_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Read a page. Bytes past end-of-file come back as zeroes.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        let offset = HEADER_SIZE + page_id * PAGE_SIZE as u64;
        let file_len = self.file.metadata()?.len();

        let mut data = [0u8; PAGE_SIZE];
        if offset < file_len {
            self.file.seek(SeekFrom::Start(offset))?;
            let available = ((file_len - offset) as usize).min(PAGE_SIZE);
            self.file.read_exact(&mut data[..available])?;
        }
        Ok(Page::from_bytes(data))
    }

    /// Write a page and sync. Extends the file when the page is new.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let offset = HEADER_SIZE + page_id * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }

}
