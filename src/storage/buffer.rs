use lru::LruCache;

use crate::error::{LedgerError, Result};
use crate::storage::file::PageFile;
use crate::storage::page::{Page, PageId};

/// Default number of resident pages before the pool starts evicting.
const DEFAULT_CAPACITY: usize = 256;

/// A page held in the buffer pool.
#[derive(Debug)]
pub struct BufferedPage {
    pub page: Page,
    dirty: bool,
    fix_count: u32,
    transactional: bool,
}

impl BufferedPage {
    fn new(page: Page) -> Self {
        BufferedPage {
            page,
            dirty: false,
            fix_count: 0,
            transactional: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn fix_count(&self) -> u32 {
        self.fix_count
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }
}

/// Page cache over the data file.
///
/// Pages are pinned with `fix`/`unfix`; a page with a non-zero fix count is
/// never evicted. Dirty pages reach disk only through `force` — the
/// transaction layer decides when. Pages touched by the in-flight
/// transaction carry the `transactional` flag and stay resident until the
/// transaction resolves.
///
/// The pool keeps at most `capacity` pages; on a miss beyond that, the
/// least-recently-used unpinned non-transactional page is forced (if dirty)
/// and dropped. If nothing qualifies the pool grows instead.
#[derive(Debug)]
pub struct BufferPool {
    file: PageFile,
    cache: LruCache<PageId, BufferedPage>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(file: PageFile) -> Self {
        Self::with_capacity(file, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(file: PageFile, capacity: usize) -> Self {
        BufferPool {
            file,
            cache: LruCache::unbounded(),
            capacity: capacity.max(1),
        }
    }

    /// Pin a page, loading it from disk on first use.
    pub fn fix(&mut self, page_id: PageId) -> Result<&mut BufferedPage> {
        if !self.cache.contains(&page_id) {
            if self.cache.len() >= self.capacity {
                self.evict_lru()?;
            }
            let page = self.file.read_page(page_id)?;
            self.cache.put(page_id, BufferedPage::new(page));
        }

        let entry = self.entry(page_id)?;
        entry.fix_count += 1;
        Ok(entry)
    }

    /// Release a pin. The count floors at zero.
    pub fn unfix(&mut self, page_id: PageId) -> Result<()> {
        let entry = self.entry(page_id)?;
        entry.fix_count = entry.fix_count.saturating_sub(1);
        Ok(())
    }

    pub fn mark_dirty(&mut self, page_id: PageId) -> Result<()> {
        self.entry(page_id)?.dirty = true;
        Ok(())
    }

    pub fn mark_transactional(&mut self, page_id: PageId) -> Result<()> {
        self.entry(page_id)?.transactional = true;
        Ok(())
    }

    /// Commit keeps pages dirty but drops their transactional marking.
    pub fn clear_transactional_flags(&mut self) {
        for (_, entry) in self.cache.iter_mut() {
            entry.transactional = false;
        }
    }

    /// Write a page to disk if dirty, then clear `dirty` and `transactional`.
    pub fn force(&mut self, page_id: PageId) -> Result<()> {
        let entry = match self.cache.peek_mut(&page_id) {
            Some(entry) => entry,
            None => {
                return Err(LedgerError::InvariantViolation(format!(
                    "force of non-resident page {page_id}"
                )))
            }
        };
        if entry.dirty {
            self.file.write_page(page_id, &entry.page)?;
            entry.dirty = false;
            entry.transactional = false;
        }
        Ok(())
    }

    /// Force every dirty page (checkpoint and recovery finalise).
    pub fn force_all(&mut self) -> Result<()> {
        let dirty: Vec<PageId> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(id, _)| *id)
            .collect();
        for page_id in dirty {
            self.force(page_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool without writing it.
    ///
    /// Used to discard speculative insert pages on rollback. Dropping a
    /// pinned page is a bug in the caller.
    pub fn evict(&mut self, page_id: PageId) -> Result<()> {
        if let Some(entry) = self.cache.peek(&page_id) {
            if entry.fix_count > 0 {
                return Err(LedgerError::InvariantViolation(format!(
                    "evict of fixed page {page_id} (fix_count={})",
                    entry.fix_count
                )));
            }
            self.cache.pop(&page_id);
        }
        Ok(())
    }

    /// Overwrite a page's in-memory bytes with a before-image snapshot.
    /// The page comes out clean: its bytes match the on-disk state again.
    pub fn restore(&mut self, page_id: PageId, snapshot: &Page) {
        match self.cache.get_mut(&page_id) {
            Some(entry) => {
                entry.page = snapshot.clone();
                entry.dirty = false;
                entry.transactional = false;
            }
            None => {
                self.cache.put(page_id, BufferedPage::new(snapshot.clone()));
            }
        }
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.cache.contains(&page_id)
    }

    pub fn resident_pages(&self) -> usize {
        self.cache.len()
    }

    pub fn read_header(&mut self) -> Result<u64> {
        self.file.read_header()
    }

    pub fn write_header(&mut self, record_count: u64) -> Result<()> {
        self.file.write_header(record_count)
    }

    fn entry(&mut self, page_id: PageId) -> Result<&mut BufferedPage> {
        self.cache.get_mut(&page_id).ok_or_else(|| {
            LedgerError::InvariantViolation(format!("page {page_id} is not in the buffer pool"))
        })
    }

    /// Drop the least-recently-used page that is neither pinned nor
    /// transactional, writing it first when dirty. A pool full of pinned or
    /// transactional pages grows past capacity instead.
    fn evict_lru(&mut self) -> Result<()> {
        let ids: Vec<PageId> = self.cache.iter().map(|(id, _)| *id).collect();
        // iter() runs most-recently-used first; walk it backwards.
        for page_id in ids.into_iter().rev() {
            let evictable = match self.cache.peek(&page_id) {
                Some(entry) => entry.fix_count == 0 && !entry.transactional,
                None => false,
            };
            if !evictable {
                continue;
            }
            self.force(page_id)?;
            self.cache.pop(&page_id);
            log::debug!("evicted page {page_id}");
            return Ok(());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::trim_record;
    use tempfile::TempDir;

    fn pool(dir: &TempDir) -> BufferPool {
        let file = PageFile::open(&dir.path().join("test.db")).unwrap();
        BufferPool::new(file)
    }

    #[test]
    fn test_fix_loads_zero_page() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);

        let entry = pool.fix(3).unwrap();
        assert_eq!(entry.fix_count(), 1);
        assert!(!entry.is_dirty());
        assert!(entry.page.as_bytes().iter().all(|&b| b == 0));
        pool.unfix(3).unwrap();
    }

    #[test]
    fn test_fix_unfix_counts() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);

        pool.fix(0).unwrap();
        let entry = pool.fix(0).unwrap();
        assert_eq!(entry.fix_count(), 2);

        pool.unfix(0).unwrap();
        pool.unfix(0).unwrap();
        // Floors at zero.
        pool.unfix(0).unwrap();
        assert_eq!(pool.fix(0).unwrap().fix_count(), 1);
    }

    #[test]
    fn test_unfix_unknown_page_is_error() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);

        let err = pool.unfix(9).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[test]
    fn test_force_writes_dirty_page_and_clears_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let mut pool = BufferPool::new(PageFile::open(&path).unwrap());

        let entry = pool.fix(0).unwrap();
        entry.page.write_slot(0, b"forced");
        pool.mark_dirty(0).unwrap();
        pool.mark_transactional(0).unwrap();
        pool.unfix(0).unwrap();

        pool.force(0).unwrap();
        let entry = pool.fix(0).unwrap();
        assert!(!entry.is_dirty());
        assert!(!entry.is_transactional());
        pool.unfix(0).unwrap();

        // Bytes actually reached the file.
        let mut file = PageFile::open(&path).unwrap();
        let page = file.read_page(0).unwrap();
        assert_eq!(trim_record(page.slot(0)), b"forced");
    }

    #[test]
    fn test_evict_fixed_page_is_error() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);

        pool.fix(0).unwrap();
        let err = pool.evict(0).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));

        pool.unfix(0).unwrap();
        pool.evict(0).unwrap();
        assert!(!pool.contains(0));
    }

    #[test]
    fn test_evict_discards_dirty_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let mut pool = BufferPool::new(PageFile::open(&path).unwrap());

        let entry = pool.fix(0).unwrap();
        entry.page.write_slot(0, b"speculative");
        pool.mark_dirty(0).unwrap();
        pool.unfix(0).unwrap();
        pool.evict(0).unwrap();

        // Dropped without writing.
        let mut file = PageFile::open(&path).unwrap();
        let page = file.read_page(0).unwrap();
        assert!(page.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_capacity_eviction_writes_dirty_victim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let mut pool = BufferPool::with_capacity(PageFile::open(&path).unwrap(), 2);

        for page_id in 0..3u64 {
            let entry = pool.fix(page_id).unwrap();
            entry.page.write_slot(0, format!("page-{page_id}").as_bytes());
            pool.mark_dirty(page_id).unwrap();
            pool.unfix(page_id).unwrap();
        }

        assert_eq!(pool.resident_pages(), 2);
        assert!(!pool.contains(0));

        // The victim's bytes were forced before the drop.
        let mut file = PageFile::open(&path).unwrap();
        let page = file.read_page(0).unwrap();
        assert_eq!(trim_record(page.slot(0)), b"page-0");
    }

    #[test]
    fn test_transactional_pages_survive_eviction_pressure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let mut pool = BufferPool::with_capacity(PageFile::open(&path).unwrap(), 2);

        for page_id in 0..2u64 {
            let entry = pool.fix(page_id).unwrap();
            entry.page.write_slot(0, b"uncommitted");
            pool.mark_dirty(page_id).unwrap();
            pool.mark_transactional(page_id).unwrap();
            pool.unfix(page_id).unwrap();
        }

        // Both residents are transactional; the pool must grow, not spill them.
        pool.fix(2).unwrap();
        pool.unfix(2).unwrap();
        assert!(pool.contains(0));
        assert!(pool.contains(1));
        assert_eq!(pool.resident_pages(), 3);

        // Nothing leaked to disk.
        let mut file = PageFile::open(&path).unwrap();
        assert!(file.read_page(0).unwrap().as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_restore_resets_flags() {
        let dir = TempDir::new().unwrap();
        let mut pool = pool(&dir);

        let mut snapshot = Page::zeroed();
        snapshot.write_slot(0, b"before");

        let entry = pool.fix(0).unwrap();
        entry.page.write_slot(0, b"after");
        pool.mark_dirty(0).unwrap();
        pool.mark_transactional(0).unwrap();
        pool.unfix(0).unwrap();

        pool.restore(0, &snapshot);
        let entry = pool.fix(0).unwrap();
        assert_eq!(trim_record(entry.page.slot(0)), b"before");
        assert!(!entry.is_dirty());
        assert!(!entry.is_transactional());
        pool.unfix(0).unwrap();
    }
}
