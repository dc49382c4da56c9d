/// Fixed-geometry page (4096 bytes).
///
/// A page is a flat array of fixed-width record slots:
///   slot s occupies bytes [s * RECORD_SIZE, (s + 1) * RECORD_SIZE)
///
/// Records are UTF-8 text, right-padded with NUL bytes to RECORD_SIZE.
/// Slots past the database's record count hold zeroes.
///
/// Record id geometry:
///   page_id = rid / RECORDS_PER_PAGE
///   slot    = rid % RECORDS_PER_PAGE

pub const PAGE_SIZE: usize = 4096;
pub const RECORD_SIZE: usize = 100;
pub const RECORDS_PER_PAGE: usize = PAGE_SIZE / RECORD_SIZE;

/// Data file header: big-endian u64 record count at offset 0.
pub const HEADER_SIZE: u64 = 8;

pub type PageId = u64;
pub type RecordId = u32;

/// Page a record id lives on.
pub fn page_of(rid: RecordId) -> PageId {
    rid as PageId / RECORDS_PER_PAGE as PageId
}

/// Slot index of a record id within its page.
pub fn slot_of(rid: RecordId) -> usize {
    rid as usize % RECORDS_PER_PAGE
}

/// First record id hosted by a page.
pub fn first_rid_of(page_id: PageId) -> u64 {
    page_id * RECORDS_PER_PAGE as u64
}

#[derive(Clone, Debug)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn zeroed() -> Self {
        Page {
            data: [0u8; PAGE_SIZE],
        }
    }

    pub fn from_bytes(data: [u8; PAGE_SIZE]) -> Self {
        Page { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw slot bytes, NUL padding included.
    pub fn slot(&self, slot: usize) -> &[u8] {
        debug_assert!(slot < RECORDS_PER_PAGE);
        let start = slot * RECORD_SIZE;
        &self.data[start..start + RECORD_SIZE]
    }

    /// Overwrite a slot with `payload`, truncated or NUL-padded to RECORD_SIZE.
    pub fn write_slot(&mut self, slot: usize, payload: &[u8]) {
        debug_assert!(slot < RECORDS_PER_PAGE);
        let start = slot * RECORD_SIZE;
        let dst = &mut self.data[start..start + RECORD_SIZE];
        let n = payload.len().min(RECORD_SIZE);
        dst[..n].copy_from_slice(&payload[..n]);
        dst[n..].fill(0);
    }
}

/// Strip the NUL padding from slot bytes.
pub fn trim_record(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_geometry() {
        assert_eq!(RECORDS_PER_PAGE, 40);
        assert_eq!(page_of(0), 0);
        assert_eq!(slot_of(0), 0);
        assert_eq!(page_of(39), 0);
        assert_eq!(slot_of(39), 39);
        assert_eq!(page_of(40), 1);
        assert_eq!(slot_of(40), 0);
        assert_eq!(first_rid_of(2), 80);
    }

    #[test]
    fn test_write_slot_pads_with_nul() {
        let mut page = Page::zeroed();
        page.write_slot(3, b"Alice");

        let raw = page.slot(3);
        assert_eq!(&raw[..5], b"Alice");
        assert!(raw[5..].iter().all(|&b| b == 0));
        assert_eq!(trim_record(raw), b"Alice");
    }

    #[test]
    fn test_write_slot_truncates_long_payload() {
        let mut page = Page::zeroed();
        let long = vec![b'x'; RECORD_SIZE + 30];
        page.write_slot(0, &long);

        assert_eq!(page.slot(0), &long[..RECORD_SIZE]);
        // Neighbouring slot untouched.
        assert!(page.slot(1).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_overwrite_clears_old_tail() {
        let mut page = Page::zeroed();
        page.write_slot(0, b"Charlie");
        page.write_slot(0, b"Bob");
        assert_eq!(trim_record(page.slot(0)), b"Bob");
    }

    #[test]
    fn test_trim_record_empty_slot() {
        let page = Page::zeroed();
        assert_eq!(trim_record(page.slot(7)), b"");
    }
}
