use std::collections::HashMap;

use crate::storage::page::{Page, PageId};

/// Before-image buffer: page snapshots for the in-flight transaction.
///
/// A page is snapshotted once, at the moment the transaction first intends
/// to write to it — first write wins, later writes to the same page see
/// the entry already present. Rollback replays the snapshots; concurrent
/// readers of a locked record read through them. The buffer empties when
/// the transaction commits or rolls back.
#[derive(Default, Debug)]
pub struct BeforeImageBuffer {
    snapshots: HashMap<PageId, Page>,
}

impl BeforeImageBuffer {
    pub fn new() -> Self {
        BeforeImageBuffer::default()
    }

    /// Keep a copy of `page` unless one was already taken.
    pub fn snapshot(&mut self, page_id: PageId, page: &Page) {
        self.snapshots.entry(page_id).or_insert_with(|| page.clone());
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.snapshots.contains_key(&page_id)
    }

    pub fn get(&self, page_id: PageId) -> Option<&Page> {
        self.snapshots.get(&page_id)
    }

    /// Move all snapshots out (rollback).
    pub fn take(&mut self) -> Vec<(PageId, Page)> {
        self.snapshots.drain().collect()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
