use bytes::BytesMut;

use crate::status::{Result, Status};

/// Size in bytes of a WAL frame header, attached to every WAL page but no database page.
pub const FRAME_HEADER_SIZE: usize = 24;

/// One fixed-size page, all-zero on allocation. `frame_header` is `Some` only for WAL pages.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: BytesMut,
    pub frame_header: Option<BytesMut>,
}

impl Page {
    fn new_database(page_size: usize) -> Self {
        Page {
            body: BytesMut::zeroed(page_size),
            frame_header: None,
        }
    }

    fn new_wal(page_size: usize) -> Self {
        Page {
            body: BytesMut::zeroed(page_size),
            frame_header: Some(BytesMut::zeroed(FRAME_HEADER_SIZE)),
        }
    }
}

/// An ordered, dense, 1-based vector of pages for a single file. Growth happens one page at a
/// time and reallocates; truncation is the only contractive operation.
#[derive(Debug, Default)]
pub struct PageStore {
    pages: Vec<Page>,
    is_wal: bool,
}

impl PageStore {
    pub fn new(is_wal: bool) -> Self {
        PageStore {
            pages: Vec::new(),
            is_wal,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Returns page `pgno`, allocating it if `pgno == page_count() + 1`. Any other `pgno` past
    /// the end is a write-I/O error: the engine must not skip pages.
    pub fn ensure_page(&mut self, pgno: u32, page_size: usize) -> Result<&mut Page> {
        let count = self.page_count();
        if pgno == 0 {
            return Err(Status::IoErrWrite);
        }
        if pgno == count + 1 {
            let page = if self.is_wal {
                Page::new_wal(page_size)
            } else {
                Page::new_database(page_size)
            };
            self.pages.push(page);
        } else if pgno > count {
            return Err(Status::IoErrWrite);
        }
        Ok(&mut self.pages[(pgno - 1) as usize])
    }

    pub fn lookup_page(&self, pgno: u32) -> Option<&Page> {
        if pgno == 0 || pgno > self.page_count() {
            None
        } else {
            Some(&self.pages[(pgno - 1) as usize])
        }
    }

    pub fn lookup_page_mut(&mut self, pgno: u32) -> Option<&mut Page> {
        if pgno == 0 || pgno > self.page_count() {
            None
        } else {
            Some(&mut self.pages[(pgno - 1) as usize])
        }
    }

    /// Shrinks to exactly `n` pages. `n` must not exceed the current count; for a WAL page
    /// store `n` must be 0.
    pub fn truncate(&mut self, n: u32) -> Result<()> {
        if self.is_wal && n != 0 {
            return Err(Status::Protocol);
        }
        if n > self.page_count() {
            return Err(Status::IoErrTruncate);
        }
        self.pages.truncate(n as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_one_page_at_a_time() {
        let mut store = PageStore::new(false);
        assert!(store.ensure_page(2, 512).is_err());
        store.ensure_page(1, 512).unwrap();
        store.ensure_page(2, 512).unwrap();
        assert_eq!(store.page_count(), 2);
        assert!(store.ensure_page(4, 512).is_err());
    }

    #[test]
    fn wal_pages_carry_frame_headers_db_pages_dont() {
        let mut db = PageStore::new(false);
        db.ensure_page(1, 512).unwrap();
        assert!(db.lookup_page(1).unwrap().frame_header.is_none());

        let mut wal = PageStore::new(true);
        wal.ensure_page(1, 512).unwrap();
        assert!(wal.lookup_page(1).unwrap().frame_header.is_some());
    }

    #[test]
    fn truncate_is_idempotent() {
        let mut store = PageStore::new(false);
        for i in 1..=4 {
            store.ensure_page(i, 64).unwrap();
        }
        store.truncate(2).unwrap();
        store.truncate(2).unwrap();
        assert_eq!(store.page_count(), 2);
        assert!(store.truncate(3).is_err());
    }

    #[test]
    fn wal_truncate_only_accepts_zero() {
        let mut wal = PageStore::new(true);
        wal.ensure_page(1, 64).unwrap();
        assert!(matches!(wal.truncate(1), Err(Status::Protocol)));
        wal.truncate(0).unwrap();
        assert_eq!(wal.page_count(), 0);
    }

    proptest::proptest! {
        /// Growing a database page store to `grown` pages one at a time and then truncating to
        /// `kept <= grown` always lands on exactly `kept` pages, and truncating again to the same
        /// count is a no-op.
        #[test]
        fn grow_then_truncate_round_trips(grown in 1u32..64, kept in 0u32..64) {
            let kept = kept.min(grown);
            let mut store = PageStore::new(false);
            for pgno in 1..=grown {
                store.ensure_page(pgno, 64).unwrap();
            }
            store.truncate(kept).unwrap();
            prop_assert_eq!(store.page_count(), kept);
            store.truncate(kept).unwrap();
            prop_assert_eq!(store.page_count(), kept);
        }
    }
}
