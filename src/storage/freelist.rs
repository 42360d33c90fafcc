//! # Free-Page List and Page Allocation
//!
//! Dropped B+trees return their pages to a singly linked freelist chained
//! through each free page's `right_ptr` header field; the head and count
//! live in the database header. The allocator pops from the freelist
//! before extending the file, so dropped tables stop the file from
//! growing monotonically.

use std::sync::Arc;

use eyre::Result;
use parking_lot::Mutex;

use super::page::{PageHeader, PageType};
use super::{BufferPool, DbFile, PageGuard, PageId, INVALID_PAGE_ID};

#[derive(Debug, Clone, Copy)]
pub struct FreelistState {
    pub head: PageId,
    pub count: u64,
}

impl FreelistState {
    pub fn empty() -> FreelistState {
        FreelistState {
            head: INVALID_PAGE_ID,
            count: 0,
        }
    }
}

struct AllocState {
    next_page_id: PageId,
    freelist: FreelistState,
}

/// Hands out pages, recycling freed ones first.
pub struct Allocator {
    pool: Arc<BufferPool>,
    file: Arc<DbFile>,
    state: Mutex<AllocState>,
}

impl Allocator {
    pub fn new(
        pool: Arc<BufferPool>,
        file: Arc<DbFile>,
        page_count: u64,
        freelist: FreelistState,
    ) -> Allocator {
        Allocator {
            pool,
            file,
            state: Mutex::new(AllocState {
                next_page_id: page_count,
                freelist,
            }),
        }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn file(&self) -> &Arc<DbFile> {
        &self.file
    }

    /// Total pages handed out so far; persisted as the header page count.
    pub fn page_count(&self) -> u64 {
        self.state.lock().next_page_id
    }

    pub fn freelist(&self) -> FreelistState {
        self.state.lock().freelist
    }

    /// Returns a pinned, zeroed page: either a recycled freelist page or a
    /// fresh one appended to the file.
    pub fn allocate(&self) -> Result<PageGuard<'_>> {
        let mut state = self.state.lock();

        if state.freelist.head != INVALID_PAGE_ID {
            let page_id = state.freelist.head;
            let mut guard = self.pool.get(&self.file, page_id)?;
            let next = PageHeader::from_bytes(guard.data())?.right_ptr();
            state.freelist.head = next;
            state.freelist.count = state.freelist.count.saturating_sub(1);
            guard.data_mut().fill(0);
            return Ok(guard);
        }

        let page_id = state.next_page_id;
        state.next_page_id += 1;
        drop(state);

        self.pool.install_new(&self.file, page_id)
    }

    /// Pushes a page onto the freelist.
    pub fn free_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        let mut guard = self.pool.get(&self.file, page_id)?;

        let data = guard.data_mut();
        data.fill(0);
        let header = PageHeader::init(data, PageType::Freelist)?;
        header.set_right_ptr(state.freelist.head);

        state.freelist.head = page_id;
        state.freelist.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PAGE_SIZE;

    fn setup() -> Allocator {
        let file = Arc::new(DbFile::open_memory());
        file.write_all_at(0, &vec![0u8; 2 * PAGE_SIZE]).unwrap();
        let pool = Arc::new(BufferPool::new(PAGE_SIZE * 32, PAGE_SIZE));
        Allocator::new(pool, file, 2, FreelistState::empty())
    }

    #[test]
    fn allocates_sequential_ids_past_reserved_pages() {
        let alloc = setup();
        let a = alloc.allocate().unwrap().page_id();
        let b = alloc.allocate().unwrap().page_id();
        assert_eq!(a, 2);
        assert_eq!(b, 3);
        assert_eq!(alloc.page_count(), 4);
    }

    #[test]
    fn freed_pages_are_recycled_lifo() {
        let alloc = setup();
        let a = alloc.allocate().unwrap().page_id();
        let b = alloc.allocate().unwrap().page_id();

        alloc.free_page(a).unwrap();
        alloc.free_page(b).unwrap();
        assert_eq!(alloc.freelist().count, 2);

        assert_eq!(alloc.allocate().unwrap().page_id(), b);
        assert_eq!(alloc.allocate().unwrap().page_id(), a);
        assert_eq!(alloc.freelist().count, 0);

        // Chain exhausted; back to extending the file.
        assert_eq!(alloc.allocate().unwrap().page_id(), 4);
    }

    #[test]
    fn recycled_page_comes_back_zeroed() {
        let alloc = setup();
        let id = {
            let mut guard = alloc.allocate().unwrap();
            guard.data_mut()[100] = 0xEE;
            guard.page_id()
        };
        alloc.free_page(id).unwrap();

        let guard = alloc.allocate().unwrap();
        assert_eq!(guard.page_id(), id);
        assert!(guard.data().iter().all(|&b| b == 0));
    }
}
