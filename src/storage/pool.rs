//! # Buffer Pool
//!
//! Bounded in-memory cache of pages keyed by page id. Pages are loaded on
//! demand, pinned while in use, and written back on eviction and on
//! explicit flush. When a cipher context is installed, pages are encrypted
//! on the way out to disk and decrypted on the way in.
//!
//! ## Structure
//!
//! All frames are pre-allocated at construction. Lookup goes through a
//! fixed bucket array sized at 1.25x the frame count (at least 17),
//! addressed with Fibonacci hashing of the page id. Recency is a doubly
//! linked list with `head = MRU`; victim selection walks backwards from
//! the tail until an unpinned frame is found, and fails when every frame
//! is pinned. Hit and miss counters are maintained for diagnostics.
//!
//! ## Encryption
//!
//! With a cipher installed the on-disk page occupies `page_size +
//! tag_size` bytes; the tag is stored right after the ciphertext. The IV
//! is derived deterministically from the page id (little-endian id in the
//! low 8 bytes, the ASCII bytes `S`, `Q`, `L` at offsets 8..11) and the
//! AAD is the 8-byte little-endian page id, so a page can neither be
//! modified nor transplanted to another slot without failing
//! authentication. Decrypt failure surfaces as `Corrupt`. A single
//! staging buffer per pool avoids an extra copy on every transfer.
//!
//! ## Locking
//!
//! One mutex guards the whole pool. Pinning a page does not grant
//! exclusive access to its bytes; higher layers (the B+tree reader-writer
//! lock) coordinate concurrent readers and writers of page content.

use std::cell::{Cell, UnsafeCell};

use eyre::{Result, WrapErr};
use parking_lot::Mutex;

use crate::crypto::{page_aad, page_iv, CipherCtx, CipherKind};
use crate::error::{db_err, ErrorCode};

use super::page::PAGE_HEADER_SIZE;
use super::{crc32, DbFile, PageId, INVALID_PAGE_ID};

/// Minimum number of frames regardless of the configured cache size.
const MIN_FRAMES: usize = 16;
const MIN_BUCKETS: usize = 17;

const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Invalid,
    Clean,
    Dirty,
}

struct Frame {
    page_id: PageId,
    state: FrameState,
    pin_count: u32,
    hash_next: usize,
    lru_prev: usize,
    lru_next: usize,
}

struct PoolCrypto {
    ctx: Box<dyn CipherCtx>,
    cipher_id: CipherKind,
    tag_size: usize,
    staging: Vec<u8>,
}

struct PoolInner {
    frames: Vec<Frame>,
    buckets: Vec<usize>,
    lru_head: usize,
    lru_tail: usize,
    free_head: usize,
    hits: u64,
    misses: u64,
    crypto: Option<PoolCrypto>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct BufferPool {
    inner: Mutex<PoolInner>,
    // Frame buffers live outside the mutex so pinned pages can be read
    // without holding the pool lock. Allocated once, never resized.
    bufs: Vec<UnsafeCell<Box<[u8]>>>,
    page_size: usize,
}

// SAFETY: buffer access is mediated by PageGuard, which only exists for
// pinned frames. A pinned frame is never recycled, so its buffer cannot be
// repurposed underneath a guard. Exclusive access to page bytes is the
// responsibility of the layer above (per-tree RwLock), as documented.
unsafe impl Send for BufferPool {}
unsafe impl Sync for BufferPool {}

impl BufferPool {
    /// Allocates `cache_bytes / page_size` frames (minimum 16), each with a
    /// pre-allocated page buffer.
    pub fn new(cache_bytes: usize, page_size: usize) -> BufferPool {
        let frame_count = (cache_bytes / page_size).max(MIN_FRAMES);
        let bucket_count = (frame_count + frame_count / 4).max(MIN_BUCKETS);

        let mut frames = Vec::with_capacity(frame_count);
        let mut bufs = Vec::with_capacity(frame_count);
        for i in 0..frame_count {
            frames.push(Frame {
                page_id: INVALID_PAGE_ID,
                state: FrameState::Invalid,
                pin_count: 0,
                hash_next: NIL,
                lru_prev: NIL,
                lru_next: if i + 1 < frame_count { i + 1 } else { NIL },
            });
            bufs.push(UnsafeCell::new(
                vec![0u8; page_size].into_boxed_slice(),
            ));
        }

        BufferPool {
            inner: Mutex::new(PoolInner {
                frames,
                buckets: vec![NIL; bucket_count],
                lru_head: NIL,
                lru_tail: NIL,
                free_head: 0,
                hits: 0,
                misses: 0,
                crypto: None,
            }),
            bufs,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// On-disk page size: `page_size` plus the cipher tag when encrypted.
    pub fn disk_page_size(&self) -> usize {
        let inner = self.inner.lock();
        self.page_size + inner.crypto.as_ref().map_or(0, |c| c.tag_size)
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    /// Installs or removes the page cipher. Any resident pages are
    /// discarded, because their disk offsets and transfer size change with
    /// the cipher; the caller must ensure no pages are pinned or dirty.
    pub fn set_encryption(&self, cipher: Option<(Box<dyn CipherCtx>, CipherKind, usize)>) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.frames.iter().all(|f| f.pin_count == 0));
        self.reset_frames(&mut inner);
        inner.crypto = cipher.map(|(ctx, cipher_id, tag_size)| PoolCrypto {
            ctx,
            cipher_id,
            tag_size,
            staging: vec![0u8; self.page_size + tag_size],
        });
    }

    pub fn cipher_kind(&self) -> Option<CipherKind> {
        self.inner.lock().crypto.as_ref().map(|c| c.cipher_id)
    }

    /// Fetches a page, reading it from the file on a miss.
    pub fn get<'p>(&'p self, file: &DbFile, page_id: PageId) -> Result<PageGuard<'p>> {
        let mut inner = self.inner.lock();

        if let Some(idx) = self.hash_find(&inner, page_id) {
            inner.hits += 1;
            inner.frames[idx].pin_count += 1;
            if inner.frames[idx].pin_count == 1 {
                self.lru_remove(&mut inner, idx);
                self.lru_push_front(&mut inner, idx);
            }
            return Ok(self.make_guard(idx, page_id));
        }

        inner.misses += 1;
        let idx = self.take_victim(&mut inner, Some(file))?;

        let disk_size = self.page_size + inner.crypto.as_ref().map_or(0, |c| c.tag_size);
        let offset = page_id * disk_size as u64;

        let read = match inner.crypto.as_mut() {
            Some(PoolCrypto { ctx, staging, .. }) => {
                file.read_exact_at(offset, staging).and_then(|_| {
                    let (cipher, tag) = staging.split_at(self.page_size);
                    ctx.decrypt(cipher, &page_iv(page_id), &page_aad(page_id), tag, self.buf_mut(idx))
                        .map_err(|e| {
                            db_err(
                                ErrorCode::Corrupt,
                                format!("page {} failed authentication: {}", page_id, e),
                            )
                        })
                })
            }
            None => file.read_exact_at(offset, self.buf_mut(idx)),
        };

        if let Err(e) = read {
            self.release_frame(&mut inner, idx);
            return Err(e).wrap_err_with(|| format!("loading page {}", page_id));
        }

        if let Err(e) = self.verify_checksum(idx, page_id) {
            self.release_frame(&mut inner, idx);
            return Err(e);
        }

        inner.frames[idx].page_id = page_id;
        inner.frames[idx].state = FrameState::Clean;
        inner.frames[idx].pin_count = 1;
        self.hash_insert(&mut inner, idx, page_id);
        self.lru_push_front(&mut inner, idx);

        Ok(self.make_guard(idx, page_id))
    }

    /// Produces a writable frame for `page_id` without reading the file:
    /// the cached frame when resident, otherwise a zeroed dirty frame.
    /// Used for pages that are about to be fully rewritten, like the
    /// schema page, whose on-disk slot may still be a file hole.
    pub fn put_page<'p>(&'p self, file: &DbFile, page_id: PageId) -> Result<PageGuard<'p>> {
        let mut inner = self.inner.lock();

        if let Some(idx) = self.hash_find(&inner, page_id) {
            inner.frames[idx].pin_count += 1;
            if inner.frames[idx].pin_count == 1 {
                self.lru_remove(&mut inner, idx);
                self.lru_push_front(&mut inner, idx);
            }
            return Ok(self.make_guard(idx, page_id));
        }

        let idx = self.take_victim(&mut inner, Some(file))?;
        self.buf_mut(idx).fill(0);
        inner.frames[idx].page_id = page_id;
        inner.frames[idx].state = FrameState::Dirty;
        inner.frames[idx].pin_count = 1;
        self.hash_insert(&mut inner, idx, page_id);
        self.lru_push_front(&mut inner, idx);

        Ok(self.make_guard(idx, page_id))
    }

    /// Installs a brand-new zeroed page under `page_id`, extending the file
    /// by one (possibly encrypted) page-sized block.
    pub fn install_new<'p>(&'p self, file: &DbFile, page_id: PageId) -> Result<PageGuard<'p>> {
        let mut inner = self.inner.lock();
        let idx = self.take_victim(&mut inner, Some(file))?;

        self.buf_mut(idx).fill(0);
        inner.frames[idx].page_id = page_id;
        inner.frames[idx].state = FrameState::Dirty;
        inner.frames[idx].pin_count = 1;

        if let Err(e) = self.write_frame(&mut inner, file, idx, page_id) {
            inner.frames[idx].pin_count = 0;
            self.release_frame(&mut inner, idx);
            return Err(e).wrap_err_with(|| format!("extending file with page {}", page_id));
        }

        self.hash_insert(&mut inner, idx, page_id);
        self.lru_push_front(&mut inner, idx);

        Ok(self.make_guard(idx, page_id))
    }

    /// Writes every dirty page back (encrypting if configured), marks them
    /// clean, then syncs the file.
    pub fn flush(&self, file: &DbFile) -> Result<()> {
        let mut inner = self.inner.lock();

        for idx in 0..inner.frames.len() {
            if inner.frames[idx].state == FrameState::Dirty {
                let page_id = inner.frames[idx].page_id;
                self.seal_checksum(idx);
                self.write_frame(&mut inner, file, idx, page_id)
                    .wrap_err_with(|| format!("flushing page {}", page_id))?;
                inner.frames[idx].state = FrameState::Clean;
            }
        }

        file.sync()
    }

    /// Rollback helper: discards every dirty page without writing it back.
    pub fn invalidate_dirty(&self) {
        let mut inner = self.inner.lock();
        for idx in 0..inner.frames.len() {
            if inner.frames[idx].state == FrameState::Dirty {
                debug_assert_eq!(inner.frames[idx].pin_count, 0, "dirty page still pinned");
                self.hash_remove(&mut inner, idx);
                self.lru_remove(&mut inner, idx);
                self.release_frame(&mut inner, idx);
            }
        }
    }

    /// Copies of the plaintext images of every dirty page, with their
    /// checksums sealed. Used to emit WAL page records before a commit
    /// flush; copies, so the caller can re-enter the pool freely.
    pub fn dirty_pages(&self) -> Vec<(PageId, Vec<u8>)> {
        let inner = self.inner.lock();
        let mut dirty = Vec::new();
        for idx in 0..inner.frames.len() {
            if inner.frames[idx].state == FrameState::Dirty {
                self.seal_checksum(idx);
                dirty.push((inner.frames[idx].page_id, self.buf(idx).to_vec()));
            }
        }
        dirty
    }

    /// Encrypts `plain` into its on-disk form for `page_id` (identity when
    /// no cipher is installed). Used by the WAL, whose page images are
    /// stored in disk form so recovery can run without a key.
    pub fn disk_image(&self, page_id: PageId, plain: &[u8]) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        match inner.crypto.as_mut() {
            Some(crypto) => {
                let mut out = vec![0u8; plain.len() + crypto.tag_size];
                let (cipher, tag) = out.split_at_mut(plain.len());
                crypto
                    .ctx
                    .encrypt(plain, &page_iv(page_id), &page_aad(page_id), cipher, tag)?;
                Ok(out)
            }
            None => Ok(plain.to_vec()),
        }
    }

    /// Drops every resident page. Pinned or dirty pages are a caller bug.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        self.reset_frames(&mut inner);
    }

    fn reset_frames(&self, inner: &mut PoolInner) {
        for bucket in inner.buckets.iter_mut() {
            *bucket = NIL;
        }
        inner.lru_head = NIL;
        inner.lru_tail = NIL;
        inner.free_head = NIL;
        for idx in (0..inner.frames.len()).rev() {
            let frame = &mut inner.frames[idx];
            frame.page_id = INVALID_PAGE_ID;
            frame.state = FrameState::Invalid;
            frame.pin_count = 0;
            frame.hash_next = NIL;
            frame.lru_prev = NIL;
            frame.lru_next = inner.free_head;
            inner.free_head = idx;
        }
    }

    pub(crate) fn unpin(&self, idx: usize, dirty: bool) {
        let mut inner = self.inner.lock();
        let frame = &mut inner.frames[idx];
        debug_assert!(frame.pin_count > 0, "unpin on unpinned frame");
        frame.pin_count = frame.pin_count.saturating_sub(1);
        if dirty && frame.state != FrameState::Dirty {
            frame.state = FrameState::Dirty;
        }
    }

    // --- internal helpers -------------------------------------------------

    fn make_guard(&self, idx: usize, page_id: PageId) -> PageGuard<'_> {
        PageGuard {
            pool: self,
            frame: idx,
            page_id,
            dirty: Cell::new(false),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn buf_mut(&self, idx: usize) -> &mut [u8] {
        // SAFETY: callers hold the pool mutex (load paths) or a pinned
        // guard with exclusive access (data_mut). See the Sync rationale.
        unsafe { &mut *self.bufs[idx].get() }
    }

    fn buf(&self, idx: usize) -> &[u8] {
        // SAFETY: as above.
        unsafe { &*self.bufs[idx].get() }
    }

    fn bucket_of(&self, inner: &PoolInner, page_id: PageId) -> usize {
        // Fibonacci hashing spreads sequential page ids across buckets.
        let h = page_id.wrapping_mul(11400714819323198485) >> 44;
        (h as usize) % inner.buckets.len()
    }

    fn hash_find(&self, inner: &PoolInner, page_id: PageId) -> Option<usize> {
        let mut idx = inner.buckets[self.bucket_of(inner, page_id)];
        while idx != NIL {
            if inner.frames[idx].page_id == page_id {
                return Some(idx);
            }
            idx = inner.frames[idx].hash_next;
        }
        None
    }

    fn hash_insert(&self, inner: &mut PoolInner, idx: usize, page_id: PageId) {
        let bucket = self.bucket_of(inner, page_id);
        inner.frames[idx].hash_next = inner.buckets[bucket];
        inner.buckets[bucket] = idx;
    }

    fn hash_remove(&self, inner: &mut PoolInner, idx: usize) {
        let bucket = self.bucket_of(inner, inner.frames[idx].page_id);
        let mut cur = inner.buckets[bucket];
        if cur == idx {
            inner.buckets[bucket] = inner.frames[idx].hash_next;
        } else {
            while cur != NIL {
                let next = inner.frames[cur].hash_next;
                if next == idx {
                    inner.frames[cur].hash_next = inner.frames[idx].hash_next;
                    break;
                }
                cur = next;
            }
        }
        inner.frames[idx].hash_next = NIL;
    }

    fn lru_push_front(&self, inner: &mut PoolInner, idx: usize) {
        inner.frames[idx].lru_prev = NIL;
        inner.frames[idx].lru_next = inner.lru_head;
        if inner.lru_head != NIL {
            inner.frames[inner.lru_head].lru_prev = idx;
        } else {
            inner.lru_tail = idx;
        }
        inner.lru_head = idx;
    }

    fn lru_remove(&self, inner: &mut PoolInner, idx: usize) {
        let (prev, next) = (inner.frames[idx].lru_prev, inner.frames[idx].lru_next);
        if prev != NIL {
            inner.frames[prev].lru_next = next;
        } else if inner.lru_head == idx {
            inner.lru_head = next;
        }
        if next != NIL {
            inner.frames[next].lru_prev = prev;
        } else if inner.lru_tail == idx {
            inner.lru_tail = prev;
        }
        inner.frames[idx].lru_prev = NIL;
        inner.frames[idx].lru_next = NIL;
    }

    fn release_frame(&self, inner: &mut PoolInner, idx: usize) {
        inner.frames[idx].page_id = INVALID_PAGE_ID;
        inner.frames[idx].state = FrameState::Invalid;
        inner.frames[idx].hash_next = NIL;
        inner.frames[idx].lru_prev = NIL;
        inner.frames[idx].lru_next = inner.free_head;
        inner.free_head = idx;
    }

    /// Pops a free frame, or evicts the least recently used unpinned frame
    /// (writing it back first when dirty). Fails when everything is pinned.
    fn take_victim(&self, inner: &mut PoolInner, file: Option<&DbFile>) -> Result<usize> {
        if inner.free_head != NIL {
            let idx = inner.free_head;
            inner.free_head = inner.frames[idx].lru_next;
            inner.frames[idx].lru_next = NIL;
            return Ok(idx);
        }

        let mut idx = inner.lru_tail;
        while idx != NIL {
            if inner.frames[idx].pin_count == 0 {
                let page_id = inner.frames[idx].page_id;
                if inner.frames[idx].state == FrameState::Dirty {
                    let file = file.ok_or_else(|| {
                        db_err(ErrorCode::Misuse, "dirty eviction without a file")
                    })?;
                    self.seal_checksum(idx);
                    self.write_frame(inner, file, idx, page_id)
                        .wrap_err_with(|| format!("evicting dirty page {}", page_id))?;
                }
                self.lru_remove(inner, idx);
                self.hash_remove(inner, idx);
                inner.frames[idx].page_id = INVALID_PAGE_ID;
                inner.frames[idx].state = FrameState::Invalid;
                return Ok(idx);
            }
            idx = inner.frames[idx].lru_prev;
        }

        Err(db_err(
            ErrorCode::Full,
            "buffer pool exhausted: all pages pinned",
        ))
    }

    fn write_frame(
        &self,
        inner: &mut PoolInner,
        file: &DbFile,
        idx: usize,
        page_id: PageId,
    ) -> Result<()> {
        let disk_size = self.page_size + inner.crypto.as_ref().map_or(0, |c| c.tag_size);
        let offset = page_id * disk_size as u64;

        match inner.crypto.as_mut() {
            Some(PoolCrypto { ctx, staging, .. }) => {
                let (cipher, tag) = staging.split_at_mut(self.page_size);
                ctx.encrypt(
                    self.buf(idx),
                    &page_iv(page_id),
                    &page_aad(page_id),
                    cipher,
                    tag,
                )?;
                file.write_all_at(offset, staging)
            }
            None => file.write_all_at(offset, self.buf(idx)),
        }
    }

    /// Stores the CRC32 of the page payload into the page header.
    fn seal_checksum(&self, idx: usize) {
        let buf = self.buf_mut(idx);
        let sum = crc32(&buf[PAGE_HEADER_SIZE..]);
        buf[28..32].copy_from_slice(&sum.to_le_bytes());
    }

    fn verify_checksum(&self, idx: usize, page_id: PageId) -> Result<()> {
        let buf = self.buf(idx);
        if buf[0] == 0 {
            return Ok(()); // never-sealed fresh page
        }
        let stored = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        let actual = crc32(&buf[PAGE_HEADER_SIZE..]);
        if stored != actual {
            return Err(db_err(
                ErrorCode::Corrupt,
                format!("page {} checksum mismatch", page_id),
            ));
        }
        Ok(())
    }
}

/// A pinned page. Dropping the guard unpins it, carrying the dirty flag
/// accumulated through `data_mut`/`mark_dirty`.
pub struct PageGuard<'p> {
    pool: &'p BufferPool,
    frame: usize,
    page_id: PageId,
    dirty: Cell<bool>,
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("frame", &self.frame)
            .field("page_id", &self.page_id)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl<'p> PageGuard<'p> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        self.pool.buf(self.frame)
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty.set(true);
        self.pool.buf_mut(self.frame)
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame, self.dirty.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PageType, PAGE_SIZE};

    fn mem_file_with_pages(n: u64) -> DbFile {
        let file = DbFile::open_memory();
        file.write_all_at(0, &vec![0u8; (n as usize) * PAGE_SIZE])
            .unwrap();
        file
    }

    #[test]
    fn get_miss_then_hit() {
        let file = mem_file_with_pages(4);
        let pool = BufferPool::new(PAGE_SIZE * 16, PAGE_SIZE);

        drop(pool.get(&file, 2).unwrap());
        drop(pool.get(&file, 2).unwrap());

        let stats = pool.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn dirty_page_round_trips_through_flush_and_eviction() {
        let file = mem_file_with_pages(2);
        let pool = BufferPool::new(PAGE_SIZE * 16, PAGE_SIZE);

        {
            let mut guard = pool.get(&file, 1).unwrap();
            guard.data_mut()[0] = PageType::BtreeLeaf as u8;
            guard.data_mut()[100] = 0xAB;
        }
        pool.flush(&file).unwrap();
        pool.clear();

        let guard = pool.get(&file, 1).unwrap();
        assert_eq!(guard.data()[100], 0xAB);
    }

    #[test]
    fn invalidate_dirty_discards_changes() {
        let file = mem_file_with_pages(2);
        let pool = BufferPool::new(PAGE_SIZE * 16, PAGE_SIZE);

        {
            let mut guard = pool.get(&file, 1).unwrap();
            guard.data_mut()[100] = 0xCD;
        }
        pool.invalidate_dirty();

        let guard = pool.get(&file, 1).unwrap();
        assert_eq!(guard.data()[100], 0);
    }

    #[test]
    fn install_new_extends_file() {
        let file = mem_file_with_pages(1);
        let pool = BufferPool::new(PAGE_SIZE * 16, PAGE_SIZE);

        let guard = pool.install_new(&file, 1).unwrap();
        assert_eq!(guard.page_id(), 1);
        drop(guard);

        assert_eq!(file.size().unwrap(), 2 * PAGE_SIZE as u64);
    }

    #[test]
    fn all_pinned_fails_allocation() {
        let file = mem_file_with_pages(40);
        let pool = BufferPool::new(0, PAGE_SIZE); // clamps to 16 frames

        let guards: Vec<_> = (0..16).map(|i| pool.get(&file, i).unwrap()).collect();
        let err = pool.get(&file, 30).unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::Full);
        drop(guards);

        assert!(pool.get(&file, 30).is_ok());
    }

    #[test]
    fn eviction_writes_back_dirty_pages() {
        let file = mem_file_with_pages(40);
        let pool = BufferPool::new(0, PAGE_SIZE); // 16 frames

        {
            let mut guard = pool.get(&file, 3).unwrap();
            guard.data_mut()[0] = PageType::BtreeLeaf as u8;
            guard.data_mut()[200] = 0x5A;
        }
        // Touch enough other pages to force page 3 out.
        for i in 10..30 {
            drop(pool.get(&file, i).unwrap());
        }

        let guard = pool.get(&file, 3).unwrap();
        assert_eq!(guard.data()[200], 0x5A);
    }

    #[test]
    fn corrupted_payload_fails_checksum_on_load() {
        let file = mem_file_with_pages(2);
        let pool = BufferPool::new(PAGE_SIZE * 16, PAGE_SIZE);

        {
            let mut guard = pool.get(&file, 1).unwrap();
            guard.data_mut()[0] = PageType::BtreeLeaf as u8;
            guard.data_mut()[300] = 1;
        }
        pool.flush(&file).unwrap();
        pool.clear();

        // Flip a payload byte behind the pool's back.
        let mut byte = [0u8; 1];
        file.read_exact_at(PAGE_SIZE as u64 + 301, &mut byte).unwrap();
        file.write_all_at(PAGE_SIZE as u64 + 301, &[byte[0] ^ 0xFF])
            .unwrap();

        let err = pool.get(&file, 1).unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::Corrupt);
    }
}
