//! # Storage Layer
//!
//! The storage layer owns everything below the B+tree: the database file,
//! its header, the fixed-size page abstraction, the LRU buffer pool with
//! optional page-level authenticated encryption, the free-page list, and
//! the write-ahead log.
//!
//! ## File Layout
//!
//! ```text
//! +--------------------+  page 0
//! | DbHeader (68B)     |  magic, version, page size, page count,
//! | zero fill          |  freelist, schema root, txn id, CRC32
//! +--------------------+  page 1
//! | schema page        |  reserved at creation, written on close
//! +--------------------+  page 2..
//! | B+tree / free pages|
//! +--------------------+
//! ```
//!
//! Pages are 16 KiB and addressed by a 64-bit page id equal to the byte
//! offset divided by the on-disk page size. When a cipher is installed the
//! on-disk page grows by the cipher's tag size; the authentication tag sits
//! immediately after the ciphertext.
//!
//! ## Module Organization
//!
//! - `file`: positioned read/write/sync/truncate over disk or memory
//! - `headers`: the database file header
//! - `page`: the 32-byte common page header shared by every page type
//! - `row`: the row tuple codec stored as B+tree values
//! - `pool`: LRU page cache with pin counts and encrypt-on-write
//! - `freelist`: free-page chain and the page allocator
//! - `wal`: append-only redo log with savepoints and crash recovery

mod file;
mod freelist;
mod headers;
mod page;
mod pool;
mod row;
mod wal;

pub use file::{DbFile, OpenFlags};
pub use freelist::{Allocator, FreelistState};
pub use headers::{DbHeader, DB_HEADER_SIZE, DB_MAGIC, FORMAT_VERSION};
pub use page::{PageHeader, PageType, PAGE_HEADER_SIZE};
pub use pool::{BufferPool, PageGuard, PoolStats};
pub use row::{decode_row, encode_row, encode_values};
pub use wal::{Wal, WalRecordType, WAL_HEADER_SIZE, WAL_MAGIC};

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Fixed page size. The header stores it, but only this value is accepted.
pub const PAGE_SIZE: usize = 16384;
pub const MIN_PAGE_SIZE: usize = 4096;
pub const MAX_PAGE_SIZE: usize = 65536;

/// Default buffer pool budget (256 MiB).
pub const DEFAULT_CACHE_SIZE: usize = 256 * 1024 * 1024;

/// 64-bit page id; byte offset / on-disk page size.
pub type PageId = u64;

/// Reserved "no page" id.
pub const INVALID_PAGE_ID: PageId = u64::MAX;

/// Page id of the persisted schema, reserved at database creation.
pub const SCHEMA_PAGE_ID: PageId = 1;

/// Parses a zerocopy struct from a byte slice with size validation.
#[inline]
pub fn parse_zerocopy<'a, T: FromBytes + KnownLayout + Immutable>(
    bytes: &'a [u8],
    type_name: &str,
) -> Result<&'a T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::ref_from_bytes(&bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}

/// Parses a mutable zerocopy struct from a byte slice with size validation.
#[inline]
pub fn parse_zerocopy_mut<'a, T: FromBytes + KnownLayout + zerocopy::IntoBytes>(
    bytes: &'a mut [u8],
    type_name: &str,
) -> Result<&'a mut T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::mut_from_bytes(&mut bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}

/// CRC32 used by the file header, page headers and WAL records.
pub fn crc32(data: &[u8]) -> u32 {
    const CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    CRC.checksum(data)
}
