//! # Database File Header
//!
//! The first page of every database file carries a fixed header. The header
//! occupies the leading 68 bytes of page 0; the rest of the page is zero
//! fill. A file whose magic, version or checksum does not validate is
//! rejected as corrupt before anything else touches it.
//!
//! ```text
//! Offset  Size  Field           Description
//! ------  ----  --------------  ---------------------------------
//! 0       16    magic           "SpeedSQL format1"
//! 16      4     version         Format version (currently 1)
//! 20      4     page_size       Must equal 16384
//! 24      8     page_count      Total pages in the file
//! 32      8     freelist_head   First free page, or invalid
//! 40      8     freelist_count  Number of free pages
//! 48      8     schema_root     Schema page id, or invalid
//! 56      8     txn_id          Current transaction id
//! 64      4     checksum        CRC32 of bytes [0..64)
//! ```

use eyre::Result;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{db_err, ErrorCode};

use super::{crc32, PageId, INVALID_PAGE_ID, PAGE_SIZE};

pub const DB_MAGIC: &[u8; 16] = b"SpeedSQL format1";
pub const FORMAT_VERSION: u32 = 1;
pub const DB_HEADER_SIZE: usize = 68;

/// Byte span covered by the header checksum.
const CHECKSUM_SPAN: usize = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DbHeader {
    magic: [u8; 16],
    version: U32,
    page_size: U32,
    page_count: U64,
    freelist_head: U64,
    freelist_count: U64,
    schema_root: U64,
    txn_id: U64,
    checksum: U32,
}

const _: () = assert!(std::mem::size_of::<DbHeader>() == DB_HEADER_SIZE);

impl DbHeader {
    pub fn new() -> DbHeader {
        let mut header = DbHeader {
            magic: *DB_MAGIC,
            version: U32::new(FORMAT_VERSION),
            page_size: U32::new(PAGE_SIZE as u32),
            page_count: U64::new(2), // header page + reserved schema page
            freelist_head: U64::new(INVALID_PAGE_ID),
            freelist_count: U64::new(0),
            schema_root: U64::new(INVALID_PAGE_ID),
            txn_id: U64::new(1),
            checksum: U32::new(0),
        };
        header.refresh_checksum();
        header
    }

    /// Parses and fully validates a header image.
    pub fn parse(bytes: &[u8]) -> Result<DbHeader> {
        if bytes.len() < DB_HEADER_SIZE {
            return Err(db_err(ErrorCode::Corrupt, "file too small for header"));
        }

        let header = DbHeader::read_from_bytes(&bytes[..DB_HEADER_SIZE])
            .map_err(|_| db_err(ErrorCode::Corrupt, "unreadable database header"))?;

        if header.magic != *DB_MAGIC {
            return Err(db_err(ErrorCode::Corrupt, "invalid database file format"));
        }
        if header.version.get() > FORMAT_VERSION {
            return Err(db_err(
                ErrorCode::Corrupt,
                format!("format version {} not supported", header.version.get()),
            ));
        }
        let expected = crc32(&bytes[..CHECKSUM_SPAN]);
        if header.checksum.get() != expected {
            return Err(db_err(ErrorCode::Corrupt, "header checksum mismatch"));
        }
        if header.page_size.get() as usize != PAGE_SIZE {
            return Err(db_err(
                ErrorCode::Mismatch,
                format!(
                    "page size {} unsupported, expected {}",
                    header.page_size.get(),
                    PAGE_SIZE
                ),
            ));
        }

        Ok(header)
    }

    /// Serializes the header into the start of a page-sized buffer.
    pub fn write_to(&self, page: &mut [u8]) {
        debug_assert!(page.len() >= DB_HEADER_SIZE);
        page[..DB_HEADER_SIZE].copy_from_slice(self.as_bytes());
    }

    pub fn refresh_checksum(&mut self) {
        let mut image = [0u8; DB_HEADER_SIZE];
        image.copy_from_slice(self.as_bytes());
        self.checksum = U32::new(crc32(&image[..CHECKSUM_SPAN]));
    }

    pub fn version(&self) -> u32 {
        self.version.get()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.get()
    }

    pub fn page_count(&self) -> u64 {
        self.page_count.get()
    }

    pub fn set_page_count(&mut self, count: u64) {
        self.page_count = U64::new(count);
    }

    pub fn freelist_head(&self) -> PageId {
        self.freelist_head.get()
    }

    pub fn set_freelist_head(&mut self, head: PageId) {
        self.freelist_head = U64::new(head);
    }

    pub fn freelist_count(&self) -> u64 {
        self.freelist_count.get()
    }

    pub fn set_freelist_count(&mut self, count: u64) {
        self.freelist_count = U64::new(count);
    }

    pub fn schema_root(&self) -> PageId {
        self.schema_root.get()
    }

    pub fn set_schema_root(&mut self, root: PageId) {
        self.schema_root = U64::new(root);
    }

    pub fn txn_id(&self) -> u64 {
        self.txn_id.get()
    }

    pub fn set_txn_id(&mut self, txn: u64) {
        self.txn_id = U64::new(txn);
    }
}

impl Default for DbHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn header_page(header: &DbHeader) -> Vec<u8> {
        let mut page = vec![0u8; PAGE_SIZE];
        header.write_to(&mut page);
        page
    }

    #[test]
    fn fresh_header_round_trips() {
        let header = DbHeader::new();
        let page = header_page(&header);

        let parsed = DbHeader::parse(&page).unwrap();
        assert_eq!(parsed.version(), FORMAT_VERSION);
        assert_eq!(parsed.page_size() as usize, PAGE_SIZE);
        assert_eq!(parsed.page_count(), 2);
        assert_eq!(parsed.schema_root(), INVALID_PAGE_ID);
        assert_eq!(parsed.txn_id(), 1);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let header = DbHeader::new();
        let mut page = header_page(&header);
        page[0] = b'X';

        let err = DbHeader::parse(&page).unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::Corrupt);
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut header = DbHeader::new();
        header.version = U32::new(FORMAT_VERSION + 1);
        header.refresh_checksum();

        let err = DbHeader::parse(&header_page(&header)).unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::Corrupt);
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let mut header = DbHeader::new();
        header.set_txn_id(42);
        header.refresh_checksum();
        let mut page = header_page(&header);
        page[56] ^= 0x01;

        let err = DbHeader::parse(&page).unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::Corrupt);
    }

    #[test]
    fn wrong_page_size_is_mismatch() {
        let mut header = DbHeader::new();
        header.page_size = U32::new(4096);
        header.refresh_checksum();

        let err = DbHeader::parse(&header_page(&header)).unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::Mismatch);
    }

    #[test]
    fn mutators_survive_reserialization() {
        let mut header = DbHeader::new();
        header.set_page_count(9);
        header.set_freelist_head(5);
        header.set_freelist_count(3);
        header.set_schema_root(1);
        header.set_txn_id(77);
        header.refresh_checksum();

        let parsed = DbHeader::parse(&header_page(&header)).unwrap();
        assert_eq!(parsed.page_count(), 9);
        assert_eq!(parsed.freelist_head(), 5);
        assert_eq!(parsed.freelist_count(), 3);
        assert_eq!(parsed.schema_root(), 1);
        assert_eq!(parsed.txn_id(), 77);
    }
}
