//! # Common Page Header
//!
//! Every page starts with the same 32-byte header. Multi-byte fields are
//! little-endian via zerocopy's endian-aware types, so the struct reads
//! directly from page buffers without copying or alignment concerns.
//!
//! ```text
//! Offset  Size  Field       Description
//! ------  ----  ----------  -----------------------------------------
//! 0       1     page_type   Free / BtreeInternal / BtreeLeaf / ...
//! 1       1     flags       Page flags
//! 2       2     cell_count  Number of cells in the page
//! 4       4     free_start  First byte of free space
//! 8       4     free_end    One past the last byte of free space
//! 12      8     right_ptr   Right sibling / overflow / freelist next
//! 20      8     txn_id      Last modifying transaction
//! 28      4     checksum    CRC32 of the page payload
//! ```

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

pub const PAGE_HEADER_SIZE: usize = 32;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Free = 0,
    BtreeInternal = 1,
    BtreeLeaf = 2,
    Overflow = 3,
    Freelist = 4,
    Schema = 5,
    Wal = 6,
}

impl PageType {
    pub fn from_byte(b: u8) -> Option<PageType> {
        match b {
            0 => Some(PageType::Free),
            1 => Some(PageType::BtreeInternal),
            2 => Some(PageType::BtreeLeaf),
            3 => Some(PageType::Overflow),
            4 => Some(PageType::Freelist),
            5 => Some(PageType::Schema),
            6 => Some(PageType::Wal),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    page_type: u8,
    flags: u8,
    cell_count: U16,
    free_start: U32,
    free_end: U32,
    right_ptr: U64,
    txn_id: U64,
    checksum: U32,
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    pub fn init(data: &mut [u8], page_type: PageType) -> Result<&mut PageHeader> {
        let header = Self::from_bytes_mut(data)?;
        header.page_type = page_type as u8;
        header.flags = 0;
        header.cell_count = U16::new(0);
        header.free_start = U32::new(PAGE_HEADER_SIZE as u32);
        header.free_end = U32::new(PAGE_SIZE as u32);
        header.right_ptr = U64::new(INVALID_PAGE_ID);
        header.txn_id = U64::new(0);
        header.checksum = U32::new(0);
        Ok(header)
    }

    pub fn from_bytes(data: &[u8]) -> Result<&PageHeader> {
        super::parse_zerocopy(data, "PageHeader")
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut PageHeader> {
        super::parse_zerocopy_mut(data, "PageHeader")
    }

    pub fn page_type(&self) -> Option<PageType> {
        PageType::from_byte(self.page_type)
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        self.page_type = page_type as u8;
    }

    pub fn cell_count(&self) -> u16 {
        self.cell_count.get()
    }

    pub fn set_cell_count(&mut self, count: u16) {
        self.cell_count = U16::new(count);
    }

    pub fn free_start(&self) -> u32 {
        self.free_start.get()
    }

    pub fn set_free_start(&mut self, offset: u32) {
        self.free_start = U32::new(offset);
    }

    pub fn free_end(&self) -> u32 {
        self.free_end.get()
    }

    pub fn set_free_end(&mut self, offset: u32) {
        self.free_end = U32::new(offset);
    }

    pub fn free_space(&self) -> u32 {
        self.free_end.get().saturating_sub(self.free_start.get())
    }

    pub fn right_ptr(&self) -> PageId {
        self.right_ptr.get()
    }

    pub fn set_right_ptr(&mut self, page_id: PageId) {
        self.right_ptr = U64::new(page_id);
    }

    pub fn txn_id(&self) -> u64 {
        self.txn_id.get()
    }

    pub fn set_txn_id(&mut self, txn: u64) {
        self.txn_id = U64::new(txn);
    }
}

/// Sanity checks a page image. A fully zeroed page is a valid fresh page.
pub fn validate_page(data: &[u8]) -> Result<()> {
    ensure!(
        data.len() == PAGE_SIZE,
        "invalid page size: {} != {}",
        data.len(),
        PAGE_SIZE
    );

    let header = PageHeader::from_bytes(data)?;

    let zeroed = header.page_type == 0
        && header.cell_count() == 0
        && header.free_start() == 0
        && header.free_end() == 0;
    if zeroed {
        return Ok(());
    }

    ensure!(
        header.page_type().is_some(),
        "invalid page type: {:#04x}",
        header.page_type
    );
    ensure!(
        header.free_start() >= PAGE_HEADER_SIZE as u32,
        "free_start {} overlaps page header",
        header.free_start()
    );
    ensure!(
        header.free_end() <= PAGE_SIZE as u32,
        "free_end {} beyond page end",
        header.free_end()
    );
    ensure!(
        header.free_start() <= header.free_end(),
        "free_start {} > free_end {}",
        header.free_start(),
        header.free_end()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_32_bytes() {
        assert_eq!(std::mem::size_of::<PageHeader>(), 32);
    }

    #[test]
    fn init_sets_fresh_leaf_defaults() {
        let mut data = [0u8; PAGE_SIZE];
        let header = PageHeader::init(&mut data, PageType::BtreeLeaf).unwrap();

        assert_eq!(header.page_type(), Some(PageType::BtreeLeaf));
        assert_eq!(header.cell_count(), 0);
        assert_eq!(header.free_start(), PAGE_HEADER_SIZE as u32);
        assert_eq!(header.free_end(), PAGE_SIZE as u32);
        assert_eq!(header.right_ptr(), INVALID_PAGE_ID);
    }

    #[test]
    fn fields_are_little_endian_on_disk() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let header = PageHeader::init(&mut data, PageType::BtreeInternal).unwrap();
            header.set_cell_count(0x0102);
            header.set_right_ptr(0x0A0B0C0D);
        }
        assert_eq!(data[2], 0x02);
        assert_eq!(data[3], 0x01);
        assert_eq!(data[12], 0x0D);
        assert_eq!(data[13], 0x0C);
    }

    #[test]
    fn validate_accepts_zeroed_page() {
        let data = [0u8; PAGE_SIZE];
        assert!(validate_page(&data).is_ok());
    }

    #[test]
    fn validate_rejects_bad_type_and_bounds() {
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0x7F;
        data[4] = 1; // non-zero free_start so it is not "zeroed"
        assert!(validate_page(&data).is_err());

        let mut data = [0u8; PAGE_SIZE];
        PageHeader::init(&mut data, PageType::BtreeLeaf).unwrap();
        {
            let header = PageHeader::from_bytes_mut(&mut data).unwrap();
            header.set_free_start(8);
        }
        assert!(validate_page(&data).is_err());
    }

    #[test]
    fn validate_rejects_wrong_length() {
        assert!(validate_page(&[0u8; 64]).is_err());
    }
}
