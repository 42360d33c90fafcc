//! # Write-Ahead Log
//!
//! Durable redo log for committed transactions. Records are appended to a
//! 64 KiB in-memory buffer; writing a commit record forces the buffer to
//! the file and syncs it, so a successful commit is on stable storage
//! before control returns. Everything else may sit in the buffer until a
//! commit or an explicit flush.
//!
//! ## File Layout
//!
//! ```text
//! [WalHeader: 64 bytes]
//!   magic u32 LE = 0x57414C31 ("WAL1")    version u32 LE = 1
//!   current LSN u64 LE                    checkpoint LSN u64 LE
//!   page size u32 LE                      CRC32 u32 LE of bytes [0..28)
//!   32 reserved zero bytes
//! [Record]*
//!   header { lsn u64, txn u64, type u8, 3 reserved, page id u64,
//!            data len u32 }
//!   payload (page records: before image then after image)
//!   CRC32 u32 LE over header and payload
//! ```
//!
//! Page images are stored in their on-disk (possibly encrypted) form, so
//! recovery can replay them without any key material: the after-image is
//! copied verbatim to `page_id * data_len` in the database file.
//!
//! ## Recovery
//!
//! Two passes over the record stream. The first classifies every
//! transaction id as committed, rolled back, or in flight. The second
//! writes the after-image of each page record belonging to a committed
//! transaction back into the database file, then syncs it and advances
//! the checkpoint LSN. A record that is truncated or fails its CRC stops
//! the scan; everything before it is replayed, later bytes are discarded
//! by the next append.
//!
//! ## Savepoints
//!
//! Savepoint records are named LSN markers: `savepoint` returns the LSN
//! its record was placed at, and that LSN is what `rollback_to` carries
//! back. The connection, not the log, owns savepoint semantics.

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{db_err, ErrorCode};

use super::{crc32, DbFile, OpenFlags, PageId, INVALID_PAGE_ID, PAGE_SIZE};

pub const WAL_MAGIC: u32 = 0x5741_4C31; // "WAL1"
pub const WAL_VERSION: u32 = 1;
pub const WAL_HEADER_SIZE: usize = 64;
const WAL_BUFFER_SIZE: usize = 64 * 1024;
const RECORD_HEADER_SIZE: usize = 32;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalRecordType {
    Begin = 1,
    Commit = 2,
    Rollback = 3,
    Page = 4,
    Checkpoint = 5,
    Savepoint = 6,
    Release = 7,
    RollbackTo = 8,
}

impl WalRecordType {
    fn from_byte(b: u8) -> Option<WalRecordType> {
        match b {
            1 => Some(WalRecordType::Begin),
            2 => Some(WalRecordType::Commit),
            3 => Some(WalRecordType::Rollback),
            4 => Some(WalRecordType::Page),
            5 => Some(WalRecordType::Checkpoint),
            6 => Some(WalRecordType::Savepoint),
            7 => Some(WalRecordType::Release),
            8 => Some(WalRecordType::RollbackTo),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct WalHeader {
    magic: U32,
    version: U32,
    lsn: U64,
    checkpoint_lsn: U64,
    page_size: U32,
    checksum: U32,
    reserved: [u8; 32],
}

const _: () = assert!(std::mem::size_of::<WalHeader>() == WAL_HEADER_SIZE);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct WalRecordHeader {
    lsn: U64,
    txn_id: U64,
    rec_type: u8,
    reserved: [u8; 3],
    page_id: U64,
    data_len: U32,
}

const _: () = assert!(std::mem::size_of::<WalRecordHeader>() == RECORD_HEADER_SIZE);

/// The log. Callers serialize access externally (the connection keeps the
/// WAL behind its own mutex).
#[derive(Debug)]
pub struct Wal {
    file: DbFile,
    current_lsn: u64,
    checkpoint_lsn: u64,
    buffer: Vec<u8>,
    append_pos: u64,
}

impl Wal {
    /// Opens or creates the log at `path`.
    pub fn open(path: &std::path::Path) -> Result<Wal> {
        let file = DbFile::open(path, OpenFlags::READ_WRITE | OpenFlags::CREATE)
            .wrap_err_with(|| format!("opening WAL at {}", path.display()))?;

        let size = file.size()?;
        let mut wal = Wal {
            file,
            current_lsn: 1,
            checkpoint_lsn: 0,
            buffer: Vec::with_capacity(WAL_BUFFER_SIZE),
            append_pos: WAL_HEADER_SIZE as u64,
        };

        if size == 0 {
            wal.write_header()?;
        } else if size >= WAL_HEADER_SIZE as u64 {
            wal.read_header()?;
            wal.append_pos = size.max(WAL_HEADER_SIZE as u64);
        } else {
            return Err(db_err(ErrorCode::Corrupt, "WAL file smaller than header"));
        }

        Ok(wal)
    }

    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    pub fn checkpoint_lsn(&self) -> u64 {
        self.checkpoint_lsn
    }

    pub fn begin(&mut self, txn: u64) -> Result<u64> {
        self.append(WalRecordType::Begin, txn, INVALID_PAGE_ID, &[], &[])
    }

    /// Logs a page modification. Both images must be in on-disk form and of
    /// equal length.
    pub fn write_page(
        &mut self,
        txn: u64,
        page_id: PageId,
        before: &[u8],
        after: &[u8],
    ) -> Result<u64> {
        if before.len() != after.len() {
            return Err(db_err(ErrorCode::Misuse, "WAL image length mismatch"));
        }
        self.append(WalRecordType::Page, txn, page_id, before, after)
    }

    /// Commit record: forces the buffer out and syncs the file.
    pub fn commit(&mut self, txn: u64) -> Result<u64> {
        let lsn = self.append(WalRecordType::Commit, txn, INVALID_PAGE_ID, &[], &[])?;
        self.flush()?;
        Ok(lsn)
    }

    pub fn rollback(&mut self, txn: u64) -> Result<u64> {
        let lsn = self.append(WalRecordType::Rollback, txn, INVALID_PAGE_ID, &[], &[])?;
        self.flush()?;
        Ok(lsn)
    }

    /// Places a savepoint marker and returns its LSN.
    pub fn savepoint(&mut self, txn: u64) -> Result<u64> {
        self.append(WalRecordType::Savepoint, txn, INVALID_PAGE_ID, &[], &[])
    }

    pub fn release(&mut self, txn: u64) -> Result<u64> {
        self.append(WalRecordType::Release, txn, INVALID_PAGE_ID, &[], &[])
    }

    /// Marks a rollback to the savepoint placed at `savepoint_lsn`. The
    /// connection restores its own counters; the log only keeps the trace.
    pub fn rollback_to(&mut self, txn: u64, savepoint_lsn: u64) -> Result<u64> {
        self.append(
            WalRecordType::RollbackTo,
            txn,
            savepoint_lsn, // marker LSN rides in the page-id slot
            &[],
            &[],
        )
    }

    /// Writes buffered records to the file and syncs.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file
            .write_all_at(self.append_pos, &self.buffer)
            .wrap_err("flushing WAL buffer")?;
        self.append_pos += self.buffer.len() as u64;
        self.buffer.clear();
        self.file.sync()
    }

    /// Flushes, stamps a checkpoint record, persists the header, and
    /// truncates the log back to just the header. The caller is
    /// responsible for flushing the buffer pool first.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.flush()?;

        let lsn = self.append(WalRecordType::Checkpoint, 0, INVALID_PAGE_ID, &[], &[])?;
        self.flush()?;

        self.checkpoint_lsn = lsn;
        self.file.truncate(WAL_HEADER_SIZE as u64)?;
        self.append_pos = WAL_HEADER_SIZE as u64;
        self.current_lsn = self.checkpoint_lsn + 1;
        self.write_header()
    }

    /// Persists the header; called on close and after recovery.
    pub fn write_header(&mut self) -> Result<()> {
        let mut header = WalHeader {
            magic: U32::new(WAL_MAGIC),
            version: U32::new(WAL_VERSION),
            lsn: U64::new(self.current_lsn),
            checkpoint_lsn: U64::new(self.checkpoint_lsn),
            page_size: U32::new(PAGE_SIZE as u32),
            checksum: U32::new(0),
            reserved: [0u8; 32],
        };
        let image = header.as_bytes().to_vec();
        header.checksum = U32::new(crc32(&image[..28]));

        self.file.write_all_at(0, header.as_bytes())?;
        self.file.sync()
    }

    fn read_header(&mut self) -> Result<()> {
        let mut bytes = [0u8; WAL_HEADER_SIZE];
        self.file.read_exact_at(0, &mut bytes)?;

        let header = WalHeader::read_from_bytes(&bytes)
            .map_err(|_| db_err(ErrorCode::Corrupt, "unreadable WAL header"))?;

        if header.magic.get() != WAL_MAGIC {
            return Err(db_err(ErrorCode::Corrupt, "bad WAL magic"));
        }
        if header.version.get() > WAL_VERSION {
            return Err(db_err(
                ErrorCode::Corrupt,
                format!("WAL version {} not supported", header.version.get()),
            ));
        }
        if header.checksum.get() != crc32(&bytes[..28]) {
            return Err(db_err(ErrorCode::Corrupt, "WAL header checksum mismatch"));
        }

        self.current_lsn = header.lsn.get();
        self.checkpoint_lsn = header.checkpoint_lsn.get();
        Ok(())
    }

    fn append(
        &mut self,
        rec_type: WalRecordType,
        txn: u64,
        page_id: PageId,
        before: &[u8],
        after: &[u8],
    ) -> Result<u64> {
        let lsn = self.current_lsn;
        self.current_lsn += 1;

        let header = WalRecordHeader {
            lsn: U64::new(lsn),
            txn_id: U64::new(txn),
            rec_type: rec_type as u8,
            reserved: [0u8; 3],
            page_id: U64::new(page_id),
            data_len: U32::new(after.len() as u32),
        };

        let record_size = RECORD_HEADER_SIZE + before.len() + after.len() + 4;
        if self.buffer.len() + record_size > WAL_BUFFER_SIZE {
            self.flush()?;
        }

        let start = self.buffer.len();
        self.buffer.extend_from_slice(header.as_bytes());
        self.buffer.extend_from_slice(before);
        self.buffer.extend_from_slice(after);
        let sum = crc32(&self.buffer[start..]);
        self.buffer.extend_from_slice(&sum.to_le_bytes());
        Ok(lsn)
    }

    /// Redo recovery; see the module docs. Returns the number of page
    /// images applied to `db_file`.
    pub fn recover(&mut self, db_file: &DbFile) -> Result<u32> {
        let size = self.file.size()?;
        if size <= WAL_HEADER_SIZE as u64 {
            return Ok(0);
        }

        // First pass: classify transactions.
        #[derive(Default)]
        struct TxnStatus {
            committed: bool,
            rolled_back: bool,
        }
        let mut txns: HashMap<u64, TxnStatus> = HashMap::new();
        let mut max_lsn = self.current_lsn;
        let mut valid_end = WAL_HEADER_SIZE as u64;

        let mut pos = WAL_HEADER_SIZE as u64;
        while let Some((header, record_len)) = self.read_record_header(pos, size)? {
            let status = txns.entry(header.txn_id.get()).or_default();
            match WalRecordType::from_byte(header.rec_type) {
                Some(WalRecordType::Commit) => status.committed = true,
                Some(WalRecordType::Rollback) => status.rolled_back = true,
                _ => {}
            }
            max_lsn = max_lsn.max(header.lsn.get() + 1);
            pos += record_len;
            valid_end = pos;
        }

        // Second pass: redo committed after-images.
        let mut applied = 0u32;
        let mut pos = WAL_HEADER_SIZE as u64;
        while pos < valid_end {
            let (header, record_len) = match self.read_record_header(pos, size)? {
                Some(entry) => entry,
                None => break,
            };

            let is_page = header.rec_type == WalRecordType::Page as u8;
            let committed = txns
                .get(&header.txn_id.get())
                .map(|s| s.committed && !s.rolled_back)
                .unwrap_or(false);

            if is_page && committed && header.page_id.get() != INVALID_PAGE_ID {
                let data_len = header.data_len.get() as u64;
                let after_off = pos + RECORD_HEADER_SIZE as u64 + data_len;
                let mut after = vec![0u8; data_len as usize];
                self.file.read_exact_at(after_off, &mut after)?;
                db_file.write_all_at(header.page_id.get() * data_len, &after)?;
                applied += 1;
            }

            pos += record_len;
        }

        db_file.sync()?;

        self.current_lsn = max_lsn;
        self.checkpoint_lsn = self.current_lsn;
        self.write_header()?;
        self.append_pos = valid_end;

        Ok(applied)
    }

    /// Reads and validates one record header; `None` ends the scan.
    fn read_record_header(&self, pos: u64, size: u64) -> Result<Option<(WalRecordHeader, u64)>> {
        if pos + RECORD_HEADER_SIZE as u64 > size {
            return Ok(None);
        }

        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        self.file.read_exact_at(pos, &mut bytes)?;
        let header = match WalRecordHeader::read_from_bytes(&bytes) {
            Ok(h) => h,
            Err(_) => return Ok(None),
        };

        if header.lsn.get() == 0 || WalRecordType::from_byte(header.rec_type).is_none() {
            return Ok(None);
        }

        let payload = if header.rec_type == WalRecordType::Page as u8 {
            header.data_len.get() as u64 * 2
        } else {
            0
        };
        let record_len = RECORD_HEADER_SIZE as u64 + payload + 4;
        if pos + record_len > size {
            return Ok(None);
        }

        let mut full = vec![0u8; record_len as usize - 4];
        self.file.read_exact_at(pos, &mut full)?;
        let mut stored = [0u8; 4];
        self.file.read_exact_at(pos + record_len - 4, &mut stored)?;
        if u32::from_le_bytes(stored) != crc32(&full) {
            return Ok(None);
        }

        Ok(Some((header, record_len)))
    }
}
