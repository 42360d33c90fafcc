//! # Positioned File I/O
//!
//! Thin wrapper over the platform file handle offering offset-based reads
//! and writes. All I/O is positioned (`read_at`/`write_at` on Unix,
//! `seek_read`/`seek_write` on Windows), so no seek state is shared between
//! callers; a per-handle `RwLock` serializes writes against size changes.
//!
//! `:memory:` databases use the same interface backed by a growable byte
//! buffer, which lets the buffer pool, B+tree and schema layers run
//! unchanged with no file on disk.

use std::fs::{File, OpenOptions};
use std::path::Path;

use eyre::Result;
use parking_lot::RwLock;

use crate::error::{db_err, ErrorCode};

/// Open-flag bits. Stable values, part of the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const READ_ONLY: OpenFlags = OpenFlags(0x01);
    pub const READ_WRITE: OpenFlags = OpenFlags(0x02);
    pub const CREATE: OpenFlags = OpenFlags(0x04);
    pub const MEMORY: OpenFlags = OpenFlags(0x08);
    pub const NO_MUTEX: OpenFlags = OpenFlags(0x10);
    pub const FULL_MUTEX: OpenFlags = OpenFlags(0x20);
    pub const WAL: OpenFlags = OpenFlags(0x40);

    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;
    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        OpenFlags::READ_WRITE | OpenFlags::CREATE
    }
}

#[derive(Debug)]
enum Backing {
    Disk(File),
    Memory(Vec<u8>),
}

/// A database file handle with positioned I/O.
#[derive(Debug)]
pub struct DbFile {
    backing: RwLock<Backing>,
    readonly: bool,
}

impl DbFile {
    pub fn open(path: &Path, flags: OpenFlags) -> Result<DbFile> {
        let readonly = flags.contains(OpenFlags::READ_ONLY);

        let file = OpenOptions::new()
            .read(true)
            .write(!readonly)
            .create(!readonly && flags.contains(OpenFlags::CREATE))
            .open(path)
            .map_err(|e| {
                db_err(
                    ErrorCode::CantOpen,
                    format!("cannot open {}: {}", path.display(), e),
                )
            })?;

        Ok(DbFile {
            backing: RwLock::new(Backing::Disk(file)),
            readonly,
        })
    }

    /// Backing for `:memory:` databases.
    pub fn open_memory() -> DbFile {
        DbFile {
            backing: RwLock::new(Backing::Memory(Vec::new())),
            readonly: false,
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let guard = self.backing.read();
        match &*guard {
            Backing::Disk(file) => read_at(file, offset, buf)
                .map_err(|e| db_err(ErrorCode::IoError, format!("read at {}: {}", offset, e))),
            Backing::Memory(bytes) => {
                let start = offset as usize;
                let end = start + buf.len();
                if end > bytes.len() {
                    return Err(db_err(
                        ErrorCode::IoError,
                        format!("read past end of memory file at {}", offset),
                    ));
                }
                buf.copy_from_slice(&bytes[start..end]);
                Ok(())
            }
        }
    }

    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.readonly {
            return Err(db_err(ErrorCode::ReadOnly, "write on read-only handle"));
        }

        let mut guard = self.backing.write();
        match &mut *guard {
            Backing::Disk(file) => write_at(file, offset, buf)
                .map_err(|e| db_err(ErrorCode::IoError, format!("write at {}: {}", offset, e))),
            Backing::Memory(bytes) => {
                let start = offset as usize;
                let end = start + buf.len();
                if end > bytes.len() {
                    bytes.resize(end, 0);
                }
                bytes[start..end].copy_from_slice(buf);
                Ok(())
            }
        }
    }

    pub fn sync(&self) -> Result<()> {
        let guard = self.backing.read();
        match &*guard {
            Backing::Disk(file) => file
                .sync_all()
                .map_err(|e| db_err(ErrorCode::IoError, format!("fsync: {}", e))),
            Backing::Memory(_) => Ok(()),
        }
    }

    pub fn truncate(&self, size: u64) -> Result<()> {
        if self.readonly {
            return Err(db_err(ErrorCode::ReadOnly, "truncate on read-only handle"));
        }

        let mut guard = self.backing.write();
        match &mut *guard {
            Backing::Disk(file) => file
                .set_len(size)
                .map_err(|e| db_err(ErrorCode::IoError, format!("truncate to {}: {}", size, e))),
            Backing::Memory(bytes) => {
                bytes.resize(size as usize, 0);
                Ok(())
            }
        }
    }

    pub fn size(&self) -> Result<u64> {
        let guard = self.backing.read();
        match &*guard {
            Backing::Disk(file) => Ok(file
                .metadata()
                .map_err(|e| db_err(ErrorCode::IoError, format!("stat: {}", e)))?
                .len()),
            Backing::Memory(bytes) => Ok(bytes.len() as u64),
        }
    }
}

#[cfg(unix)]
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, offset: u64, buf: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut pos = 0;
    while pos < buf.len() {
        let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        pos += n;
    }
    Ok(())
}

#[cfg(windows)]
fn write_at(file: &File, offset: u64, buf: &[u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut pos = 0;
    while pos < buf.len() {
        let n = file.seek_write(&buf[pos..], offset + pos as u64)?;
        pos += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");

        let file = DbFile::open(&path, OpenFlags::default()).unwrap();
        file.write_all_at(100, b"hello").unwrap();
        file.sync().unwrap();

        let mut buf = [0u8; 5];
        file.read_exact_at(100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(file.size().unwrap(), 105);
    }

    #[test]
    fn memory_round_trip() {
        let file = DbFile::open_memory();
        file.write_all_at(0, &[1, 2, 3]).unwrap();
        file.write_all_at(10, &[9]).unwrap();

        let mut buf = [0u8; 3];
        file.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(file.size().unwrap(), 11);
    }

    #[test]
    fn readonly_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        std::fs::write(&path, b"x").unwrap();

        let file = DbFile::open(&path, OpenFlags::READ_ONLY).unwrap();
        let err = file.write_all_at(0, b"y").unwrap_err();
        assert_eq!(crate::error::ErrorCode::of(&err), ErrorCode::ReadOnly);
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");

        let err = DbFile::open(&path, OpenFlags::READ_WRITE).unwrap_err();
        assert_eq!(crate::error::ErrorCode::of(&err), ErrorCode::CantOpen);
    }

    #[test]
    fn truncate_shrinks() {
        let file = DbFile::open_memory();
        file.write_all_at(0, &[0u8; 64]).unwrap();
        file.truncate(16).unwrap();
        assert_eq!(file.size().unwrap(), 16);
    }
}
