//! # Schema Cache and Persistence
//!
//! Tables and indices live in memory as definitions wrapping their B+tree
//! handles, and persist as a single schema page written on close and read
//! on open.
//!
//! ## Schema Page Layout
//!
//! After the common page header (whose type byte is `Schema`):
//!
//! ```text
//! table_count u16, index_count u16
//! per table:
//!   name_len u16, name bytes
//!   column_count u16, root_page u64, flags u8
//!   per column: name_len u16, name bytes, type u8, flags u8
//! per index:
//!   name_len u16, name bytes
//!   table_name_len u16, table name bytes
//!   column_count u32, root_page u64, flags u8
//!   column indices u32 each
//! ```
//!
//! Serialization is deterministic, so the round trip of any schema image
//! is byte-identical. The whole schema must fit one page; overflow fails
//! with `Full`.

use std::sync::Arc;

use eyre::Result;

use crate::btree::BTree;
use crate::error::{db_err, ErrorCode};
use crate::storage::{PageId, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::types::ValueType;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ValueType,
    pub flags: u8,
}

/// A live table: definition plus its data tree keyed by rowid.
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub flags: u8,
    pub tree: Arc<BTree>,
}

impl TableDef {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// A live secondary index over one table.
pub struct IndexDef {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<u32>,
    pub flags: u8,
    pub tree: Arc<BTree>,
}

impl IndexDef {
    pub fn is_unique(&self) -> bool {
        self.flags & crate::types::index_flags::UNIQUE != 0
    }
}

/// The connection's schema cache, guarded by the schema RwLock upstream.
#[derive(Default)]
pub struct Schema {
    pub tables: Vec<Arc<TableDef>>,
    pub indices: Vec<IndexDef>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&Arc<TableDef>> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.indices.is_empty()
    }

    pub fn to_image(&self) -> SchemaImage {
        SchemaImage {
            tables: self
                .tables
                .iter()
                .map(|t| SchemaTable {
                    name: t.name.clone(),
                    columns: t.columns.clone(),
                    root_page: t.tree.root_page(),
                    flags: t.flags,
                })
                .collect(),
            indices: self
                .indices
                .iter()
                .map(|i| SchemaIndex {
                    name: i.name.clone(),
                    table_name: i.table_name.clone(),
                    columns: i.columns.clone(),
                    root_page: i.tree.root_page(),
                    flags: i.flags,
                })
                .collect(),
        }
    }
}

/// Detached schema form: root page ids instead of live tree handles.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaImage {
    pub tables: Vec<SchemaTable>,
    pub indices: Vec<SchemaIndex>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub root_page: PageId,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaIndex {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<u32>,
    pub root_page: PageId,
    pub flags: u8,
}

impl SchemaImage {
    /// Serializes into the payload written after the page header.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.tables.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.indices.len() as u16).to_le_bytes());

        for table in &self.tables {
            write_name(&mut out, &table.name)?;
            out.extend_from_slice(&(table.columns.len() as u16).to_le_bytes());
            out.extend_from_slice(&table.root_page.to_le_bytes());
            out.push(table.flags);
            for column in &table.columns {
                write_name(&mut out, &column.name)?;
                out.push(column.col_type as u8);
                out.push(column.flags);
            }
        }

        for index in &self.indices {
            write_name(&mut out, &index.name)?;
            write_name(&mut out, &index.table_name)?;
            out.extend_from_slice(&(index.columns.len() as u32).to_le_bytes());
            out.extend_from_slice(&index.root_page.to_le_bytes());
            out.push(index.flags);
            for &col in &index.columns {
                out.extend_from_slice(&col.to_le_bytes());
            }
        }

        if out.len() > PAGE_SIZE - PAGE_HEADER_SIZE {
            return Err(db_err(
                ErrorCode::Full,
                format!("schema of {} bytes exceeds the schema page", out.len()),
            ));
        }
        Ok(out)
    }

    pub fn parse(payload: &[u8]) -> Result<SchemaImage> {
        let mut r = SchemaReader { bytes: payload, pos: 0 };
        let table_count = r.u16()? as usize;
        let index_count = r.u16()? as usize;

        let mut tables = Vec::with_capacity(table_count);
        for _ in 0..table_count {
            let name = r.name()?;
            let column_count = r.u16()? as usize;
            let root_page = r.u64()?;
            let flags = r.u8()?;
            let mut columns = Vec::with_capacity(column_count);
            for _ in 0..column_count {
                let col_name = r.name()?;
                let type_byte = r.u8()?;
                let col_type = ValueType::from_byte(type_byte).ok_or_else(|| {
                    db_err(
                        ErrorCode::Corrupt,
                        format!("unknown column type {} in schema", type_byte),
                    )
                })?;
                let col_flags = r.u8()?;
                columns.push(ColumnDef {
                    name: col_name,
                    col_type,
                    flags: col_flags,
                });
            }
            tables.push(SchemaTable {
                name,
                columns,
                root_page,
                flags,
            });
        }

        let mut indices = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            let name = r.name()?;
            let table_name = r.name()?;
            let column_count = r.u32()? as usize;
            let root_page = r.u64()?;
            let flags = r.u8()?;
            let mut columns = Vec::with_capacity(column_count);
            for _ in 0..column_count {
                columns.push(r.u32()?);
            }
            indices.push(SchemaIndex {
                name,
                table_name,
                columns,
                root_page,
                flags,
            });
        }

        Ok(SchemaImage { tables, indices })
    }
}

fn write_name(out: &mut Vec<u8>, name: &str) -> Result<()> {
    if name.len() > u16::MAX as usize {
        return Err(db_err(ErrorCode::Full, "schema name too long"));
    }
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

struct SchemaReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl SchemaReader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| db_err(ErrorCode::Corrupt, "schema page truncated"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    fn name(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| db_err(ErrorCode::Corrupt, "schema name is not valid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::col_flags;

    fn sample_image() -> SchemaImage {
        SchemaImage {
            tables: vec![
                SchemaTable {
                    name: "users".into(),
                    columns: vec![
                        ColumnDef {
                            name: "id".into(),
                            col_type: ValueType::Int,
                            flags: col_flags::PRIMARY_KEY | col_flags::NOT_NULL,
                        },
                        ColumnDef {
                            name: "name".into(),
                            col_type: ValueType::Text,
                            flags: 0,
                        },
                    ],
                    root_page: 2,
                    flags: 0,
                },
                SchemaTable {
                    name: "events".into(),
                    columns: vec![ColumnDef {
                        name: "payload".into(),
                        col_type: ValueType::Json,
                        flags: 0,
                    }],
                    root_page: 7,
                    flags: 0,
                },
            ],
            indices: vec![SchemaIndex {
                name: "idx_users_name".into(),
                table_name: "users".into(),
                columns: vec![1],
                root_page: 9,
                flags: crate::types::index_flags::UNIQUE,
            }],
        }
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let image = sample_image();
        let first = image.serialize().unwrap();
        let parsed = SchemaImage::parse(&first).unwrap();
        assert_eq!(parsed, image);

        let second = parsed.serialize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_schema_serializes_to_counts_only() {
        let image = SchemaImage {
            tables: vec![],
            indices: vec![],
        };
        let bytes = image.serialize().unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert_eq!(SchemaImage::parse(&bytes).unwrap(), image);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let bytes = sample_image().serialize().unwrap();
        let err = SchemaImage::parse(&bytes[..bytes.len() - 5]).unwrap_err();
        assert_eq!(crate::error::ErrorCode::of(&err), ErrorCode::Corrupt);
    }

    #[test]
    fn unknown_column_type_is_corrupt() {
        let mut bytes = sample_image().serialize().unwrap();
        // First column type byte: counts(4) + name(2+5) + colcount(2) +
        // root(8) + flags(1) + colname(2+2) = 26.
        bytes[26] = 0x99;
        let err = SchemaImage::parse(&bytes).unwrap_err();
        assert_eq!(crate::error::ErrorCode::of(&err), ErrorCode::Corrupt);
    }

    #[test]
    fn oversized_schema_is_full() {
        let image = SchemaImage {
            tables: (0..400)
                .map(|i| SchemaTable {
                    name: format!("table_with_a_rather_long_name_{:04}", i),
                    columns: (0..8)
                        .map(|c| ColumnDef {
                            name: format!("column_number_{:02}", c),
                            col_type: ValueType::Int,
                            flags: 0,
                        })
                        .collect(),
                    root_page: i as u64,
                    flags: 0,
                })
                .collect(),
            indices: vec![],
        };
        let err = image.serialize().unwrap_err();
        assert_eq!(crate::error::ErrorCode::of(&err), ErrorCode::Full);
    }
}
