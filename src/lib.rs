//! # SpeedSQL - Embedded Single-File SQL Database
//!
//! SpeedSQL is an embedded SQL engine over one persistent,
//! transactionally safe, optionally encrypted disk file. It pairs a
//! paged storage manager with a B+tree keyed store and drives both from
//! a small SQL pipeline with prepared statements.
//!
//! ## Quick Start
//!
//! ```ignore
//! use speedsql::Database;
//!
//! let db = Database::open("app.db")?;
//! db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", None)?;
//! db.exec("INSERT INTO users VALUES (1, 'Alice')", None)?;
//!
//! let (stmt, _) = db.prepare("SELECT name FROM users WHERE id = ?")?;
//! let mut stmt = stmt.unwrap();
//! stmt.bind_int64(1, 1)?;
//! while stmt.step()? == speedsql::StepResult::Row {
//!     println!("{:?}", stmt.column_text(0));
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------+
//! |       Connection (Database)          |
//! +--------------------------------------+
//! |  SQL: lexer -> parser -> executor    |
//! +-------------------+------------------+
//! |  Schema cache     | Txn + savepoints |
//! +-------------------+------------------+
//! |        B+tree (keys -> rows)         |
//! +--------------------------------------+
//! |  Buffer pool (LRU, page encryption)  |
//! +--------------------------------------+
//! |  Paged file + write-ahead log        |
//! +--------------------------------------+
//! ```
//!
//! ## File Layout
//!
//! One 16 KiB-paged database file (header page, reserved schema page,
//! B+tree and free pages), plus an optional `<db>-wal` redo log when the
//! WAL open flag is set. With a cipher installed every page after the
//! header is encrypted with AES-256-GCM or ChaCha20-Poly1305 and
//! authenticated against its page id.
//!
//! ## Module Overview
//!
//! - [`storage`]: file I/O, headers, buffer pool, freelist, WAL
//! - [`btree`]: the ordered key/value store and its cursors
//! - [`crypto`]: cipher providers and key derivation
//! - [`sql`]: lexer, parser, and the statement executor
//! - [`database`]: the connection type tying it all together

pub mod error;

pub mod btree;
pub mod crypto;
pub mod database;
pub mod sql;
pub mod storage;
pub mod types;

pub use crypto::{CipherKind, CryptoConfig, Kdf};
pub use database::Database;
pub use error::{DbError, ErrorCode};
pub use sql::executor::{Statement, StepResult};
pub use storage::OpenFlags;
pub use types::{Value, ValueType};
