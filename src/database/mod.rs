//! # Database Connection
//!
//! `Database` owns the file, buffer pool, optional WAL, schema cache,
//! transaction state, savepoint stack, error state and cipher
//! configuration. One connection is meant to be driven by one thread at a
//! time; internal locks only protect the pieces that statements share.
//!
//! ## Open Sequence
//!
//! 1. `:memory:` or an empty path switches to an in-memory backing file.
//! 2. A zero-sized file gets a fresh header (page 1 is reserved for the
//!    schema); otherwise the header is read and validated.
//! 3. The buffer pool is sized at 256 MiB by default.
//! 4. With the WAL open flag, the log at `<path>-wal` is opened and its
//!    recovery pass replays committed pages; failure to open the WAL
//!    downgrades to no WAL rather than failing the open.
//! 5. For a non-fresh file the schema is loaded from the schema page. If
//!    that read fails authentication the load is deferred: the database
//!    is encrypted, and the schema is retried once `key` installs the
//!    cipher.
//!
//! ## Transactions
//!
//! The connection moves between `None`, `Read` and `Write` states. BEGIN
//! enters `Read`; the first write upgrades to `Write`; COMMIT logs every
//! dirty page to the WAL (when enabled), forces the commit record, then
//! flushes the pool. ROLLBACK discards dirty pages. Statements executed
//! outside a transaction auto-commit on completion.
//!
//! Savepoints are named WAL LSN markers with the row-id and change
//! counters captured at creation; ROLLBACK TO restores the counters,
//! discards dirty pages, and pops everything above the marker. Dirty
//! pages are flushed when a savepoint is created so that a later partial
//! rollback only discards work done after the marker.

pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use parking_lot::{Mutex, RwLock};

use crate::btree::BTree;
use crate::crypto::{
    derive_key, provider_for, CipherKind, CryptoConfig,
};
use crate::error::{db_err, DbError, ErrorCode};
use crate::sql::executor::Statement;
use crate::sql::parser::Parser;
use crate::storage::{
    Allocator, BufferPool, DbFile, DbHeader, FreelistState, OpenFlags, PageHeader, PageType, Wal,
    DEFAULT_CACHE_SIZE, INVALID_PAGE_ID, PAGE_HEADER_SIZE, PAGE_SIZE, SCHEMA_PAGE_ID,
};

use schema::{Schema, SchemaImage, TableDef};

const MAX_SAVEPOINTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    None,
    Read,
    Write,
}

struct SavepointEntry {
    name: String,
    wal_lsn: u64,
    saved_rowid: i64,
    saved_changes: i64,
}

struct ConnState {
    txn_state: TxnState,
    current_txn: u64,
    savepoints: Vec<SavepointEntry>,
    last_rowid: i64,
    total_changes: i64,
    changes: i64,
}

struct CryptoState {
    cipher_id: CipherKind,
    encrypted: bool,
    config: CryptoConfig,
}

pub struct Database {
    #[allow(dead_code)]
    path: PathBuf,
    in_memory: bool,
    readonly: bool,
    file: Arc<DbFile>,
    pool: Arc<BufferPool>,
    alloc: Arc<Allocator>,
    wal: Option<Mutex<Wal>>,
    header: Mutex<DbHeader>,
    schema: RwLock<Schema>,
    /// Set when the schema page could not be authenticated at open; the
    /// database needs a key before it is usable.
    schema_pending: Mutex<bool>,
    conn: Mutex<ConnState>,
    crypto: Mutex<CryptoState>,
    last_error: Mutex<(i32, String)>,
}

impl Database {
    /// Opens with read-write/create defaults.
    pub fn open(path: impl AsRef<Path>) -> Result<Database> {
        Self::open_with_flags(path, OpenFlags::default())
    }

    pub fn open_with_flags(path: impl AsRef<Path>, flags: OpenFlags) -> Result<Database> {
        let path = path.as_ref().to_path_buf();
        let name = path.to_string_lossy();
        let in_memory = name.is_empty() || name == ":memory:" || flags.contains(OpenFlags::MEMORY);

        let file = if in_memory {
            Arc::new(DbFile::open_memory())
        } else {
            Arc::new(DbFile::open(&path, flags)?)
        };

        let size = file.size()?;
        let fresh = size == 0;
        let header = if fresh {
            let header = DbHeader::new();
            let mut page = vec![0u8; PAGE_SIZE];
            header.write_to(&mut page);
            file.write_all_at(0, &page)?;
            file.sync()?;
            header
        } else {
            let mut page = vec![0u8; PAGE_SIZE.min(size as usize)];
            file.read_exact_at(0, &mut page)?;
            DbHeader::parse(&page)?
        };

        let pool = Arc::new(BufferPool::new(DEFAULT_CACHE_SIZE, PAGE_SIZE));

        let wal = if flags.contains(OpenFlags::WAL) && !in_memory {
            let wal_path = wal_path_for(&path);
            match Wal::open(&wal_path) {
                Ok(mut wal) => {
                    wal.recover(&file)
                        .wrap_err("replaying write-ahead log at open")?;
                    Some(Mutex::new(wal))
                }
                Err(_) => None, // continue without WAL
            }
        } else {
            None
        };

        let file_pages = file.size()? / PAGE_SIZE as u64;
        let page_count = header.page_count().max(file_pages).max(2);
        let alloc = Arc::new(Allocator::new(
            Arc::clone(&pool),
            Arc::clone(&file),
            page_count,
            FreelistState {
                head: header.freelist_head(),
                count: header.freelist_count(),
            },
        ));

        let db = Database {
            path,
            in_memory,
            readonly: flags.contains(OpenFlags::READ_ONLY),
            file,
            pool,
            alloc,
            wal,
            header: Mutex::new(header),
            schema: RwLock::new(Schema::default()),
            schema_pending: Mutex::new(false),
            conn: Mutex::new(ConnState {
                txn_state: TxnState::None,
                current_txn: 0,
                savepoints: Vec::new(),
                last_rowid: 0,
                total_changes: 0,
                changes: 0,
            }),
            crypto: Mutex::new(CryptoState {
                cipher_id: CipherKind::None,
                encrypted: false,
                config: CryptoConfig::default(),
            }),
            last_error: Mutex::new((ErrorCode::Ok.as_i32(), String::new())),
        };

        if !fresh {
            match db.load_schema() {
                Ok(()) => db.seed_rowid_counter()?,
                Err(e) if ErrorCode::of(&e) == ErrorCode::Corrupt => {
                    // Likely an encrypted database; retried after key().
                    *db.schema_pending.lock() = true;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(db)
    }

    /// Seeds the connection row-id counter past every persisted row so new
    /// inserts never collide with existing keys.
    fn seed_rowid_counter(&self) -> Result<()> {
        let mut max_rowid = 0i64;
        {
            let schema = self.schema.read();
            for table in &schema.tables {
                if let Some(key) = table.tree.last_key()? {
                    max_rowid = max_rowid.max(crate::sql::executor::rowid_from_key(&key));
                }
            }
        }
        let mut conn = self.conn.lock();
        conn.last_rowid = conn.last_rowid.max(max_rowid);
        Ok(())
    }

    /// Flushes state and persists the schema. Dropping the connection
    /// without calling this loses only the schema of DDL issued since the
    /// last close, never committed row data.
    pub fn close(self) -> Result<()> {
        self.flush_for_close()
    }

    fn flush_for_close(&self) -> Result<()> {
        if self.readonly {
            return Ok(());
        }
        self.save_schema()?;
        self.pool.flush(&self.file)?;
        self.save_header()?;
        if let Some(wal) = &self.wal {
            wal.lock().write_header()?;
        }
        Ok(())
    }

    // --- SQL entry points -------------------------------------------------

    /// Prepares the first statement in `sql`. Returns the statement (or
    /// `None` for empty input) and the byte offset of the remaining tail.
    pub fn prepare<'db>(&'db self, sql: &str) -> Result<(Option<Statement<'db>>, usize)> {
        let result = (|| {
            let mut parser = Parser::new(sql);
            let parsed = parser.parse_statement()?;
            let tail = parser.tail_offset();
            match parsed {
                Some(parsed) => {
                    let stmt = Statement::new(self, sql.to_string(), parsed);
                    Ok((Some(stmt), tail))
                }
                None => Ok((None, tail)),
            }
        })();
        self.note_result(&result);
        result
    }

    /// Executes every statement in `sql`, invoking `callback` for each
    /// result row. Stops at the first error.
    pub fn exec(
        &self,
        sql: &str,
        mut callback: Option<&mut dyn FnMut(&[String], &[Option<String>]) -> bool>,
    ) -> Result<()> {
        let mut rest = sql;
        loop {
            let trimmed = rest.trim_start();
            if trimmed.is_empty() {
                return Ok(());
            }

            let (stmt, tail) = self.prepare(trimmed)?;
            let consumed = tail;
            if let Some(mut stmt) = stmt {
                loop {
                    match stmt.step() {
                        Ok(crate::sql::executor::StepResult::Row) => {
                            if let Some(cb) = callback.as_mut() {
                                let names: Vec<String> = (0..stmt.column_count())
                                    .map(|i| stmt.column_name(i).unwrap_or_default().to_string())
                                    .collect();
                                let values: Vec<Option<String>> = (0..stmt.column_count())
                                    .map(|i| stmt.column_text(i))
                                    .collect();
                                if !cb(&names, &values) {
                                    return Err(db_err(ErrorCode::Error, "exec aborted by callback"));
                                }
                            }
                        }
                        Ok(crate::sql::executor::StepResult::Done) => break,
                        Err(e) => return Err(e),
                    }
                }
            }
            rest = &trimmed[consumed..];
        }
    }

    // --- transactions -----------------------------------------------------

    /// Enters a transaction; fails with `Misuse` when one is active.
    pub fn begin(&self) -> Result<()> {
        let result = self.begin_inner();
        self.note_result(&result);
        result
    }

    fn begin_inner(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        if conn.txn_state != TxnState::None {
            return Err(db_err(ErrorCode::Misuse, "transaction already in progress"));
        }

        let txn = {
            let mut header = self.header.lock();
            let txn = header.txn_id() + 1;
            header.set_txn_id(txn);
            txn
        };

        if let Some(wal) = &self.wal {
            wal.lock().begin(txn)?;
        }

        conn.current_txn = txn;
        conn.txn_state = TxnState::Read;
        conn.savepoints.clear();
        Ok(())
    }

    /// Commits; a no-op outside a transaction.
    pub fn commit(&self) -> Result<()> {
        let result = self.commit_inner();
        self.note_result(&result);
        result
    }

    fn commit_inner(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        if conn.txn_state == TxnState::None {
            return Ok(());
        }

        if conn.txn_state == TxnState::Write {
            self.log_and_flush(conn.current_txn)?;
        }

        conn.txn_state = TxnState::None;
        conn.current_txn = 0;
        conn.savepoints.clear();
        Ok(())
    }

    /// Rolls back; a no-op outside a transaction. Dirty pages are dropped
    /// without being written.
    pub fn rollback(&self) -> Result<()> {
        let result = self.rollback_inner();
        self.note_result(&result);
        result
    }

    fn rollback_inner(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        if conn.txn_state == TxnState::None {
            return Ok(());
        }

        if conn.txn_state == TxnState::Write {
            if let Some(wal) = &self.wal {
                wal.lock().rollback(conn.current_txn)?;
            }
            self.pool.invalidate_dirty();
        }

        conn.txn_state = TxnState::None;
        conn.current_txn = 0;
        conn.savepoints.clear();
        Ok(())
    }

    /// Creates a named savepoint inside the active transaction.
    pub fn savepoint(&self, name: &str) -> Result<()> {
        let result = self.savepoint_inner(name);
        self.note_result(&result);
        result
    }

    fn savepoint_inner(&self, name: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        if conn.txn_state == TxnState::None {
            return Err(db_err(ErrorCode::Misuse, "savepoint outside a transaction"));
        }
        if conn.savepoints.iter().any(|s| s.name == name) {
            return Err(db_err(
                ErrorCode::Constraint,
                format!("savepoint '{}' already exists", name),
            ));
        }
        if conn.savepoints.len() >= MAX_SAVEPOINTS {
            return Err(db_err(ErrorCode::Full, "savepoint stack exhausted"));
        }

        // Settle current work on disk so a later partial rollback only
        // discards what happened after this marker.
        self.pool.flush(&self.file)?;

        let wal_lsn = match &self.wal {
            Some(wal) => wal.lock().savepoint(conn.current_txn)?,
            None => 0,
        };

        let entry = SavepointEntry {
            name: name.to_string(),
            wal_lsn,
            saved_rowid: conn.last_rowid,
            saved_changes: conn.total_changes,
        };
        conn.savepoints.push(entry);
        Ok(())
    }

    /// Releases a savepoint and everything nested inside it.
    pub fn release(&self, name: &str) -> Result<()> {
        let result = self.release_inner(name);
        self.note_result(&result);
        result
    }

    fn release_inner(&self, name: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        if conn.txn_state == TxnState::None {
            return Err(db_err(ErrorCode::Misuse, "release outside a transaction"));
        }
        let idx = conn
            .savepoints
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| {
                db_err(ErrorCode::NotFound, format!("no savepoint named '{}'", name))
            })?;

        conn.savepoints.truncate(idx);
        if let Some(wal) = &self.wal {
            wal.lock().release(conn.current_txn)?;
        }
        Ok(())
    }

    /// Rolls back to a savepoint: discards dirty pages, restores the
    /// row-id and change counters captured at the marker, and pops the
    /// markers above it. The named savepoint itself survives.
    pub fn rollback_to(&self, name: &str) -> Result<()> {
        let result = self.rollback_to_inner(name);
        self.note_result(&result);
        result
    }

    fn rollback_to_inner(&self, name: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        if conn.txn_state == TxnState::None {
            return Err(db_err(ErrorCode::Misuse, "rollback to savepoint outside a transaction"));
        }
        let idx = conn
            .savepoints
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| {
                db_err(ErrorCode::NotFound, format!("no savepoint named '{}'", name))
            })?;

        self.pool.invalidate_dirty();

        let (lsn, saved_rowid, saved_changes) = {
            let entry = &conn.savepoints[idx];
            (entry.wal_lsn, entry.saved_rowid, entry.saved_changes)
        };
        conn.last_rowid = saved_rowid;
        conn.total_changes = saved_changes;
        conn.savepoints.truncate(idx + 1);

        if let Some(wal) = &self.wal {
            wal.lock().rollback_to(conn.current_txn, lsn)?;
        }
        Ok(())
    }

    /// Flushes the WAL and pool and truncates the log back to its header.
    pub fn checkpoint(&self) -> Result<()> {
        let Some(wal) = &self.wal else {
            return Err(db_err(ErrorCode::Misuse, "checkpoint without a WAL"));
        };
        let mut wal = wal.lock();
        wal.flush()?;
        self.pool.flush(&self.file)?;
        wal.checkpoint()
    }

    // --- encryption -------------------------------------------------------

    /// Installs a password-derived key with the default configuration
    /// (AES-256-GCM, PBKDF2-SHA256, 100 000 iterations).
    pub fn key(&self, password: &[u8]) -> Result<()> {
        self.key_v2(password, CryptoConfig::default())
    }

    /// Installs a key with an explicit configuration. On an already
    /// populated plaintext database every live page is re-encrypted.
    pub fn key_v2(&self, password: &[u8], config: CryptoConfig) -> Result<()> {
        let result = self.key_inner(password, config);
        self.note_result(&result);
        result
    }

    fn key_inner(&self, password: &[u8], config: CryptoConfig) -> Result<()> {
        self.require_idle()?;

        let provider = provider_for(config.cipher)?;
        provider.self_test()?;
        let key = derive_key(password, &config, provider.key_size())?;
        let ctx = provider.init(&key)?;

        let pending = *self.schema_pending.lock();
        if pending {
            // Unlock path: the database is already encrypted on disk.
            self.pool
                .set_encryption(Some((ctx, config.cipher, provider.tag_size())));
            {
                let mut crypto = self.crypto.lock();
                crypto.cipher_id = config.cipher;
                crypto.encrypted = true;
                crypto.config = config;
            }
            self.load_schema()
                .wrap_err("unlocking database with the supplied key")?;
            *self.schema_pending.lock() = false;
            self.seed_rowid_counter()?;
            return Ok(());
        }

        // Encrypt path: rewrite live pages under the new cipher.
        self.recrypt(Some((ctx, config.cipher, provider.tag_size())))?;
        let mut crypto = self.crypto.lock();
        crypto.cipher_id = config.cipher;
        crypto.encrypted = true;
        crypto.config = config;
        Ok(())
    }

    /// Re-encrypts the database under a new key derived from `password`
    /// with the current configuration. Only valid when encrypted.
    pub fn rekey(&self, password: &[u8]) -> Result<()> {
        let result = (|| {
            self.require_idle()?;
            let config = {
                let crypto = self.crypto.lock();
                if !crypto.encrypted {
                    return Err(db_err(ErrorCode::Misuse, "rekey on an unencrypted database"));
                }
                crypto.config.clone()
            };
            let provider = provider_for(config.cipher)?;
            let key = derive_key(password, &config, provider.key_size())?;
            let ctx = provider.init(&key)?;
            self.recrypt(Some((ctx, config.cipher, provider.tag_size())))
        })();
        self.note_result(&result);
        result
    }

    /// Decrypts the database back to plaintext pages.
    pub fn remove_encryption(&self) -> Result<()> {
        let result = (|| {
            self.require_idle()?;
            {
                let crypto = self.crypto.lock();
                if !crypto.encrypted {
                    return Ok(());
                }
            }
            self.recrypt(None)?;
            let mut crypto = self.crypto.lock();
            crypto.cipher_id = CipherKind::None;
            crypto.encrypted = false;
            Ok(())
        })();
        self.note_result(&result);
        result
    }

    /// Current cipher and whether the database is encrypted.
    pub fn crypto_status(&self) -> (CipherKind, bool) {
        let crypto = self.crypto.lock();
        (crypto.cipher_id, crypto.encrypted)
    }

    /// Rewrites every live page through the pool under `new_cipher`.
    fn recrypt(
        &self,
        new_cipher: Option<(Box<dyn crate::crypto::CipherCtx>, CipherKind, usize)>,
    ) -> Result<()> {
        // Materialize the schema so its page survives the rewrite.
        self.save_schema()?;
        self.pool.flush(&self.file)?;

        // Capture plaintext images of every materialized page. The schema
        // slot is a hole until a schema exists; holes are skipped.
        let page_count = self.alloc.page_count();
        let schema_root = self.header.lock().schema_root();
        let old_disk_size = self.pool.disk_page_size() as u64;
        let file_size = self.file.size()?;
        let mut images: Vec<(u64, Vec<u8>)> = Vec::new();
        for page_id in 1..page_count {
            if page_id == SCHEMA_PAGE_ID && schema_root == INVALID_PAGE_ID {
                continue;
            }
            if (page_id + 1) * old_disk_size > file_size {
                continue; // hole: never written
            }
            let guard = self.pool.get(&self.file, page_id)?;
            images.push((page_id, guard.data().to_vec()));
        }

        self.pool.set_encryption(new_cipher);

        // Rebuild the file: plain header page, then each page in its new
        // on-disk form at the new stride.
        self.file.truncate(0)?;
        {
            let header = self.header.lock();
            let mut page = vec![0u8; PAGE_SIZE];
            header.write_to(&mut page);
            self.file.write_all_at(0, &page)?;
        }
        let new_disk_size = self.pool.disk_page_size() as u64;
        for (page_id, plain) in images {
            let disk = self.pool.disk_image(page_id, &plain)?;
            self.file.write_all_at(page_id * new_disk_size, &disk)?;
        }
        self.file.sync()
    }

    fn require_idle(&self) -> Result<()> {
        let conn = self.conn.lock();
        if conn.txn_state != TxnState::None {
            return Err(db_err(
                ErrorCode::Misuse,
                "key management inside a transaction",
            ));
        }
        Ok(())
    }

    // --- counters and error state ----------------------------------------

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.lock().last_rowid
    }

    pub fn changes(&self) -> i64 {
        self.conn.lock().changes
    }

    pub fn total_changes(&self) -> i64 {
        self.conn.lock().total_changes
    }

    pub fn errcode(&self) -> i32 {
        self.last_error.lock().0
    }

    pub fn errmsg(&self) -> String {
        let guard = self.last_error.lock();
        if guard.1.is_empty() {
            "not an error".to_string()
        } else {
            guard.1.clone()
        }
    }

    pub(crate) fn note_result<T>(&self, result: &Result<T>) {
        let mut guard = self.last_error.lock();
        match result {
            Ok(_) => *guard = (ErrorCode::Ok.as_i32(), String::new()),
            Err(e) => {
                let code = ErrorCode::of(e);
                let message = e
                    .chain()
                    .find_map(|c| c.downcast_ref::<DbError>())
                    .map(|d| d.message.clone())
                    .unwrap_or_else(|| e.to_string());
                *guard = (code.as_i32(), message);
            }
        }
    }

    // --- internals shared with the executor ------------------------------

    pub(crate) fn allocator(&self) -> &Arc<Allocator> {
        &self.alloc
    }

    pub(crate) fn schema_read(&self) -> Result<parking_lot::RwLockReadGuard<'_, Schema>> {
        if *self.schema_pending.lock() {
            return Err(db_err(
                ErrorCode::Corrupt,
                "database is encrypted or corrupt; supply a key",
            ));
        }
        Ok(self.schema.read())
    }

    pub(crate) fn schema_write(&self) -> Result<parking_lot::RwLockWriteGuard<'_, Schema>> {
        if *self.schema_pending.lock() {
            return Err(db_err(
                ErrorCode::Corrupt,
                "database is encrypted or corrupt; supply a key",
            ));
        }
        Ok(self.schema.write())
    }

    pub(crate) fn find_table(&self, name: &str) -> Result<Arc<TableDef>> {
        let schema = self.schema_read()?;
        schema
            .table(name)
            .cloned()
            .ok_or_else(|| db_err(ErrorCode::Error, format!("no such table: {}", name)))
    }

    /// Advances and returns the next row id.
    pub(crate) fn next_rowid(&self) -> i64 {
        let mut conn = self.conn.lock();
        conn.last_rowid += 1;
        conn.last_rowid
    }

    pub(crate) fn add_changes(&self, n: i64) {
        let mut conn = self.conn.lock();
        conn.changes = n;
        conn.total_changes += n;
    }

    /// Marks the connection as writing; upgrades a read transaction.
    pub(crate) fn note_write(&self) -> Result<()> {
        if self.readonly {
            return Err(db_err(ErrorCode::ReadOnly, "write on a read-only database"));
        }
        let mut conn = self.conn.lock();
        if conn.txn_state == TxnState::Read {
            conn.txn_state = TxnState::Write;
        }
        Ok(())
    }

    /// Commits implicitly after a write statement outside a transaction.
    pub(crate) fn autocommit(&self) -> Result<()> {
        let state = self.conn.lock().txn_state;
        if state != TxnState::None {
            return Ok(());
        }

        let txn = {
            let mut header = self.header.lock();
            let txn = header.txn_id() + 1;
            header.set_txn_id(txn);
            txn
        };
        self.log_and_flush(txn)
    }

    /// WAL-logs every dirty page under `txn`, commits the log, flushes the
    /// pool, and persists the header.
    fn log_and_flush(&self, txn: u64) -> Result<()> {
        if let Some(wal) = &self.wal {
            let mut wal = wal.lock();
            let disk_size = self.pool.disk_page_size() as u64;
            let file_size = self.file.size()?;

            for (page_id, plain) in self.pool.dirty_pages() {
                let after = self.pool.disk_image(page_id, &plain)?;
                let mut before = vec![0u8; after.len()];
                if (page_id + 1) * disk_size <= file_size {
                    self.file.read_exact_at(page_id * disk_size, &mut before)?;
                }
                wal.write_page(txn, page_id, &before, &after)?;
            }
            wal.commit(txn)?;
        }

        self.pool.flush(&self.file)?;
        self.save_header()
    }

    fn save_header(&self) -> Result<()> {
        let mut header = self.header.lock();
        let freelist = self.alloc.freelist();
        header.set_page_count(self.alloc.page_count());
        header.set_freelist_head(freelist.head);
        header.set_freelist_count(freelist.count);
        header.refresh_checksum();

        let mut page = vec![0u8; PAGE_SIZE];
        header.write_to(&mut page);
        self.file.write_all_at(0, &page)?;
        self.file.sync()
    }

    fn load_schema(&self) -> Result<()> {
        let root = self.header.lock().schema_root();
        if root == INVALID_PAGE_ID {
            return Ok(());
        }

        let image = {
            let guard = self.pool.get(&self.file, root)?;
            let header = PageHeader::from_bytes(guard.data())?;
            if header.page_type() != Some(PageType::Schema) {
                return Err(db_err(ErrorCode::Corrupt, "schema page has wrong type"));
            }
            SchemaImage::parse(&guard.data()[PAGE_HEADER_SIZE..])?
        };

        let mut schema = Schema::default();
        for table in image.tables {
            let tree = Arc::new(BTree::open(Arc::clone(&self.alloc), table.root_page)?);
            schema.tables.push(Arc::new(TableDef {
                name: table.name,
                columns: table.columns,
                flags: table.flags,
                tree,
            }));
        }
        for index in image.indices {
            let tree = Arc::new(BTree::open(Arc::clone(&self.alloc), index.root_page)?);
            schema.indices.push(schema::IndexDef {
                name: index.name,
                table_name: index.table_name,
                columns: index.columns,
                flags: index.flags,
                tree,
            });
        }

        *self.schema.write() = schema;
        Ok(())
    }

    fn save_schema(&self) -> Result<()> {
        let schema = self.schema.read();
        if schema.is_empty() {
            return Ok(());
        }
        let payload = schema.to_image().serialize()?;
        drop(schema);

        // The reserved schema slot may still be a file hole; never read it.
        let mut guard = self.pool.put_page(&self.file, SCHEMA_PAGE_ID)?;

        let data = guard.data_mut();
        data.fill(0);
        PageHeader::init(data, PageType::Schema)?;
        data[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + payload.len()].copy_from_slice(&payload);
        drop(guard);

        self.header.lock().set_schema_root(SCHEMA_PAGE_ID);
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.flush_for_close();
    }
}

fn wal_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("-wal");
    PathBuf::from(name)
}
