//! Chat Store: durable, transactional persistence of chat groups, members,
//! messages, reactions and read cursors.
//!
//! The SQLite backend keeps one writer connection behind an async mutex and a
//! small pool of read-only connections (WAL mode). Every mutation runs inside
//! a [`StoreTx`]; dropping an unfinished transaction rolls it back.

pub mod migrations;
pub mod models;
pub mod queries;
pub mod sqlite;
pub mod store;
pub mod timefmt;

pub use sqlite::SqliteStore;
pub use store::{ChatStore, StoreError, StoreTx};

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

pub const DEFAULT_READER_POOL_SIZE: usize = 4;

pub struct Database {
    writer: Arc<tokio::sync::Mutex<Connection>>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    /// Open (or create) a database file with `reader_pool_size` read-only
    /// connections next to the writer.
    pub fn open(path: &Path, reader_pool_size: usize) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(std::time::Duration::from_secs(5))?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(reader_pool_size);
        for _ in 0..reader_pool_size {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            reader_pool_size
        );
        Ok(Self {
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Private in-memory database. Reads share the writer connection.
    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&writer)?;

        Ok(Self {
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Run `f` on a read connection. Blocking; call from a blocking context.
    pub fn with_reader<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        if self.readers.is_empty() {
            let conn = self.writer.blocking_lock();
            return f(&conn);
        }

        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| StoreError::Internal(format!("reader lock poisoned: {e}")))?;
        f(&conn)
    }

    /// Take the writer connection for the duration of a transaction.
    pub(crate) async fn lock_writer(&self) -> tokio::sync::OwnedMutexGuard<Connection> {
        self.writer.clone().lock_owned().await
    }
}
