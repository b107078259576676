//! SQLite-backed datastore.
//!
//! One database file holds the `Entity`, `Command` and `ReportSubscription`
//! collections. Writes go through a single connection inside `IMMEDIATE`
//! transactions, so writers are serialized. File-backed stores run in WAL mode
//! and serve reads from a small pool of read-only connections; each read sees
//! a consistent snapshot without blocking the writer.

use super::{DataStore, DataStoreError, Result};
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

mod collection;
mod command;
mod entity;
mod report_subscription;


use collection::Record;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle read-only connections kept for reuse.
const MAX_IDLE_READERS: usize = 4;

/// SQLite implementation of [`DataStore`].
///
/// # Thread Safety
/// - The write connection is wrapped in a Mutex; one write transaction at a time
/// - Read connections are checked out of a pool and never shared
/// - In-memory stores have no separate readers and read through the writer
pub struct SqliteDataStore {
    writer: Mutex<Option<Connection>>,
    readers: Mutex<Vec<Connection>>,
    path: Option<PathBuf>,
    closed: AtomicBool,
}

impl SqliteDataStore {
    pub const NAME: &'static str = "sqlite";

    /// Opens (or creates) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| {
            DataStoreError::ConnectionFailed(format!("{}: {}", path.display(), e))
        })?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| DataStoreError::ConnectionFailed(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| DataStoreError::ConnectionFailed(e.to_string()))?;

        info!(path = %path.display(), journal_mode = %mode, "Opened SQLite datastore");

        Ok(Self {
            writer: Mutex::new(Some(conn)),
            readers: Mutex::new(Vec::new()),
            path: Some(path),
            closed: AtomicBool::new(false),
        })
    }

    /// Opens a private in-memory database. Contents vanish on close.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DataStoreError::ConnectionFailed(e.to_string()))?;

        debug!("Opened in-memory SQLite datastore");

        Ok(Self {
            writer: Mutex::new(Some(conn)),
            readers: Mutex::new(Vec::new()),
            path: None,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        Ok(())
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.writer
            .lock()
            .map_err(|_| DataStoreError::ConnectionFailed("writer lock poisoned".to_string()))
    }

    /// Runs `op` inside one write transaction, committing only on success.
    fn with_write<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.ensure_open()?;
        let mut guard = self.lock_writer()?;
        let conn = guard.as_mut().ok_or_else(closed_error)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs `op` inside one read transaction.
    fn with_read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.ensure_open()?;

        let Some(ref path) = self.path else {
            let mut guard = self.lock_writer()?;
            let conn = guard.as_mut().ok_or_else(closed_error)?;
            return read_in(conn, op);
        };

        let mut conn = self.checkout_reader(path)?;
        let result = read_in(&mut conn, op);
        self.checkin_reader(conn);
        result
    }

    fn checkout_reader(&self, path: &Path) -> Result<Connection> {
        let pooled = self
            .readers
            .lock()
            .map_err(|_| DataStoreError::ConnectionFailed("reader pool poisoned".to_string()))?
            .pop();
        if let Some(conn) = pooled {
            return Ok(conn);
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DataStoreError::ConnectionFailed(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| DataStoreError::ConnectionFailed(e.to_string()))?;
        Ok(conn)
    }

    fn checkin_reader(&self, conn: Connection) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut readers) = self.readers.lock() {
            if readers.len() < MAX_IDLE_READERS {
                readers.push(conn);
            }
        }
    }
}

fn read_in<T, F>(conn: &mut Connection, op: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let tx = conn.transaction()?;
    op(&tx)
}

fn closed_error() -> DataStoreError {
    DataStoreError::ConnectionFailed("datastore is closed".to_string())
}

impl DataStore for SqliteDataStore {
    fn init(&self) -> Result<()> {
        self.with_write(|conn| {
            collection::create_if_missing(conn, crate::datastore::Entity::COLLECTION)?;
            collection::create_if_missing(conn, crate::datastore::Command::COLLECTION)?;
            collection::create_if_missing(
                conn,
                crate::datastore::ReportSubscription::COLLECTION,
            )?;
            collection::create_sequence_table(conn)
        })?;

        info!("Datastore collections ready");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        if let Ok(mut readers) = self.readers.lock() {
            readers.clear();
        }

        let conn = self.lock_writer()?.take().ok_or_else(closed_error)?;
        conn.close()
            .map_err(|(_, e)| DataStoreError::ConnectionFailed(e.to_string()))?;

        info!("Closed SQLite datastore");
        Ok(())
    }
}
