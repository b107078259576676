//! Key → JSON record tables.
//!
//! Each collection is a table `(key TEXT PRIMARY KEY, value TEXT)` named after
//! the record kind. Per-collection counters live in [`SEQUENCE_TABLE`].
//! Every function here runs inside a transaction owned by the caller.

use crate::datastore::{DataStoreError, Filter, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(super) const SEQUENCE_TABLE: &str = "_sequence";

/// A record type stored in its own collection.
pub(super) trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn key(&self) -> String;
}

pub(super) fn create_if_missing(conn: &Connection, name: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (
            key   TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        ) WITHOUT ROWID;",
        name
    ))?;
    Ok(())
}

pub(super) fn create_sequence_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (
            collection TEXT PRIMARY KEY NOT NULL,
            value      INTEGER NOT NULL
        );",
        SEQUENCE_TABLE
    ))?;
    Ok(())
}

/// Fails with `CollectionMissing` unless the table exists.
pub(super) fn require(conn: &Connection, name: &'static str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![name],
        |row| row.get(0),
    )?;

    if !exists {
        return Err(DataStoreError::CollectionMissing(name));
    }
    Ok(())
}

fn decode<R: Record>(raw: &str) -> Result<R> {
    serde_json::from_str(raw).map_err(|e| {
        DataStoreError::InvalidData(format!("{} record: {}", R::COLLECTION, e))
    })
}

fn contains(conn: &Connection, name: &str, key: &str) -> Result<bool> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM \"{}\" WHERE key = ?1", name),
            params![key],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn put<R: Record>(conn: &Connection, key: &str, record: &R) -> Result<()> {
    let value = serde_json::to_string(record)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO \"{}\" (key, value) VALUES (?1, ?2)",
            R::COLLECTION
        ),
        params![key, value],
    )?;
    Ok(())
}

pub(super) fn get<R: Record>(conn: &Connection, key: &str) -> Result<R> {
    require(conn, R::COLLECTION)?;

    let raw: Option<String> = conn
        .query_row(
            &format!("SELECT value FROM \"{}\" WHERE key = ?1", R::COLLECTION),
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(raw) => decode(&raw),
        None => Err(DataStoreError::RecordNotFound),
    }
}

/// Full scan in key order. One undecodable record fails the whole scan,
/// whether or not the filter would have kept it.
pub(super) fn scan<R: Record>(conn: &Connection, filter: &dyn Filter<R>) -> Result<Vec<R>> {
    require(conn, R::COLLECTION)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT value FROM \"{}\" ORDER BY key",
        R::COLLECTION
    ))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for raw in rows {
        let record: R = decode(&raw?)?;
        if filter.check(&record) {
            records.push(record);
        }
    }
    Ok(records)
}

pub(super) fn insert<R: Record>(conn: &Connection, record: &R) -> Result<()> {
    require(conn, R::COLLECTION)?;

    let key = record.key();
    if contains(conn, R::COLLECTION, &key)? {
        return Err(DataStoreError::DuplicateRecord);
    }
    put(conn, &key, record)
}

/// Loads the record, applies `mutate` and writes it back under the same key.
pub(super) fn update<R, F>(conn: &Connection, key: &str, mutate: F) -> Result<R>
where
    R: Record,
    F: FnOnce(&mut R) -> Result<()>,
{
    let mut record: R = get(conn, key)?;
    mutate(&mut record)?;
    put(conn, key, &record)?;
    Ok(record)
}

pub(super) fn remove<R: Record>(conn: &Connection, key: &str) -> Result<()> {
    require(conn, R::COLLECTION)?;

    let removed = conn.execute(
        &format!("DELETE FROM \"{}\" WHERE key = ?1", R::COLLECTION),
        params![key],
    )?;
    if removed == 0 {
        return Err(DataStoreError::RecordNotFound);
    }
    Ok(())
}

/// Allocates the next value of the collection's counter, starting at 1.
/// Values are never handed out twice, even after deletes.
pub(super) fn next_sequence(conn: &Connection, name: &'static str) -> Result<u64> {
    let value: i64 = conn.query_row(
        &format!(
            "INSERT INTO \"{}\" (collection, value) VALUES (?1, 1)
             ON CONFLICT(collection) DO UPDATE SET value = value + 1
             RETURNING value",
            SEQUENCE_TABLE
        ),
        params![name],
        |row| row.get(0),
    )?;
    u64::try_from(value)
        .map_err(|_| DataStoreError::InvalidData(format!("negative sequence for {}", name)))
}
