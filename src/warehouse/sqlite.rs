//! SQLite executor and key store

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension as _};

use super::keys::KeyStore;
use super::SqlExecutor;
use crate::{Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

const KEY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kiln_keys (
    namespace TEXT NOT NULL,
    id        TEXT NOT NULL,
    sk        INTEGER NOT NULL,
    PRIMARY KEY (namespace, id),
    UNIQUE (namespace, sk)
);
";

/// Runs statements against a SQLite database
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        // Parallel table workers each hold a connection to the same file
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SqlExecutor for SqliteExecutor {
    fn execute(&mut self, sql: &str) -> Result<u64> {
        let changed = self.conn.execute(sql, [])?;
        Ok(changed as u64)
    }
}

/// Key store persisted in a SQLite table.
///
/// A mapping is committed before `resolve` returns, so keys survive an
/// interrupted run.
pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(KEY_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lookup(conn: &Connection, namespace: &str, id: &str) -> Result<Option<i64>> {
        let key = conn
            .query_row(
                "SELECT sk FROM kiln_keys WHERE namespace = ?1 AND id = ?2",
                rusqlite::params![namespace, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key)
    }
}

impl KeyStore for SqliteKeyStore {
    fn resolve(&self, namespace: &str, id: &str) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::KeyStore("key store lock poisoned".to_string()))?;

        if let Some(key) = Self::lookup(&conn, namespace, id)? {
            return Ok(key);
        }

        // One statement, so another process sharing the file cannot slip in
        // between reading the maximum and inserting
        conn.execute(
            "INSERT OR IGNORE INTO kiln_keys (namespace, id, sk)
             SELECT ?1, ?2, COALESCE(MAX(sk), 0) + 1 FROM kiln_keys WHERE namespace = ?1",
            rusqlite::params![namespace, id],
        )?;

        Self::lookup(&conn, namespace, id)?
            .ok_or_else(|| Error::KeyStore(format!("no key recorded for {} in {:?}", id, namespace)))
    }
}
