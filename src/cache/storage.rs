//! SQLite-backed cache storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{CacheStorage, CacheStore, CachedKey};
use crate::http::{RequestKey, Response};

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per generation store
CREATE TABLE IF NOT EXISTS caches (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses, keyed by request identity hash
CREATE TABLE IF NOT EXISTS entries (
    cache_name TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_cache ON entries(cache_name);
"#;

/// SQLite storage holding every generation's store in one database.
pub struct SqliteStorage {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
  /// Open the database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the database at the given path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Non-persistent database, mostly for tests.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offline-sw").join("caches.db"))
  }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
  conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
}

impl CacheStorage for SqliteStorage {
  type Store = SqliteCache;

  fn open(&self, name: &str) -> Result<SqliteCache> {
    lock(&self.conn)?
      .execute(
        "INSERT OR IGNORE INTO caches (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;

    Ok(SqliteCache {
      conn: Arc::clone(&self.conn),
      name: name.to_string(),
    })
  }

  fn find(&self, name: &str) -> Result<Option<SqliteCache>> {
    let exists = lock(&self.conn)?
      .query_row(
        "SELECT 1 FROM caches WHERE name = ?",
        params![name],
        |_| Ok(()),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cache {}: {}", name, e))?
      .is_some();

    Ok(exists.then(|| SqliteCache {
      conn: Arc::clone(&self.conn),
      name: name.to_string(),
    }))
  }

  fn names(&self) -> Result<Vec<String>> {
    let conn = lock(&self.conn)?;
    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = lock(&self.conn)?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE cache_name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM caches WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }
}

/// Handle to one named store inside a [`SqliteStorage`].
#[derive(Clone)]
pub struct SqliteCache {
  conn: Arc<Mutex<Connection>>,
  name: String,
}

fn insert_entry(
  conn: &Connection,
  cache_name: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (cache_name, key_hash, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_name,
        key.cache_hash(),
        key.method(),
        key.url(),
        response.status,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

  Ok(())
}

impl CacheStore for SqliteCache {
  fn name(&self) -> &str {
    &self.name
  }

  fn get(&self, key: &RequestKey) -> Result<Option<Response>> {
    let conn = lock(&self.conn)?;
    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body FROM entries
         WHERE cache_name = ? AND key_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>)> = stmt
      .query_row(params![self.name, key.cache_hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    match row {
      Some((status, headers, body)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", key, e))?;
        Ok(Some(Response {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = lock(&self.conn)?;
    insert_entry(&conn, &self.name, key, response)
  }

  fn put_all(&self, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = lock(&self.conn)?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, response) in entries {
      insert_entry(&tx, &self.name, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn keys(&self) -> Result<Vec<CachedKey>> {
    let conn = lock(&self.conn)?;
    let mut stmt = conn
      .prepare("SELECT method, url, cached_at FROM entries WHERE cache_name = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![self.name], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list entries of {}: {}", self.name, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read entry of {}: {}", self.name, e))?;

    rows
      .into_iter()
      .map(|(method, url, cached_at)| {
        Ok(CachedKey {
          key: RequestKey::from_parts(&method, &url)?,
          cached_at: parse_datetime(&cached_at)?,
        })
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
