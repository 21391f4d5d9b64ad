//! SQLite-backed partition store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use super::traits::PartitionStore;
use crate::resource::{CachedEntry, ResourceResponse};

/// Durable store keeping every partition in one SQLite database.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  /// Open the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  /// Transient store for tests.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("posworker").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the partition store.
const STORE_SCHEMA: &str = r#"
-- One row per cached response; headers are serialized JSON
CREATE TABLE IF NOT EXISTS cache_entries (
    partition_name TEXT NOT NULL,
    identity TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (partition_name, identity)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_identity
    ON cache_entries(identity);
"#;

impl PartitionStore for SqliteStore {
  fn get(&self, partition: &str, identity: &str) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT url, status, headers, body, fetched_at FROM cache_entries
         WHERE partition_name = ? AND identity = ?",
      )
      .map_err(|e| eyre!("Failed to prepare lookup: {}", e))?;

    let row: Option<(String, u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![partition, identity], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .ok();

    match row {
      Some(fields) => Ok(Some(entry_from_row(fields)?)),
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, identity: &str, entry: &CachedEntry) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_vec(&entry.response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (partition_name, identity, url, status, headers, body, fetched_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          partition,
          identity,
          entry.url,
          entry.response.status,
          headers,
          entry.response.body,
          entry.fetched_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    Ok(())
  }

  fn match_any(&self, identity: &str) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT url, status, headers, body, fetched_at FROM cache_entries
         WHERE identity = ? ORDER BY partition_name LIMIT 1",
      )
      .map_err(|e| eyre!("Failed to prepare lookup: {}", e))?;

    let row: Option<(String, u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![identity], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .ok();

    match row {
      Some(fields) => Ok(Some(entry_from_row(fields)?)),
      None => Ok(None),
    }
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT partition_name FROM cache_entries ORDER BY partition_name")
      .map_err(|e| eyre!("Failed to prepare partition listing: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn drop_partition(&self, partition: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM cache_entries WHERE partition_name = ?",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to drop partition {}: {}", partition, e))?;

    Ok(())
  }

  fn entry_count(&self, partition: &str) -> Result<u64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: u64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE partition_name = ?",
        params![partition],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries in {}: {}", partition, e))?;

    Ok(count)
  }
}

fn entry_from_row(
  (url, status, headers, body, fetched_at): (String, u16, Vec<u8>, Vec<u8>, String),
) -> Result<CachedEntry> {
  let headers: Vec<(String, String)> =
    serde_json::from_slice(&headers).map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
  let fetched_at = parse_datetime(&fetched_at)?;

  Ok(CachedEntry {
    url,
    response: ResourceResponse {
      status,
      headers,
      body,
    },
    fetched_at,
  })
}

/// Parse an RFC 3339 timestamp from storage.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resource::ResourceRequest;

  fn entry(url: &str, body: &[u8]) -> CachedEntry {
    CachedEntry::new(
      url,
      ResourceResponse {
        status: 200,
        headers: vec![
          ("content-type".to_string(), "text/css".to_string()),
          ("etag".to_string(), "\"abc123\"".to_string()),
        ],
        body: body.to_vec(),
      },
    )
  }

  #[test]
  fn test_round_trip_is_byte_identical() {
    let store = SqliteStore::in_memory().unwrap();
    let req = ResourceRequest::get("http://pos.local/static/css/pos.css");
    let stored = entry(&req.url, b"body { color: red }");

    store.put("static-v1", &req.identity(), &stored).unwrap();
    let loaded = store.get("static-v1", &req.identity()).unwrap().unwrap();

    assert_eq!(loaded.response, stored.response);
    assert_eq!(loaded.url, stored.url);
  }

  #[test]
  fn test_put_replaces_wholesale() {
    let store = SqliteStore::in_memory().unwrap();
    let req = ResourceRequest::get("http://pos.local/payments/api/recent/");

    store
      .put("api-v1", &req.identity(), &entry(&req.url, b"[1]"))
      .unwrap();
    store
      .put("api-v1", &req.identity(), &entry(&req.url, b"[1,2]"))
      .unwrap();

    let loaded = store.get("api-v1", &req.identity()).unwrap().unwrap();
    assert_eq!(loaded.response.body, b"[1,2]");
    assert_eq!(store.entry_count("api-v1").unwrap(), 1);
  }

  #[test]
  fn test_partitions_are_disjoint() {
    let store = SqliteStore::in_memory().unwrap();
    let req = ResourceRequest::get("http://pos.local/");

    store
      .put("app-shell-v1", &req.identity(), &entry(&req.url, b"<html>"))
      .unwrap();

    assert!(store.get("static-v1", &req.identity()).unwrap().is_none());
    assert!(store.get("app-shell-v1", &req.identity()).unwrap().is_some());
  }

  #[test]
  fn test_match_any_searches_all_partitions() {
    let store = SqliteStore::in_memory().unwrap();
    let req = ResourceRequest::navigation("http://pos.local/register/");

    assert!(store.match_any(&req.identity()).unwrap().is_none());

    store
      .put("app-shell-v1", &req.identity(), &entry(&req.url, b"<html>"))
      .unwrap();

    let found = store.match_any(&req.identity()).unwrap().unwrap();
    assert_eq!(found.response.body, b"<html>");
  }

  #[test]
  fn test_drop_partition_removes_only_that_partition() {
    let store = SqliteStore::in_memory().unwrap();
    let a = ResourceRequest::get("http://pos.local/static/a.css");
    let b = ResourceRequest::get("http://pos.local/static/b.css");

    store
      .put("static-v0", &a.identity(), &entry(&a.url, b"old"))
      .unwrap();
    store
      .put("static-v1", &b.identity(), &entry(&b.url, b"new"))
      .unwrap();

    store.drop_partition("static-v0").unwrap();

    assert_eq!(store.partitions().unwrap(), vec!["static-v1".to_string()]);
    assert_eq!(store.entry_count("static-v0").unwrap(), 0);
    assert_eq!(store.entry_count("static-v1").unwrap(), 1);
  }
}
