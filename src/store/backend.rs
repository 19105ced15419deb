//! Key-value backends for the persistent store.

use rusqlite::{params, Connection, OptionalExtension};
#[cfg(test)]
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;

/// Raw text storage, one value per key.
///
/// Implementations enforce their own size quota and report an overflow as
/// [`StoreError::QuotaExceeded`] without changing the stored value.
pub trait KeyValueBackend: Send + Sync {
  fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

  fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

  fn delete(&self, key: &str) -> Result<(), StoreError>;

  fn clear(&self) -> Result<(), StoreError>;
}

fn check_quota(
  key: &str,
  value: &str,
  used_by_others: usize,
  quota: Option<usize>,
) -> Result<(), StoreError> {
  let required = used_by_others + key.len() + value.len();
  match quota {
    Some(quota) if required > quota => Err(StoreError::QuotaExceeded {
      key: key.to_string(),
      required,
      quota,
    }),
    _ => Ok(()),
  }
}

/// SQLite-backed storage: a single `kv` table.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
  quota: Option<usize>,
}

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl SqliteBackend {
  /// Open or create the store database at `path`.
  pub fn open(path: &Path, quota: Option<usize>) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| StoreError::Write {
        key: path.display().to_string(),
        reason: format!("failed to create store directory: {}", e),
      })?;
    }

    let conn = Connection::open(path).map_err(|e| StoreError::Read {
      key: path.display().to_string(),
      reason: e.to_string(),
    })?;

    Self::with_connection(conn, quota)
  }

  /// In-memory SQLite database.
  #[cfg(test)]
  pub fn open_in_memory(quota: Option<usize>) -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory().map_err(|e| StoreError::Read {
      key: ":memory:".to_string(),
      reason: e.to_string(),
    })?;

    Self::with_connection(conn, quota)
  }

  fn with_connection(conn: Connection, quota: Option<usize>) -> Result<Self, StoreError> {
    conn.execute_batch(KV_SCHEMA).map_err(|e| StoreError::Write {
      key: "kv".to_string(),
      reason: format!("failed to run migrations: {}", e),
    })?;

    Ok(Self {
      conn: Mutex::new(conn),
      quota,
    })
  }

  fn lock(&self, key: &str) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|e| StoreError::Read {
      key: key.to_string(),
      reason: format!("lock poisoned: {}", e),
    })
  }
}

impl KeyValueBackend for SqliteBackend {
  fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
    let conn = self.lock(key)?;

    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| StoreError::Read {
        key: key.to_string(),
        reason: e.to_string(),
      })
  }

  fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let conn = self.lock(key)?;
    let write_err = |e: rusqlite::Error| StoreError::Write {
      key: key.to_string(),
      reason: e.to_string(),
    };

    if self.quota.is_some() {
      let used: i64 = conn
        .query_row(
          "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
           FROM kv WHERE key != ?",
          params![key],
          |row| row.get(0),
        )
        .map_err(write_err)?;
      check_quota(key, value, used.max(0) as usize, self.quota)?;
    }

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(write_err)?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<(), StoreError> {
    let conn = self.lock(key)?;

    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| StoreError::Write {
        key: key.to_string(),
        reason: e.to_string(),
      })?;

    Ok(())
  }

  fn clear(&self) -> Result<(), StoreError> {
    let conn = self.lock("*")?;

    conn
      .execute("DELETE FROM kv", [])
      .map_err(|e| StoreError::Write {
        key: "*".to_string(),
        reason: e.to_string(),
      })?;

    Ok(())
  }
}

/// Storage that lives only as long as the process.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryBackend {
  entries: Mutex<HashMap<String, String>>,
  quota: Option<usize>,
}

#[cfg(test)]
impl MemoryBackend {
  pub fn with_quota(quota: usize) -> Self {
    Self {
      entries: Mutex::default(),
      quota: Some(quota),
    }
  }

  fn lock(&self, key: &str) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
    self.entries.lock().map_err(|e| StoreError::Read {
      key: key.to_string(),
      reason: format!("lock poisoned: {}", e),
    })
  }
}

#[cfg(test)]
impl KeyValueBackend for MemoryBackend {
  fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
    Ok(self.lock(key)?.get(key).cloned())
  }

  fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let mut entries = self.lock(key)?;
    let used = entries
      .iter()
      .filter(|(k, _)| k.as_str() != key)
      .map(|(k, v)| k.len() + v.len())
      .sum();
    check_quota(key, value, used, self.quota)?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.lock(key)?.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<(), StoreError> {
    self.lock("*")?.clear();
    Ok(())
  }
}
