//! Local persistence: JSON values under a handful of namespaced keys.
//!
//! The store never fails loudly. Reads fall back to a default, writes report
//! a boolean, and running out of quota trims old cached manifests so the
//! next write has a chance to succeed.

mod backend;

pub use backend::{KeyValueBackend, SqliteBackend};
#[cfg(test)]
pub use backend::MemoryBackend;

use chrono::Duration;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::error::StoreError;

pub const API_KEY: &str = "brickaudit_api_key";
pub const AUDITS: &str = "brickaudit_audits";
pub const SET_CACHE: &str = "brickaudit_set_cache";
pub const PREFERENCES: &str = "brickaudit_preferences";

/// Cached manifests younger than this survive a quota trim.
const QUOTA_TRIM_KEEP_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Light,
  Dark,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
  #[serde(default)]
  pub theme: Theme,
  /// Audit the user is currently working on
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub active_audit: Option<String>,
}

/// Typed handle over a [`KeyValueBackend`].
#[derive(Clone)]
pub struct PersistentStore {
  backend: Arc<dyn KeyValueBackend>,
  clock: SharedClock,
}

impl PersistentStore {
  pub fn new(backend: impl KeyValueBackend + 'static, clock: SharedClock) -> Self {
    Self {
      backend: Arc::new(backend),
      clock,
    }
  }

  pub fn clock(&self) -> &SharedClock {
    &self.clock
  }

  /// Read and parse `key`, or return `default` when it is missing or unreadable.
  pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
    let raw = match self.backend.read(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return default,
      Err(e) => {
        tracing::error!(key, error = %e, "Error reading from store");
        return default;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => value,
      Err(e) => {
        tracing::error!(key, error = %e, "Stored value is not valid JSON");
        default
      }
    }
  }

  /// Serialize and write `value`, returning whether the write succeeded.
  pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
    match self.try_set(key, value) {
      Ok(()) => true,
      Err(e) => {
        tracing::error!(key, error = %e, "Error writing to store");
        false
      }
    }
  }

  /// Like [`set`](Self::set) but reports why a write failed. A quota
  /// overflow trims old cached sets before the error is returned; the
  /// failed write itself is not retried.
  pub fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialize {
      key: key.to_string(),
      reason: e.to_string(),
    })?;

    match self.backend.write(key, &raw) {
      Err(e @ StoreError::QuotaExceeded { .. }) => {
        tracing::error!(key, "Store quota exceeded");
        self.handle_quota_exceeded();
        Err(e)
      }
      result => result,
    }
  }

  pub fn remove(&self, key: &str) -> bool {
    match self.backend.delete(key) {
      Ok(()) => true,
      Err(e) => {
        tracing::error!(key, error = %e, "Error removing from store");
        false
      }
    }
  }

  pub fn clear(&self) -> bool {
    match self.backend.clear() {
      Ok(()) => true,
      Err(e) => {
        tracing::error!(error = %e, "Error clearing store");
        false
      }
    }
  }

  /// Drop cached manifests older than three days. The write that triggered
  /// the overflow is not retried.
  fn handle_quota_exceeded(&self) {
    tracing::warn!("Attempting to free up store space");

    let cutoff = (self.clock.now() - Duration::days(QUOTA_TRIM_KEEP_DAYS)).timestamp_millis();
    let cache: BTreeMap<String, serde_json::Value> = self.get(SET_CACHE, BTreeMap::new());
    let before = cache.len();

    let kept: BTreeMap<String, serde_json::Value> = cache
      .into_iter()
      .filter(|(_, entry)| {
        entry
          .get("cachedAt")
          .and_then(serde_json::Value::as_i64)
          .is_some_and(|cached_at| cached_at > cutoff)
      })
      .collect();

    let removed = before - kept.len();
    // Write straight to the backend so a second overflow cannot recurse.
    let result = serde_json::to_string(&kept)
      .map_err(|e| StoreError::Serialize {
        key: SET_CACHE.to_string(),
        reason: e.to_string(),
      })
      .and_then(|raw| self.backend.write(SET_CACHE, &raw));

    match result {
      Ok(()) => tracing::info!(removed, "Trimmed cached sets after quota overflow"),
      Err(e) => tracing::error!(error = %e, "Failed to trim cached sets"),
    }
  }

  pub fn api_key(&self) -> Option<String> {
    self.get(API_KEY, None)
  }

  pub fn set_api_key(&self, api_key: &str) -> bool {
    self.set(API_KEY, api_key)
  }

  pub fn remove_api_key(&self) -> bool {
    self.remove(API_KEY)
  }

  pub fn preferences(&self) -> Preferences {
    self.get(PREFERENCES, Preferences::default())
  }

  pub fn save_preferences(&self, preferences: &Preferences) -> bool {
    self.set(PREFERENCES, preferences)
  }
}
