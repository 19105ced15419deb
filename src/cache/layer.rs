//! Cache layer that sits between the app and the catalog client.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

use super::traits::CacheResult;
use crate::catalog::types::{CatalogSet, Part, SetManifest};
use crate::store::{PersistentStore, SET_CACHE};

/// A cached set manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
  pub data: CatalogSet,
  pub parts: Vec<Part>,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub cached_at: DateTime<Utc>,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
  fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now > self.expires_at
  }

  pub fn into_manifest(self) -> SetManifest {
    SetManifest {
      set: self.data,
      parts: self.parts,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
  pub entries: usize,
  pub expired: usize,
  /// Serialized size of all entries
  pub total_size_bytes: usize,
}

/// Set manifests keyed by normalized set number.
#[derive(Clone)]
pub struct ResponseCache {
  store: PersistentStore,
  /// How long an entry stays valid
  ttl: Duration,
}

impl ResponseCache {
  pub fn new(store: PersistentStore) -> Self {
    Self {
      store,
      ttl: Duration::days(7),
    }
  }

  fn entries(&self) -> BTreeMap<String, CacheEntry> {
    self.store.get(SET_CACHE, BTreeMap::new())
  }

  fn save_entries(&self, entries: &BTreeMap<String, CacheEntry>) -> bool {
    self.store.set(SET_CACHE, entries)
  }

  fn now(&self) -> DateTime<Utc> {
    self.store.clock().now()
  }

  /// Look up an entry, evicting it if it has expired.
  pub fn lookup(&self, set_num: &str) -> Option<CacheEntry> {
    let mut entries = self.entries();
    let entry = entries.get(set_num)?;

    if entry.is_expired(self.now()) {
      tracing::debug!(set_num, "Cached set expired");
      entries.remove(set_num);
      self.save_entries(&entries);
      return None;
    }

    entries.remove(set_num)
  }

  /// Cached manifest for `set_num`, if present and unexpired.
  pub fn get(&self, set_num: &str) -> Option<SetManifest> {
    self.lookup(set_num).map(CacheEntry::into_manifest)
  }

  pub fn set(&self, set_num: &str, data: &CatalogSet, parts: &[Part]) -> bool {
    let mut entries = self.entries();
    let now = self.now();

    entries.insert(
      set_num.to_string(),
      CacheEntry {
        data: data.clone(),
        parts: parts.to_vec(),
        cached_at: now,
        expires_at: now + self.ttl,
      },
    );

    self.save_entries(&entries)
  }

  pub fn remove(&self, set_num: &str) -> bool {
    let mut entries = self.entries();
    entries.remove(set_num);
    self.save_entries(&entries)
  }

  pub fn clear(&self) -> bool {
    self.save_entries(&BTreeMap::new())
  }

  /// Remove every expired entry, returning how many were dropped.
  pub fn clean_expired(&self) -> usize {
    let mut entries = self.entries();
    let now = self.now();
    let before = entries.len();

    entries.retain(|_, entry| !entry.is_expired(now));

    let removed = before - entries.len();
    if removed > 0 {
      self.save_entries(&entries);
    }
    removed
  }

  pub fn stats(&self) -> CacheStats {
    let entries = self.entries();
    let now = self.now();

    CacheStats {
      entries: entries.len(),
      expired: entries.values().filter(|e| e.is_expired(now)).count(),
      total_size_bytes: entries
        .values()
        .filter_map(|e| serde_json::to_string(e).ok())
        .map(|s| s.len())
        .sum(),
    }
  }

  /// Cache-first manifest fetch.
  ///
  /// Returns the cached manifest when one is valid. Otherwise runs `fetcher`
  /// and caches its result; a failed fetch caches nothing.
  pub async fn fetch_manifest<F, Fut, E>(
    &self,
    set_num: &str,
    fetcher: F,
  ) -> Result<CacheResult<SetManifest>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<SetManifest, E>>,
  {
    if let Some(entry) = self.lookup(set_num) {
      tracing::debug!(set_num, "Using cached data");
      let cached_at = entry.cached_at;
      return Ok(CacheResult::from_cache(entry.into_manifest(), cached_at));
    }

    tracing::debug!(set_num, "Fetching set from catalog");
    let manifest = fetcher().await?;
    if !self.set(set_num, &manifest.set, &manifest.parts) {
      tracing::warn!(set_num, "Failed to cache fetched set");
    }

    Ok(CacheResult::from_network(manifest))
  }
}
