use color_eyre::Result;
use std::time::Duration;

use crate::audit::{Audit, AuditManager, AuditSession};
use crate::cache::{CacheResult, ResponseCache};
use crate::catalog::types::{CatalogSet, FetchProgress, Page, SetManifest};
use crate::catalog::CatalogClient;
use crate::clock;
use crate::config::Config;
use crate::error::{self, CatalogError, ValidationError};
use crate::helpers::normalize_set_number;
use crate::store::{PersistentStore, SqliteBackend};

/// Application context: the service handles plus credential and
/// active-audit state.
pub struct App {
  config: Config,
  store: PersistentStore,
  cache: ResponseCache,
  catalog: CatalogClient,
  audits: AuditManager,
}

impl App {
  /// Open the on-disk store and build the services.
  pub fn new(config: Config) -> Result<Self> {
    let path = config.store_path()?;
    let backend = SqliteBackend::open(&path, config.storage.quota_bytes)?;
    tracing::debug!(path = %path.display(), "Opened store");

    let store = PersistentStore::new(backend, clock::system());
    Self::with_store(config, store, Config::api_key_override())
  }

  /// Build the services over `store`. `api_key_override` takes precedence
  /// over the stored key.
  pub fn with_store(
    config: Config,
    store: PersistentStore,
    api_key_override: Option<String>,
  ) -> Result<Self> {
    let api_key = api_key_override.or_else(|| store.api_key());
    let catalog = CatalogClient::new(&config.catalog, api_key)?;

    Ok(Self {
      cache: ResponseCache::new(store.clone()),
      audits: AuditManager::new(store.clone()),
      config,
      store,
      catalog,
    })
  }

  pub fn store(&self) -> &PersistentStore {
    &self.store
  }

  pub fn cache(&self) -> &ResponseCache {
    &self.cache
  }

  pub fn catalog(&self) -> &CatalogClient {
    &self.catalog
  }

  pub fn audits(&self) -> &AuditManager {
    &self.audits
  }

  /// No API key yet: only setup is possible.
  pub fn needs_setup(&self) -> bool {
    !self.catalog.has_api_key()
  }

  /// Validate `api_key` against the catalog and store it if it works.
  pub async fn setup(&mut self, api_key: &str) -> error::Result<()> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
      return Err(ValidationError::EmptyInput("API key").into());
    }

    let mut candidate = self.catalog.clone();
    candidate.set_api_key(Some(api_key.to_string()));
    if !candidate.validate_key().await {
      return Err(CatalogError::InvalidKey.into());
    }

    if !self.store.set_api_key(api_key) {
      tracing::warn!("API key works but could not be stored");
    }
    self.catalog = candidate;
    tracing::info!("API key saved");
    Ok(())
  }

  /// Forget the stored API key.
  pub fn logout(&mut self) {
    self.store.remove_api_key();
    self.catalog.set_api_key(None);
  }

  /// Set details and full inventory, from the cache when possible.
  pub async fn fetch_set(
    &self,
    input: &str,
    on_progress: impl FnMut(FetchProgress),
  ) -> error::Result<CacheResult<SetManifest>> {
    let set_num = normalize_set_number(input)?;

    let result = self
      .cache
      .fetch_manifest(&set_num, || {
        let catalog = self.catalog.clone();
        let set_num = set_num.clone();
        async move {
          let set = catalog.get_set(&set_num).await?;
          let parts = catalog.get_all_set_parts(&set_num, on_progress).await?;
          Ok::<_, CatalogError>(SetManifest { set, parts })
        }
      })
      .await?;

    Ok(result)
  }

  /// Fetch a set, create an audit for it and make it the active one.
  pub async fn start_audit(
    &self,
    input: &str,
    on_progress: impl FnMut(FetchProgress),
  ) -> error::Result<Audit> {
    let fetched = self.fetch_set(input, on_progress).await?;
    tracing::debug!(
      source = ?fetched.source,
      cached_at = ?fetched.cached_at,
      "Set manifest ready"
    );
    let audit = self.audits.create(&fetched.data)?;
    self.set_active_audit(Some(audit.id.clone()));
    Ok(audit)
  }

  pub async fn search(
    &self,
    query: &str,
    page: u32,
    page_size: u32,
  ) -> error::Result<Page<CatalogSet>> {
    let query = query.trim();
    if query.is_empty() {
      return Err(ValidationError::EmptyInput("search term").into());
    }
    Ok(self.catalog.search_sets(query, page, page_size).await?)
  }

  pub fn active_audit_id(&self) -> Option<String> {
    self.store.preferences().active_audit
  }

  fn set_active_audit(&self, audit_id: Option<String>) {
    let mut preferences = self.store.preferences();
    preferences.active_audit = audit_id;
    self.store.save_preferences(&preferences);
  }

  /// Open an audit for editing and make it the active one.
  pub fn open_audit(&self, audit_id: &str) -> Option<AuditSession> {
    let session = AuditSession::open(
      audit_id,
      self.audits.clone(),
      Duration::from_millis(self.config.audit.debounce_ms),
    )?;
    self.set_active_audit(Some(audit_id.to_string()));
    Some(session)
  }

  /// Leave the active audit.
  pub fn exit_audit(&self) {
    self.set_active_audit(None);
  }

  /// Delete an audit, clearing the active pointer if it pointed there.
  pub fn delete_audit(&self, audit_id: &str) -> bool {
    let deleted = self.audits.delete(audit_id);
    if self.active_audit_id().as_deref() == Some(audit_id) {
      self.exit_audit();
    }
    deleted
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::audit::{PartStatus, Progress};
  use crate::cache::CacheSource;
  use crate::catalog::testing::{inventory_page, FakeCatalog};
  use crate::clock::testing::ManualClock;
  use crate::config::CatalogConfig;
  use crate::error::Error;
  use crate::store::MemoryBackend;

  const SET_BODY: &str = r#"{"set_num": "10255-1", "name": "Assembly Square", "year": 2017,
    "theme_id": 155, "num_parts": 2, "set_img_url": null,
    "set_url": "https://rebrickable.com/sets/10255-1/assembly-square/"}"#;

  fn fake_catalog() -> FakeCatalog {
    FakeCatalog::start(|url| match url {
      "/api/v3/lego/sets/10255-1/" => (200, SET_BODY.to_string()),
      u if u.starts_with("/api/v3/lego/sets/10255-1/parts/") => (
        200,
        inventory_page(2, false, &[("3001", 4, 2, false), ("3001", 4, 1, true)]),
      ),
      u if u.starts_with("/api/v3/lego/colors/") => (
        200,
        r#"{"count": 1, "next": null, "previous": null, "results": []}"#.to_string(),
      ),
      _ => (404, "{}".to_string()),
    })
  }

  fn config(catalog: &FakeCatalog) -> Config {
    Config {
      catalog: CatalogConfig {
        base_url: catalog.base_url(),
        timeout_secs: 5,
      },
      ..Config::default()
    }
  }

  fn app(catalog: &FakeCatalog, api_key: Option<&str>) -> App {
    let store = PersistentStore::new(MemoryBackend::default(), ManualClock::new());
    if let Some(key) = api_key {
      store.set_api_key(key);
    }
    App::with_store(config(catalog), store, None).unwrap()
  }

  #[tokio::test]
  async fn test_end_to_end_audit() {
    let catalog = fake_catalog();
    let app = app(&catalog, Some("k"));

    let mut progress = Vec::new();
    let audit = app
      .start_audit("10255", |p| progress.push(p))
      .await
      .unwrap();

    assert_eq!(audit.set_number, "10255-1");
    assert_eq!(audit.total_parts, 3);
    assert_eq!(progress, vec![FetchProgress::new(2, 2)]);
    assert_eq!(app.active_audit_id(), Some(audit.id.clone()));
    assert!(app.cache().get("10255-1").is_some());

    let mut session = app.open_audit(&audit.id).unwrap();
    let progress = session
      .update_part_status("3001-4-regular", PartStatus::counted(2, 2))
      .unwrap();
    assert_eq!(
      progress,
      Progress {
        completed: 2,
        total: 3,
        percentage: 67
      }
    );
    assert!(session.force_save());
    assert_eq!(app.audits().get(&audit.id).unwrap().progress, progress);
  }

  #[tokio::test]
  async fn test_second_fetch_is_served_from_cache() {
    let catalog = fake_catalog();
    let app = app(&catalog, Some("k"));

    let first = app.fetch_set("10255-1", |_| {}).await.unwrap();
    let requests = catalog.requests().len();
    let second = app.fetch_set("10255", |_| {}).await.unwrap();

    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, first.data);
    assert_eq!(catalog.requests().len(), requests);
  }

  #[tokio::test]
  async fn test_failed_fetch_caches_nothing_and_creates_no_audit() {
    let catalog = fake_catalog();
    let app = app(&catalog, Some("k"));

    let err = app.start_audit("99999", |_| {}).await.unwrap_err();
    assert!(matches!(err, Error::Catalog(CatalogError::NotFound)));
    assert!(app.cache().get("99999-1").is_none());
    assert!(app.audits().list().is_empty());
  }

  #[tokio::test]
  async fn test_empty_input_is_rejected() {
    let catalog = fake_catalog();
    let app = app(&catalog, Some("k"));

    assert!(matches!(
      app.fetch_set("  ", |_| {}).await.unwrap_err(),
      Error::Validation(ValidationError::EmptyInput(_))
    ));
    assert!(matches!(
      app.search("", 1, 20).await.unwrap_err(),
      Error::Validation(ValidationError::EmptyInput(_))
    ));
    assert!(catalog.requests().is_empty());
  }

  #[tokio::test]
  async fn test_setup_and_logout() {
    let catalog = fake_catalog();
    let mut app = app(&catalog, None);
    assert!(app.needs_setup());

    let err = app.fetch_set("10255", |_| {}).await.unwrap_err();
    assert!(matches!(err, Error::Catalog(CatalogError::InvalidKey)));

    app.setup("fresh-key").await.unwrap();
    assert!(!app.needs_setup());
    assert_eq!(app.store().api_key().as_deref(), Some("fresh-key"));

    app.logout();
    assert!(app.needs_setup());
    assert_eq!(app.store().api_key(), None);
  }

  #[tokio::test]
  async fn test_api_key_override_takes_precedence() {
    let catalog = fake_catalog();
    let store = PersistentStore::new(MemoryBackend::default(), ManualClock::new());
    store.set_api_key("stored-key");
    let app = App::with_store(config(&catalog), store, Some("env-key".to_string())).unwrap();

    app.fetch_set("10255", |_| {}).await.unwrap();
    let requests = catalog.requests();
    assert!(!requests.is_empty());
    assert!(requests
      .iter()
      .all(|r| r.authorization.as_deref() == Some("key env-key")));
    assert_eq!(app.store().api_key().as_deref(), Some("stored-key"));
  }

  #[tokio::test]
  async fn test_deleting_active_audit_clears_pointer() {
    let catalog = fake_catalog();
    let app = app(&catalog, Some("k"));

    let audit = app.start_audit("10255", |_| {}).await.unwrap();
    assert_eq!(app.active_audit_id(), Some(audit.id.clone()));

    assert!(app.delete_audit(&audit.id));
    assert!(app.audits().list().is_empty());
    assert_eq!(app.active_audit_id(), None);
  }

  #[tokio::test]
  async fn test_deleting_other_audit_keeps_pointer() {
    let catalog = fake_catalog();
    let app = app(&catalog, Some("k"));

    let audit = app.start_audit("10255", |_| {}).await.unwrap();
    assert!(app.delete_audit("audit-other"));
    assert_eq!(app.active_audit_id(), Some(audit.id));
  }
}
