use std::collections::BTreeMap;

use super::types::{Audit, Progress};
use crate::catalog::types::SetManifest;
use crate::error::StoreError;
use crate::store::{PersistentStore, AUDITS};

/// CRUD over the stored audit list, most recently modified first.
#[derive(Clone)]
pub struct AuditManager {
  store: PersistentStore,
}

impl AuditManager {
  pub fn new(store: PersistentStore) -> Self {
    Self { store }
  }

  pub fn list(&self) -> Vec<Audit> {
    self.store.get(AUDITS, Vec::new())
  }

  pub fn get(&self, audit_id: &str) -> Option<Audit> {
    self.list().into_iter().find(|a| a.id == audit_id)
  }

  /// Upsert by id, stamping `last_modified`. Last write wins.
  pub fn save(&self, audit: &Audit) -> bool {
    self.store.set(AUDITS, &self.upserted(audit))
  }

  fn try_save(&self, audit: &Audit) -> Result<(), StoreError> {
    self.store.try_set(AUDITS, &self.upserted(audit))
  }

  fn upserted(&self, audit: &Audit) -> Vec<Audit> {
    let mut audits = self.list();
    let mut audit = audit.clone();
    audit.last_modified = self.store.clock().now();

    match audits.iter_mut().find(|a| a.id == audit.id) {
      Some(existing) => *existing = audit,
      None => audits.push(audit),
    }

    audits.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    audits
  }

  pub fn delete(&self, audit_id: &str) -> bool {
    let audits: Vec<Audit> = self
      .list()
      .into_iter()
      .filter(|a| a.id != audit_id)
      .collect();
    self.store.set(AUDITS, &audits)
  }

  /// Start a new audit from a fetched manifest and persist it right away.
  pub fn create(&self, manifest: &SetManifest) -> Result<Audit, StoreError> {
    let now = self.store.clock().now();
    let set = &manifest.set;
    let total_parts: u32 = manifest.parts.iter().map(|p| p.quantity).sum();

    let audit = Audit {
      id: format!("audit-{}-{}", set.set_num, now.timestamp_millis()),
      set_number: set.set_num.clone(),
      set_name: set.name.clone(),
      set_year: set.year,
      image_url: set.set_img_url.clone(),
      theme: theme_from_url(set.set_url.as_deref()),
      published_part_count: set.num_parts,
      total_parts,
      parts: manifest.parts.clone(),
      parts_status: BTreeMap::new(),
      progress: Progress::new(0, total_parts),
      created_at: now,
      last_modified: now,
    };

    self.try_save(&audit)?;
    tracing::info!(audit_id = %audit.id, total_parts, "Audit created and saved");

    Ok(audit)
  }
}

/// Slug after the set number in a catalog set URL, e.g.
/// `https://rebrickable.com/sets/10255-1/assembly-square/` gives `assembly-square`.
fn theme_from_url(set_url: Option<&str>) -> String {
  set_url
    .and_then(|u| url::Url::parse(u).ok())
    .and_then(|u| {
      u.path_segments()?
        .filter(|s| !s.is_empty())
        .nth(2)
        .map(String::from)
    })
    .unwrap_or_else(|| "Unknown".to_string())
}
