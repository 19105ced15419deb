//! Keeps an open audit's progress current and writes edits out in bursts.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::manager::AuditManager;
use super::progress::calculate_progress;
use super::types::{Audit, PartStatus, Progress, TrackingMode};
use crate::error::ValidationError;

/// An audit being edited.
///
/// Every status change recomputes progress immediately. Persisting is
/// debounced: each edit cancels the pending write and schedules a new one
/// `debounce` later, so a burst of edits costs a single store write.
/// [`force_save`](Self::force_save) writes synchronously. Dropping a session
/// leaves an already scheduled write in place.
///
/// Writes are numbered by edit. A scheduled write that is already past its
/// sleep when it gets cancelled may still run, so every write first checks
/// that nothing newer has been stored.
///
/// Scheduling needs a running tokio runtime.
pub struct AuditSession {
  audit: Audit,
  audits: AuditManager,
  debounce: Duration,
  pending: Option<JoinHandle<()>>,
  dirty: bool,
  /// Bumped on every edit
  generation: u64,
  /// Generation of the newest snapshot in the store
  written: Arc<Mutex<u64>>,
}

impl AuditSession {
  pub fn new(audit: Audit, audits: AuditManager, debounce: Duration) -> Self {
    Self {
      audit,
      audits,
      debounce,
      pending: None,
      dirty: false,
      generation: 0,
      written: Arc::new(Mutex::new(0)),
    }
  }

  /// Open a stored audit by id.
  pub fn open(audit_id: &str, audits: AuditManager, debounce: Duration) -> Option<Self> {
    let audit = audits.get(audit_id)?;
    Some(Self::new(audit, audits, debounce))
  }

  pub fn audit(&self) -> &Audit {
    &self.audit
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// Replace one part's status and schedule a write.
  pub fn update_part_status(
    &mut self,
    part_id: &str,
    status: PartStatus,
  ) -> Result<Progress, ValidationError> {
    let required = self
      .audit
      .part(part_id)
      .map(|p| p.quantity)
      .ok_or_else(|| ValidationError::UnknownPart(part_id.to_string()))?;

    self
      .audit
      .parts_status
      .insert(part_id.to_string(), status.clamped(required));
    self.audit.progress = calculate_progress(
      &self.audit.parts,
      &self.audit.parts_status,
      TrackingMode::Counter,
    );
    self.dirty = true;
    self.generation += 1;
    self.schedule_save();

    Ok(self.audit.progress)
  }

  fn schedule_save(&mut self) {
    self.cancel_pending();

    let audits = self.audits.clone();
    let snapshot = self.audit.clone();
    let delay = self.debounce;
    let generation = self.generation;
    let written = Arc::clone(&self.written);

    self.pending = Some(tokio::spawn(async move {
      tokio::time::sleep(delay).await;

      let mut written = lock_written(&written);
      if *written >= generation {
        tracing::debug!(audit_id = %snapshot.id, "Newer audit already saved");
        return;
      }
      if audits.save(&snapshot) {
        *written = generation;
        tracing::debug!(audit_id = %snapshot.id, "Audit auto-saved");
      }
    }));
  }

  fn cancel_pending(&mut self) {
    if let Some(pending) = self.pending.take() {
      pending.abort();
    }
  }

  /// Write now, dropping any scheduled write.
  pub fn force_save(&mut self) -> bool {
    self.cancel_pending();

    let mut written = lock_written(&self.written);
    let saved = self.audits.save(&self.audit);
    if saved {
      *written = self.generation;
      self.dirty = false;
    }
    saved
  }

  /// Force-save if there are unsaved edits and hand the audit back.
  pub fn close(mut self) -> Audit {
    if self.is_dirty() {
      self.force_save();
    }
    self.audit
  }
}

fn lock_written(written: &Mutex<u64>) -> MutexGuard<'_, u64> {
  written.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::types::{CatalogSet, Part, SetManifest};
  use crate::clock::testing::ManualClock;
  use crate::error::StoreError;
  use crate::store::{KeyValueBackend, MemoryBackend, PersistentStore, AUDITS};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  /// Counts writes of the audit list.
  struct CountingBackend {
    inner: MemoryBackend,
    audit_writes: Arc<AtomicUsize>,
  }

  impl KeyValueBackend for CountingBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
      self.inner.read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
      if key == AUDITS {
        self.audit_writes.fetch_add(1, Ordering::SeqCst);
      }
      self.inner.write(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
      self.inner.delete(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
      self.inner.clear()
    }
  }

  const DEBOUNCE: Duration = Duration::from_millis(500);

  fn setup() -> (AuditManager, Audit, Arc<AtomicUsize>) {
    let audit_writes = Arc::new(AtomicUsize::new(0));
    let backend = CountingBackend {
      inner: MemoryBackend::default(),
      audit_writes: Arc::clone(&audit_writes),
    };
    let manager = AuditManager::new(PersistentStore::new(backend, ManualClock::new()));

    let manifest = SetManifest {
      set: CatalogSet {
        set_num: "10255-1".to_string(),
        name: "Assembly Square".to_string(),
        year: Some(2017),
        theme_id: None,
        num_parts: 2,
        set_img_url: None,
        set_url: None,
        last_modified: None,
      },
      parts: vec![
        Part {
          id: "3001-4-regular".to_string(),
          quantity: 2,
          is_spare: false,
          part: None,
          color: None,
        },
        Part {
          id: "3001-4-spare".to_string(),
          quantity: 1,
          is_spare: true,
          part: None,
          color: None,
        },
      ],
    };
    let audit = manager.create(&manifest).unwrap();

    (manager, audit, audit_writes)
  }

  #[tokio::test(start_paused = true)]
  async fn test_burst_of_edits_is_written_once() {
    let (manager, audit, writes) = setup();
    assert_eq!(writes.load(Ordering::SeqCst), 1, "creation writes immediately");

    let mut session = AuditSession::new(audit.clone(), manager.clone(), DEBOUNCE);
    session
      .update_part_status("3001-4-regular", PartStatus::counted(1, 2))
      .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    session
      .update_part_status("3001-4-regular", PartStatus::counted(2, 2))
      .unwrap();
    session
      .update_part_status("3001-4-spare", PartStatus::complete(1))
      .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(writes.load(Ordering::SeqCst), 1);
    assert!(manager.get(&audit.id).unwrap().parts_status.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(writes.load(Ordering::SeqCst), 2);

    let stored = manager.get(&audit.id).unwrap();
    assert_eq!(stored.progress, Progress::new(3, 3));
    assert_eq!(stored.parts_status.len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_force_save_bypasses_debounce() {
    let (manager, audit, writes) = setup();
    let mut session = AuditSession::new(audit.clone(), manager.clone(), DEBOUNCE);

    session
      .update_part_status("3001-4-regular", PartStatus::counted(1, 2))
      .unwrap();
    assert!(session.is_dirty());
    assert!(session.force_save());
    assert!(!session.is_dirty());
    assert_eq!(writes.load(Ordering::SeqCst), 2);
    assert_eq!(manager.get(&audit.id).unwrap().progress.completed, 1);

    tokio::time::sleep(DEBOUNCE * 2).await;
    assert_eq!(writes.load(Ordering::SeqCst), 2, "scheduled write was cancelled");
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_scheduled_write_never_overwrites_force_save() {
    let (manager, audit, writes) = setup();
    let mut session = AuditSession::new(audit.clone(), manager.clone(), DEBOUNCE);

    session
      .update_part_status("3001-4-regular", PartStatus::counted(1, 2))
      .unwrap();
    // Out of reach of cancellation, like a write already running on another worker
    let stale = session.pending.take().unwrap();

    session
      .update_part_status("3001-4-regular", PartStatus::counted(2, 2))
      .unwrap();
    assert!(session.force_save());

    tokio::time::sleep(DEBOUNCE * 2).await;
    stale.await.unwrap();

    assert_eq!(writes.load(Ordering::SeqCst), 2);
    assert_eq!(manager.get(&audit.id).unwrap().progress.completed, 2);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_force_save_wins_over_racing_scheduled_writes() {
    let (manager, audit, _) = setup();
    let mut session = AuditSession::new(audit.clone(), manager.clone(), Duration::ZERO);

    for collected in 0..=2 {
      session
        .update_part_status("3001-4-regular", PartStatus::counted(collected, 2))
        .unwrap();
      tokio::task::yield_now().await;
    }
    assert!(session.force_save());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.get(&audit.id).unwrap().progress.completed, 2);
  }

  #[tokio::test]
  async fn test_progress_is_idempotent_and_bounded() {
    let (manager, audit, _) = setup();
    let mut session = AuditSession::new(audit, manager, DEBOUNCE);

    let status = PartStatus::counted(2, 2);
    let first = session.update_part_status("3001-4-regular", status).unwrap();
    let second = session.update_part_status("3001-4-regular", status).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, Progress::new(2, 3));
    assert_eq!(first.percentage, 67);

    let over = PartStatus {
      checked: false,
      quantity: 99,
    };
    let progress = session.update_part_status("3001-4-spare", over).unwrap();
    assert_eq!(session.audit().status("3001-4-spare").quantity, 1);
    assert!(progress.completed <= progress.total);
    assert!(progress.percentage <= 100);
  }

  #[tokio::test]
  async fn test_unknown_part_is_rejected() {
    let (manager, audit, _) = setup();
    let mut session = AuditSession::new(audit, manager, DEBOUNCE);

    let err = session
      .update_part_status("9999-0-regular", PartStatus::complete(1))
      .unwrap_err();
    assert_eq!(err, ValidationError::UnknownPart("9999-0-regular".to_string()));
    assert!(!session.is_dirty());
    assert!(session.audit().parts_status.is_empty());
  }

  #[tokio::test]
  async fn test_close_persists_unsaved_edits() {
    let (manager, audit, _) = setup();
    let mut session = AuditSession::open(&audit.id, manager.clone(), DEBOUNCE).unwrap();
    session
      .update_part_status("3001-4-spare", PartStatus::complete(1))
      .unwrap();

    let closed = session.close();
    assert_eq!(closed.progress.completed, 1);
    assert_eq!(manager.get(&audit.id).unwrap().progress.completed, 1);
    assert!(AuditSession::open("missing", manager, DEBOUNCE).is_none());
  }
}
