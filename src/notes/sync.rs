//! Sync workflow around the reconciler: fetch, merge, persist, upload.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::model::{Note, NoteId};
use super::reconcile::reconcile;
use super::store::NoteStore;
use crate::db::KeyValueStore;
use crate::error::SyncError;

/// The signed-in user of the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
  pub id: String,
  pub email: Option<String>,
}

/// Remote note table, keyed by note id and scoped to one user.
///
/// Implementations translate between the remote row shape and `Note`.
#[async_trait]
pub trait RemoteNoteStore: Send + Sync {
  /// The user behind the current session, or `None` without a valid session.
  async fn current_user(&self) -> Result<Option<RemoteUser>, SyncError>;

  async fn fetch_notes(&self, user_id: &str) -> Result<Vec<Note>, SyncError>;

  /// Insert or replace rows by id.
  async fn upsert_notes(&self, user_id: &str, notes: &[Note]) -> Result<(), SyncError>;

  async fn delete_note(&self, id: NoteId) -> Result<(), SyncError>;

  /// Cheap round trip proving the backend is reachable.
  async fn probe(&self) -> Result<(), SyncError>;
}

#[derive(Debug, Clone)]
pub struct SyncReport {
  pub notes: Vec<Note>,
  pub synced_at: DateTime<Utc>,
  /// Local deletions pushed to the remote store during this sync
  pub deleted_remotely: usize,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
  pub timestamp: DateTime<Utc>,
  pub configured: bool,
  pub connected: bool,
  pub authenticated: bool,
}

/// Keeps the local note collection and the remote note table converged.
///
/// The caller serializes invocations; nothing here locks across a sync.
pub struct SyncService<K: KeyValueStore, R: RemoteNoteStore> {
  store: NoteStore<K>,
  remote: Option<Arc<R>>,
  /// Auto-save is skipped if the last sync is more recent than this
  min_interval: Duration,
}

fn local_err(e: color_eyre::Report) -> SyncError {
  SyncError::LocalStorage(e.to_string())
}

impl<K: KeyValueStore, R: RemoteNoteStore> SyncService<K, R> {
  pub fn new(store: NoteStore<K>, remote: Option<Arc<R>>, min_interval: Duration) -> Self {
    Self {
      store,
      remote,
      min_interval,
    }
  }

  pub fn is_configured(&self) -> bool {
    self.remote.is_some()
  }

  fn remote(&self) -> Result<&R, SyncError> {
    self
      .remote
      .as_deref()
      .ok_or_else(|| SyncError::RemoteUnavailable("remote store not configured".to_string()))
  }

  async fn user(&self, remote: &R) -> Result<RemoteUser, SyncError> {
    remote
      .current_user()
      .await?
      .ok_or(SyncError::NotAuthenticated)
  }

  /// Merge local and remote notes and write the result to both sides.
  ///
  /// A failure before the merge leaves local data untouched. A rejected
  /// upload happens after the local write and is not rolled back; the next
  /// successful sync converges both sides again.
  pub async fn sync(&self, now: DateTime<Utc>) -> Result<SyncReport, SyncError> {
    let remote = self.remote()?;
    let user = self.user(remote).await?;
    debug!(user = %user.id, email = ?user.email, "Syncing notes");
    let local = self.store.load_notes().map_err(local_err)?;

    let mut remote_notes = remote.fetch_notes(&user.id).await?;
    debug!(
      local = local.len(),
      remote = remote_notes.len(),
      "Fetched remote notes"
    );

    let deleted_remotely = self.propagate_deletions(remote, &mut remote_notes).await?;

    let merged = reconcile(&local, &remote_notes);
    self.store.save_notes(&merged).map_err(local_err)?;

    remote.upsert_notes(&user.id, &merged).await?;

    if let Err(e) = self.store.set_last_sync(now) {
      warn!("Failed to record sync time: {}", e);
    }

    info!(notes = merged.len(), deleted_remotely, "Notes synced");
    Ok(SyncReport {
      notes: merged,
      synced_at: now,
      deleted_remotely,
    })
  }

  /// Push pending local deletions and drop the deleted notes from the
  /// fetched remote set. A remote copy edited after the deletion survives.
  async fn propagate_deletions(
    &self,
    remote: &R,
    remote_notes: &mut Vec<Note>,
  ) -> Result<usize, SyncError> {
    let tombstones = self.store.load_tombstones().map_err(local_err)?;
    if tombstones.is_empty() {
      return Ok(0);
    }

    let mut deleted = 0;
    for tombstone in &tombstones {
      if remote_notes.iter().any(|n| tombstone.covers(n)) {
        remote.delete_note(tombstone.id).await?;
        deleted += 1;
      }
    }

    remote_notes.retain(|n| !tombstones.iter().any(|t| t.covers(n)));
    self.store.save_tombstones(&[]).map_err(local_err)?;

    Ok(deleted)
  }

  /// Periodic auto-save: skipped for an empty collection or when the last
  /// successful sync is more recent than the minimum interval.
  pub async fn auto_sync(&self, now: DateTime<Utc>) -> Result<Option<SyncReport>, SyncError> {
    let local = self.store.load_notes().map_err(local_err)?;
    if local.is_empty() {
      return Ok(None);
    }

    if let Some(last) = self.store.last_sync().map_err(local_err)? {
      if now - last < self.min_interval {
        debug!("Synced less than {}s ago; skipping", self.min_interval.num_seconds());
        return Ok(None);
      }
    }

    self.sync(now).await.map(Some)
  }

  /// Replace the local collection with the remote one.
  ///
  /// Nothing changes locally when the remote set is empty. Returns the
  /// number of notes restored.
  pub async fn restore(&self) -> Result<usize, SyncError> {
    let remote = self.remote()?;
    let user = self.user(remote).await?;

    let mut notes = remote.fetch_notes(&user.id).await?;
    if notes.is_empty() {
      return Ok(0);
    }

    notes.sort_by(|a, b| b.last_modified().cmp(&a.last_modified()));
    self.store.save_notes(&notes).map_err(local_err)?;
    self.store.save_tombstones(&[]).map_err(local_err)?;

    info!(notes = notes.len(), "Notes restored from remote");
    Ok(notes.len())
  }

  pub async fn health(&self) -> HealthReport {
    let timestamp = Utc::now();
    let Ok(remote) = self.remote() else {
      return HealthReport {
        timestamp,
        configured: false,
        connected: false,
        authenticated: false,
      };
    };

    let connected = match remote.probe().await {
      Ok(()) => true,
      Err(e) => {
        debug!("Connection test failed: {}", e);
        false
      }
    };
    let authenticated = matches!(remote.current_user().await, Ok(Some(_)));

    HealthReport {
      timestamp,
      configured: true,
      connected,
      authenticated,
    }
  }
}
