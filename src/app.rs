use chrono::Utc;
use color_eyre::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{BackgroundSync, SYNC_NOTES_TAG};
use crate::context::AppContext;
use crate::db::{Database, KeyValueStore};
use crate::error::SyncError;
use crate::event::{Event, EventHandler};
use crate::notes::{RemoteNoteStore, SyncService};
use crate::remote::SupabaseClient;

/// Fixed-period schedule checked on every tick
#[derive(Debug)]
struct Every {
  period: Duration,
  next: Instant,
}

impl Every {
  fn starting_at(period: Duration, first: Instant) -> Self {
    Self {
      period,
      next: first,
    }
  }

  fn due(&mut self, now: Instant) -> bool {
    if now < self.next {
      return false;
    }
    self.next = now + self.period;
    true
  }
}

/// Connectivity tracking and the deferred note sync it triggers.
struct DeferredSync<'a, K: KeyValueStore, R: RemoteNoteStore> {
  sync: &'a SyncService<K, R>,
  background: &'a BackgroundSync,
  /// Last probe result; `None` before the first probe
  online: Option<bool>,
}

impl<'a, K: KeyValueStore, R: RemoteNoteStore> DeferredSync<'a, K, R> {
  fn new(sync: &'a SyncService<K, R>, background: &'a BackgroundSync) -> Self {
    Self {
      sync,
      background,
      online: None,
    }
  }

  async fn check_connectivity(&mut self) {
    if !self.sync.is_configured() {
      return;
    }

    let connected = self.sync.health().await.connected;
    let previous = self.online.replace(connected);
    if previous == Some(connected) {
      return;
    }

    if connected {
      info!("Remote store reachable");
      self.replay().await;
    } else {
      warn!("Remote store unreachable; working offline");
    }
  }

  /// Fire the background tasks registered while offline.
  async fn replay(&self) {
    let sync = self.sync;
    let report = self
      .background
      .dispatch(|tag| async move {
        if tag == SYNC_NOTES_TAG {
          sync.sync(Utc::now()).await.map(|_| ())
        } else {
          warn!(tag = %tag, "No handler for background sync tag");
          Ok(())
        }
      })
      .await;

    if !report.completed.is_empty() || !report.retrying.is_empty() {
      info!(
        completed = report.completed.len(),
        retrying = report.retrying.len(),
        dropped = report.dropped.len(),
        "Deferred work replayed"
      );
    }
  }

  async fn auto_save(&self) {
    match self.sync.auto_sync(Utc::now()).await {
      Ok(Some(report)) => info!(notes = report.notes.len(), "Auto-saved notes"),
      Ok(None) => debug!("Auto-save skipped"),
      Err(SyncError::NotAuthenticated) => debug!("Auto-save skipped; not signed in"),
      Err(e) if e.is_transient() => {
        warn!("Auto-save failed, deferring: {}", e);
        self.background.register(SYNC_NOTES_TAG);
      }
      Err(e) => warn!("Auto-save failed: {}", e),
    }
  }
}

/// Long-running mode: keeps the cache installed and pruned, auto-saves notes
/// and replays deferred syncs once the remote store is reachable again.
pub struct App<'a> {
  ctx: &'a AppContext,
  deferred: DeferredSync<'a, Database, SupabaseClient>,
  probe: Every,
  auto_sync: Every,
  cleanup: Every,
}

impl<'a> App<'a> {
  pub fn new(ctx: &'a AppContext) -> Self {
    let now = Instant::now();
    let sync = &ctx.config.sync;
    let secs = Duration::from_secs;

    Self {
      ctx,
      deferred: DeferredSync::new(&ctx.sync, &ctx.background),
      probe: Every::starting_at(secs(sync.probe_interval_secs), now),
      auto_sync: Every::starting_at(secs(sync.interval_secs), now + secs(sync.interval_secs)),
      cleanup: Every::starting_at(secs(sync.cleanup_interval_secs), now),
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    match self.ctx.cache.install().await {
      Ok(report) => info!(cached = report.cached, "Cache installed"),
      // Keep serving whatever an earlier install left behind
      Err(e) => warn!("Cache install failed: {}", e),
    }
    self.ctx.cache.activate()?;

    let mut events = EventHandler::new(Duration::from_secs(1));
    info!("Watching; press ctrl-c to stop");

    while let Some(event) = events.next().await {
      match event {
        Event::Tick => self.tick(Instant::now()).await,
        Event::Shutdown => {
          info!("Shutting down");
          break;
        }
      }
    }

    Ok(())
  }

  async fn tick(&mut self, now: Instant) {
    if self.probe.due(now) {
      self.deferred.check_connectivity().await;
    }
    if self.auto_sync.due(now) {
      self.deferred.auto_save().await;
    }
    if self.cleanup.due(now) {
      if let Err(e) = self.ctx.cache.cleanup(Utc::now()) {
        warn!("Cache cleanup failed: {}", e);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::notes::NoteStore;
  use crate::testing::FakeRemote;
  use std::sync::Arc;

  fn sync_over(remote: &Arc<FakeRemote>) -> (NoteStore<Database>, SyncService<Database, FakeRemote>) {
    let store = NoteStore::new(Arc::new(Database::open_in_memory().unwrap()));
    let sync = SyncService::new(
      store.clone(),
      Some(Arc::clone(remote)),
      chrono::Duration::seconds(60),
    );
    (store, sync)
  }

  #[tokio::test]
  async fn test_offline_auto_save_is_replayed_when_back_online() {
    let remote = Arc::new(FakeRemote::signed_in("user-1"));
    let (store, sync) = sync_over(&remote);
    let background = BackgroundSync::new();
    let mut deferred = DeferredSync::new(&sync, &background);

    store.add("Draft", "written offline", None, Utc::now()).unwrap();

    remote.set_offline(true);
    deferred.auto_save().await;
    assert_eq!(background.pending(), vec![SYNC_NOTES_TAG.to_string()]);

    deferred.check_connectivity().await;
    assert_eq!(deferred.online, Some(false));
    assert_eq!(background.pending(), vec![SYNC_NOTES_TAG.to_string()]);
    assert!(remote.rows().is_empty());

    remote.set_offline(false);
    deferred.check_connectivity().await;

    assert_eq!(deferred.online, Some(true));
    assert!(background.pending().is_empty());
    assert_eq!(remote.upsert_calls(), 1);
    assert_eq!(remote.rows().len(), 1);
    assert_eq!(remote.rows()[0].title, "Draft");
    assert!(store.last_sync().unwrap().is_some());
  }

  #[tokio::test]
  async fn test_steady_connectivity_does_not_replay() {
    let remote = Arc::new(FakeRemote::signed_in("user-1"));
    let (store, sync) = sync_over(&remote);
    let background = BackgroundSync::new();
    let mut deferred = DeferredSync::new(&sync, &background);
    store.add("a", "b", None, Utc::now()).unwrap();

    deferred.check_connectivity().await;
    assert_eq!(remote.upsert_calls(), 0);

    // Registered while already online: waits for the next offline to online transition
    background.register(SYNC_NOTES_TAG);
    deferred.check_connectivity().await;
    assert_eq!(remote.upsert_calls(), 0);
    assert_eq!(background.pending(), vec![SYNC_NOTES_TAG.to_string()]);
  }

  #[test]
  fn test_every_fires_once_per_period() {
    let start = Instant::now();
    let mut every = Every::starting_at(Duration::from_secs(10), start);

    assert!(every.due(start));
    assert!(!every.due(start + Duration::from_secs(5)));
    assert!(every.due(start + Duration::from_secs(10)));
    assert!(!every.due(start + Duration::from_secs(19)));
  }

  #[test]
  fn test_every_delayed_start() {
    let start = Instant::now();
    let mut every = Every::starting_at(Duration::from_secs(10), start + Duration::from_secs(10));

    assert!(!every.due(start));
    assert!(every.due(start + Duration::from_secs(12)));
    assert!(!every.due(start + Duration::from_secs(21)));
    assert!(every.due(start + Duration::from_secs(22)));
  }
}
