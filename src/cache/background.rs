//! Deferred tasks that run once connectivity returns.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use crate::error::SyncError;

/// Tag for the deferred note sync.
pub const SYNC_NOTES_TAG: &str = "sync-notes";

/// Result of firing the pending tags.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
  /// Tags whose task completed
  pub completed: Vec<String>,
  /// Tags whose task failed transiently and stay registered
  pub retrying: Vec<String>,
  /// Tags that failed for good and were dropped
  pub dropped: Vec<String>,
}

/// Registry of named deferred-sync tasks.
///
/// A tag stays pending until the host signals that connectivity is back;
/// each pending tag then fires once.
#[derive(Debug, Default)]
pub struct BackgroundSync {
  pending: Mutex<BTreeSet<String>>,
}

impl BackgroundSync {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register interest in running `tag` once online. Registering twice is a no-op.
  pub fn register(&self, tag: &str) {
    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    if pending.insert(tag.to_string()) {
      info!(tag, "Registered background sync");
    }
  }

  pub fn pending(&self) -> Vec<String> {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .cloned()
      .collect()
  }

  /// Fire every pending tag through `handler`.
  ///
  /// Transient failures re-register the tag for the next connectivity
  /// signal; anything else drops it.
  pub async fn dispatch<F, Fut>(&self, mut handler: F) -> DispatchReport
  where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(), SyncError>>,
  {
    let tags = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
    let mut report = DispatchReport::default();

    for tag in tags {
      info!(tag = %tag, "Background sync");
      match handler(tag.clone()).await {
        Ok(()) => report.completed.push(tag),
        Err(e) if e.is_transient() => {
          warn!(tag = %tag, "Background sync failed, will retry: {}", e);
          self.register(&tag);
          report.retrying.push(tag);
        }
        Err(e) => {
          warn!(tag = %tag, "Background sync failed: {}", e);
          report.dropped.push(tag);
        }
      }
    }

    report
  }
}
