//! In-memory stand-ins for the network and the remote store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cache::{CachedResponse, Fetcher, Request};
use crate::error::{FetchError, SyncError};
use crate::notes::{Note, NoteId, RemoteNoteStore, RemoteUser};

/// Fetcher answering from a fixed table; unknown URLs behave as offline.
#[derive(Default)]
pub struct FakeFetcher {
  responses: Mutex<HashMap<String, CachedResponse>>,
  calls: AtomicUsize,
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, response: CachedResponse) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Fetcher for FakeFetcher {
  async fn fetch(&self, request: &Request) -> Result<CachedResponse, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .responses
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| FetchError::new(request.url.as_str(), "connection refused"))
  }
}

/// Remote note table held in memory, with switchable failures.
pub struct FakeRemote {
  user: Option<RemoteUser>,
  rows: Mutex<Vec<Note>>,
  offline: AtomicBool,
  fail_fetch: AtomicBool,
  fail_upsert: AtomicBool,
  upsert_calls: AtomicUsize,
}

impl FakeRemote {
  fn with_user(user: Option<RemoteUser>) -> Self {
    Self {
      user,
      rows: Mutex::new(Vec::new()),
      offline: AtomicBool::new(false),
      fail_fetch: AtomicBool::new(false),
      fail_upsert: AtomicBool::new(false),
      upsert_calls: AtomicUsize::new(0),
    }
  }

  pub fn signed_in(user_id: &str) -> Self {
    Self::with_user(Some(RemoteUser {
      id: user_id.to_string(),
      email: None,
    }))
  }

  pub fn signed_out() -> Self {
    Self::with_user(None)
  }

  /// Replace every remote row.
  pub fn seed(&self, notes: Vec<Note>) {
    *self.rows.lock().unwrap() = notes;
  }

  pub fn rows(&self) -> Vec<Note> {
    self.rows.lock().unwrap().clone()
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn fail_fetch(&self) {
    self.fail_fetch.store(true, Ordering::SeqCst);
  }

  pub fn fail_upsert(&self) {
    self.fail_upsert.store(true, Ordering::SeqCst);
  }

  pub fn upsert_calls(&self) -> usize {
    self.upsert_calls.load(Ordering::SeqCst)
  }

  fn check_online(&self) -> Result<(), SyncError> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(SyncError::RemoteUnavailable("offline".to_string()));
    }
    Ok(())
  }
}

#[async_trait]
impl RemoteNoteStore for FakeRemote {
  async fn current_user(&self) -> Result<Option<RemoteUser>, SyncError> {
    self.check_online()?;
    Ok(self.user.clone())
  }

  async fn fetch_notes(&self, _user_id: &str) -> Result<Vec<Note>, SyncError> {
    self.check_online()?;
    if self.fail_fetch.load(Ordering::SeqCst) {
      return Err(SyncError::RemoteUnavailable("fetch failed".to_string()));
    }
    Ok(self.rows())
  }

  async fn upsert_notes(&self, _user_id: &str, notes: &[Note]) -> Result<(), SyncError> {
    self.check_online()?;
    self.upsert_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_upsert.load(Ordering::SeqCst) {
      return Err(SyncError::WriteRejected("upsert failed".to_string()));
    }

    let mut rows = self.rows.lock().unwrap();
    for note in notes {
      match rows.iter_mut().find(|r| r.id == note.id) {
        Some(row) => *row = note.clone(),
        None => rows.push(note.clone()),
      }
    }
    Ok(())
  }

  async fn delete_note(&self, id: NoteId) -> Result<(), SyncError> {
    self.check_online()?;
    self.rows.lock().unwrap().retain(|r| r.id != id);
    Ok(())
  }

  async fn probe(&self) -> Result<(), SyncError> {
    self.check_online()
  }
}
