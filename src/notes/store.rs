//! Typed access to the notes, settings and tombstones held in local storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::model::{Note, NoteEdit, NoteId, Settings, Tombstone};
use crate::db::KeyValueStore;

pub const NOTES_KEY: &str = "folio-notes";
pub const SETTINGS_KEY: &str = "folio-settings";
pub const TOMBSTONES_KEY: &str = "folio-tombstones";
pub const LAST_SYNC_KEY: &str = "notes-last-save";

/// Note collection persisted whole under fixed keys.
///
/// Stored JSON is validated on the way in: a record that does not match the
/// note shape is skipped with a warning, while a value that is not JSON at
/// all is an error so it never gets silently overwritten.
pub struct NoteStore<K: KeyValueStore> {
  kv: Arc<K>,
}

impl<K: KeyValueStore> NoteStore<K> {
  pub fn new(kv: Arc<K>) -> Self {
    Self { kv }
  }

  pub fn load_notes(&self) -> Result<Vec<Note>> {
    self.load_records(NOTES_KEY)
  }

  pub fn save_notes(&self, notes: &[Note]) -> Result<()> {
    self.save(NOTES_KEY, notes)
  }

  /// Add a new note at the front of the collection.
  ///
  /// The id is bumped past any existing one minted in the same millisecond.
  pub fn add(
    &self,
    title: &str,
    content: &str,
    color: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<Note> {
    let mut notes = self.load_notes()?;

    let mut note = Note::new(title, content, now);
    if let Some(color) = color {
      note.color = color.to_string();
    }
    while notes.iter().any(|n| n.id == note.id) {
      note.id = NoteId(note.id.0 + 1);
    }

    notes.insert(0, note.clone());
    self.save_notes(&notes)?;
    Ok(note)
  }

  pub fn edit(&self, id: NoteId, edit: NoteEdit, now: DateTime<Utc>) -> Result<Note> {
    let mut notes = self.load_notes()?;
    let note = notes
      .iter_mut()
      .find(|n| n.id == id)
      .ok_or_else(|| eyre!("Note {} not found", id))?;

    note.edit(edit, now);
    let updated = note.clone();

    self.save_notes(&notes)?;
    Ok(updated)
  }

  /// Remove a note and remember the deletion for the next sync.
  pub fn delete(&self, id: NoteId, now: DateTime<Utc>) -> Result<bool> {
    let mut notes = self.load_notes()?;
    let before = notes.len();
    notes.retain(|n| n.id != id);
    if notes.len() == before {
      return Ok(false);
    }

    self.save_notes(&notes)?;

    let mut tombstones = self.load_tombstones()?;
    tombstones.retain(|t| t.id != id);
    tombstones.push(Tombstone { id, deleted_at: now });
    self.save_tombstones(&tombstones)?;

    Ok(true)
  }

  pub fn load_settings(&self) -> Result<Settings> {
    match self.kv.get(SETTINGS_KEY)? {
      Some(raw) => match serde_json::from_str(&raw) {
        Ok(settings) => Ok(settings),
        Err(e) => {
          warn!("Ignoring malformed settings: {}", e);
          Ok(Settings::default())
        }
      },
      None => Ok(Settings::default()),
    }
  }

  pub fn save_settings(&self, settings: &Settings) -> Result<()> {
    self.save(SETTINGS_KEY, settings)
  }

  pub fn load_tombstones(&self) -> Result<Vec<Tombstone>> {
    self.load_records(TOMBSTONES_KEY)
  }

  pub fn save_tombstones(&self, tombstones: &[Tombstone]) -> Result<()> {
    if tombstones.is_empty() {
      return self.kv.remove(TOMBSTONES_KEY);
    }
    self.save(TOMBSTONES_KEY, tombstones)
  }

  /// When the last successful sync finished.
  pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = self.kv.get(LAST_SYNC_KEY)? else {
      return Ok(None);
    };
    // Stored as epoch milliseconds
    Ok(
      raw
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis),
    )
  }

  pub fn set_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
    self.kv.set(LAST_SYNC_KEY, &at.timestamp_millis().to_string())
  }

  fn load_records<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
    let Some(raw) = self.kv.get(key)? else {
      return Ok(Vec::new());
    };

    let value: serde_json::Value = serde_json::from_str(&raw)
      .map_err(|e| eyre!("Stored value under '{}' is not valid JSON: {}", key, e))?;

    let serde_json::Value::Array(items) = value else {
      warn!(key, "Stored value is not a list; ignoring it");
      return Ok(Vec::new());
    };

    let records = items
      .into_iter()
      .enumerate()
      .filter_map(|(index, item)| match serde_json::from_value(item) {
        Ok(record) => Some(record),
        Err(e) => {
          warn!(key, index, "Skipping malformed record: {}", e);
          None
        }
      })
      .collect();

    Ok(records)
  }

  fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
    let raw =
      serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize '{}': {}", key, e))?;
    self.kv.set(key, &raw)
  }
}

impl<K: KeyValueStore> Clone for NoteStore<K> {
  fn clone(&self) -> Self {
    Self {
      kv: Arc::clone(&self.kv),
    }
  }
}
