//! Note, settings and tombstone shapes as persisted locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_COLOR: &str = "#4f46e5";

fn default_color() -> String {
  DEFAULT_COLOR.to_string()
}

fn default_true() -> bool {
  true
}

/// Note identifier, minted from the creation time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A user-authored text record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
  pub id: NoteId,
  pub title: String,
  pub content: String,
  #[serde(default = "default_color")]
  pub color: String,
  /// Set once at creation
  pub created_at: DateTime<Utc>,
  /// Last whole-record replacement; absent on records that were never edited
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
  /// Create a note with both timestamps set to `now`.
  pub fn new(title: impl Into<String>, content: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      id: NoteId(now.timestamp_millis()),
      title: title.into(),
      content: content.into(),
      color: default_color(),
      created_at: now,
      updated_at: Some(now),
    }
  }

  /// Ordering key for reconciliation.
  pub fn last_modified(&self) -> DateTime<Utc> {
    self.updated_at.unwrap_or(self.created_at)
  }

  /// Replace the given fields and bump `updated_at`.
  pub fn edit(&mut self, edit: NoteEdit, now: DateTime<Utc>) {
    if let Some(title) = edit.title {
      self.title = title;
    }
    if let Some(content) = edit.content {
      self.content = content;
    }
    if let Some(color) = edit.color {
      self.color = color;
    }
    self.updated_at = Some(now);
  }
}

/// Fields to replace on an existing note
#[derive(Debug, Clone, Default)]
pub struct NoteEdit {
  pub title: Option<String>,
  pub content: Option<String>,
  pub color: Option<String>,
}

impl NoteEdit {
  pub fn is_empty(&self) -> bool {
    self.title.is_none() && self.content.is_none() && self.color.is_none()
  }
}

/// Record of a local deletion, kept until it has been propagated remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
  pub id: NoteId,
  pub deleted_at: DateTime<Utc>,
}

impl Tombstone {
  /// Whether this deletion supersedes the given copy of the note.
  ///
  /// A copy edited after the deletion wins, like any later write.
  pub fn covers(&self, note: &Note) -> bool {
    note.id == self.id && note.last_modified() <= self.deleted_at
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Light,
  Dark,
}

impl fmt::Display for Theme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Theme::Light => write!(f, "light"),
      Theme::Dark => write!(f, "dark"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
  #[serde(default)]
  pub theme: Theme,
  #[serde(default = "default_true")]
  pub offline_mode: bool,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      theme: Theme::Light,
      offline_mode: true,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
  }

  #[test]
  fn test_new_note_has_equal_timestamps() {
    let note = Note::new("Groceries", "milk", t0());
    assert_eq!(note.id, NoteId(t0().timestamp_millis()));
    assert_eq!(note.updated_at, Some(note.created_at));
    assert_eq!(note.color, DEFAULT_COLOR);
  }

  #[test]
  fn test_last_modified_falls_back_to_created_at() {
    let mut note = Note::new("a", "b", t0());
    note.updated_at = None;
    assert_eq!(note.last_modified(), t0());
  }

  #[test]
  fn test_edit_replaces_fields_and_bumps_timestamp() {
    let mut note = Note::new("a", "b", t0());
    let later = t0() + Duration::minutes(5);

    note.edit(
      NoteEdit {
        content: Some("c".to_string()),
        ..Default::default()
      },
      later,
    );

    assert_eq!(note.title, "a");
    assert_eq!(note.content, "c");
    assert_eq!(note.created_at, t0());
    assert_eq!(note.updated_at, Some(later));
  }

  #[test]
  fn test_note_uses_camel_case_keys() {
    let json = r##"{
      "id": 1714824000000,
      "title": "Hello",
      "content": "World",
      "color": "#ff0000",
      "createdAt": "2026-05-04T12:00:00.000Z",
      "updatedAt": "2026-05-04T12:30:00Z"
    }"##;

    let note: Note = serde_json::from_str(json).unwrap();
    assert_eq!(note.id, NoteId(1714824000000));
    assert_eq!(note.created_at, t0());
    assert_eq!(note.updated_at, Some(t0() + Duration::minutes(30)));

    let value = serde_json::to_value(&note).unwrap();
    assert!(value.get("createdAt").is_some());
    assert!(value.get("created_at").is_none());
  }

  #[test]
  fn test_note_without_color_gets_default() {
    let json = r#"{"id": 1, "title": "t", "content": "c", "createdAt": "2026-05-04T12:00:00Z"}"#;
    let note: Note = serde_json::from_str(json).unwrap();
    assert_eq!(note.color, DEFAULT_COLOR);
    assert_eq!(note.updated_at, None);
  }

  #[test]
  fn test_tombstone_covers_older_copies_only() {
    let note = Note::new("a", "b", t0());
    let tombstone = Tombstone {
      id: note.id,
      deleted_at: t0() + Duration::minutes(1),
    };
    assert!(tombstone.covers(&note));

    let mut edited = note.clone();
    edited.updated_at = Some(t0() + Duration::minutes(2));
    assert!(!tombstone.covers(&edited));
  }

  #[test]
  fn test_settings_defaults() {
    let settings: Settings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings, Settings::default());

    let settings: Settings =
      serde_json::from_str(r#"{"theme":"dark","offlineMode":false}"#).unwrap();
    assert_eq!(settings.theme, Theme::Dark);
    assert!(!settings.offline_mode);
  }
}
