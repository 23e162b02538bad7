//! Serde types matching the remote note table and auth responses.
//!
//! The remote side names its columns in snake_case (`created_at`,
//! `updated_at`, `user_id`); local notes use camelCase. These types are the
//! only place the two conventions meet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::notes::{Note, NoteId};

// ============================================================================
// Notes table
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiNoteRow {
  pub id: i64,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub color: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Auth endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiNoteRow {
  pub fn from_note(note: &Note, user_id: &str) -> Self {
    Self {
      id: note.id.0,
      title: note.title.clone(),
      content: note.content.clone(),
      color: Some(note.color.clone()),
      user_id: Some(user_id.to_string()),
      created_at: note.created_at,
      updated_at: note.updated_at,
    }
  }

  pub fn into_note(self) -> Note {
    Note {
      id: NoteId(self.id),
      title: self.title,
      content: self.content,
      color: self
        .color
        .unwrap_or_else(|| crate::notes::DEFAULT_COLOR.to_string()),
      created_at: self.created_at,
      updated_at: self.updated_at,
    }
  }
}

/// Convert fetched rows into notes, skipping rows that do not fit the shape.
pub fn rows_into_notes(rows: Vec<serde_json::Value>) -> Vec<Note> {
  rows
    .into_iter()
    .filter_map(|row| match serde_json::from_value::<ApiNoteRow>(row) {
      Ok(row) => Some(row.into_note()),
      Err(e) => {
        warn!("Skipping malformed remote note: {}", e);
        None
      }
    })
    .collect()
}
