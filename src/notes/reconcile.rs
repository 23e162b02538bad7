//! Last-writer-wins merge of the local and remote note collections.

use std::collections::HashMap;

use super::model::{Note, NoteId};

/// Merge two copies of the note collection into one.
///
/// The remote set is the baseline. A local note replaces its remote
/// counterpart only when it was modified strictly later, and even then keeps
/// the remote creation time. Ties go to the remote copy. Notes known to only
/// one side are kept as they are, so every id from either input appears
/// exactly once in the result.
///
/// Records are replaced whole; fields are never combined. The result is
/// ordered newest first (by last modification, then id) so identical inputs
/// always produce identical output.
pub fn reconcile(local: &[Note], remote: &[Note]) -> Vec<Note> {
  let mut merged: HashMap<NoteId, Note> = remote.iter().map(|n| (n.id, n.clone())).collect();

  for note in local {
    match merged.get_mut(&note.id) {
      None => {
        merged.insert(note.id, note.clone());
      }
      Some(existing) => {
        if note.last_modified() > existing.last_modified() {
          *existing = Note {
            created_at: existing.created_at,
            ..note.clone()
          };
        }
      }
    }
  }

  let mut notes: Vec<Note> = merged.into_values().collect();
  notes.sort_by(|a, b| {
    b.last_modified()
      .cmp(&a.last_modified())
      .then_with(|| b.id.cmp(&a.id))
  });
  notes
}
