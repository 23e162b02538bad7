//! Local notes and their reconciliation with the remote note table.
//!
//! - `model`: the strict shapes stored locally (notes, settings, tombstones)
//! - `store`: whole-value persistence through a key/value store
//! - `reconcile`: pure last-writer-wins merge of two note collections
//! - `sync`: the workflow that fetches, merges, and writes both sides

mod model;
mod reconcile;
mod store;
mod sync;

pub use model::{Note, NoteEdit, NoteId, Theme, DEFAULT_COLOR};
pub use store::NoteStore;
pub use sync::{RemoteNoteStore, RemoteUser, SyncService};
