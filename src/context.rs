//! Wiring of the database, note sync and cache manager for one process.

use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{BackgroundSync, CacheManager, HttpFetcher};
use crate::config::Config;
use crate::db::Database;
use crate::notes::{NoteStore, SyncService};
use crate::remote::SupabaseClient;

pub type Notes = NoteStore<Database>;
pub type NoteSync = SyncService<Database, SupabaseClient>;
pub type Cache = CacheManager<Database, HttpFetcher>;

pub struct AppContext {
  pub config: Config,
  pub notes: Notes,
  pub sync: NoteSync,
  pub cache: Cache,
  pub background: BackgroundSync,
}

/// Data directory from the config, or the platform default.
pub fn data_dir(config: &Config) -> Result<PathBuf> {
  match &config.data_dir {
    Some(dir) => Ok(dir.clone()),
    None => Database::default_dir(),
  }
}

/// Remote client if the backend is configured and a key is available.
///
/// A missing key is not an error: the app keeps working local-only.
fn remote_client(config: &Config) -> Result<Option<Arc<SupabaseClient>>> {
  let Some(remote) = &config.remote else {
    debug!("No remote store configured");
    return Ok(None);
  };

  let api_key = match Config::get_api_key() {
    Ok(key) => key,
    Err(e) => {
      warn!("Remote store disabled: {}", e);
      return Ok(None);
    }
  };

  let client = SupabaseClient::new(remote, api_key, Config::get_session_token())?;
  Ok(Some(Arc::new(client)))
}

impl AppContext {
  pub fn init(config: Config) -> Result<Self> {
    let db = Arc::new(Database::open(&data_dir(&config)?)?);

    let notes = NoteStore::new(Arc::clone(&db));
    let sync = SyncService::new(
      notes.clone(),
      remote_client(&config)?,
      config.min_sync_interval()?,
    );

    let fetcher = Arc::new(HttpFetcher::new(config.cache_timeout())?);
    let cache = CacheManager::new(db, fetcher, config.cache_settings()?);

    Ok(Self {
      config,
      notes,
      sync,
      cache,
      background: BackgroundSync::new(),
    })
  }

  /// Let background work finish before the process exits.
  pub async fn shutdown(&self) {
    self.cache.settle().await;
  }
}
