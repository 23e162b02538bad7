//! Typed errors for the sync workflow and the offline cache.
//!
//! Application plumbing (config, CLI, opening the database) reports through
//! `color_eyre`; these types exist where callers branch on the failure kind.

/// Failures of the note sync workflow.
///
/// None of these leave local data in a worse state than before the sync
/// started; the host decides whether to surface them to the user.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  /// The remote store is not configured, or the backend/network is unreachable.
  #[error("REMOTE_UNAVAILABLE: {0}")]
  RemoteUnavailable(String),

  /// The remote store refused a write.
  #[error("WRITE_REJECTED: {0}")]
  WriteRejected(String),

  /// No valid remote session.
  #[error("NOT_AUTHENTICATED")]
  NotAuthenticated,

  /// Local storage itself is unusable.
  #[error("LOCAL_STORAGE: {0}")]
  LocalStorage(String),
}

impl SyncError {
  /// Whether retrying later (e.g. once connectivity returns) can succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::RemoteUnavailable(_) | Self::WriteRejected(_))
  }
}

/// A request could not be completed over the network.
#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch {url} failed: {reason}")]
pub struct FetchError {
  pub url: String,
  pub reason: String,
}

impl FetchError {
  pub fn new(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
    Self {
      url: url.into(),
      reason: reason.to_string(),
    }
  }
}

/// Failures of the offline cache manager.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// A manifest asset could not be fetched during install; nothing was stored.
  #[error("INSTALL_INCOMPLETE: {url}: {reason}")]
  InstallIncomplete { url: String, reason: String },

  /// Cache miss and network failure with no fallback left.
  #[error("CACHE_MISS: {0}")]
  Network(#[from] FetchError),

  /// Bucket storage failed during an administrative operation.
  #[error("CACHE_ERROR: {0}")]
  Storage(String),
}

impl CacheError {
  pub fn storage(err: impl std::fmt::Display) -> Self {
    Self::Storage(err.to_string())
  }
}
