use chrono::TimeDelta;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CacheSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the app's own assets are served from; manifest paths resolve against it
  pub origin: String,
  /// Directory for the database and log files (defaults to $XDG_DATA_HOME/folio)
  pub data_dir: Option<PathBuf>,
  pub remote: Option<RemoteConfig>,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
  pub logging: LoggingConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      data_dir: None,
      remote: None,
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
      notifications: NotificationConfig::default(),
      logging: LoggingConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Project URL of the backend, e.g. https://abc.supabase.co
  pub url: String,
  #[serde(default = "default_table")]
  pub table: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_table() -> String {
  "notes".to_string()
}

fn default_timeout_secs() -> u64 {
  15
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Bucket name prefix; the bucket is `<prefix>-<version>`
  pub prefix: String,
  /// Changing this invalidates every previously cached response on activation
  pub version: String,
  pub retention_days: i64,
  /// Local asset paths fetched at install time, in order
  pub manifest: Vec<String>,
  /// Absolute URLs fetched at install time after the local assets
  pub external: Vec<String>,
  /// Document served for unknown routes while offline
  pub shell: String,
  /// Image served when an image request misses the cache and the network
  pub fallback_image: String,
  /// Hosts whose requests are never intercepted (matched as domain suffixes)
  pub bypass_hosts: Vec<String>,
  pub timeout_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "folio-app".to_string(),
      version: "v2.0.0".to_string(),
      retention_days: 7,
      manifest: [
        "/",
        "/index.html",
        "/styles/main.css",
        "/styles/responsive.css",
        "/scripts/main.js",
        "/scripts/supabase-client.js",
        "/scripts/app-functions.js",
        "/manifest.json",
        "/assets/images/default-avatar.png",
        "/assets/icons/icon-192x192.png",
        "/assets/icons/icon-512x512.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      external: vec![
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css".to_string(),
        "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap"
          .to_string(),
      ],
      shell: "/index.html".to_string(),
      fallback_image: "/assets/images/default-avatar.png".to_string(),
      bypass_hosts: vec!["supabase.co".to_string()],
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// How often `watch` attempts an auto-save sync
  pub interval_secs: u64,
  /// Auto-save is skipped when the last successful sync is more recent than this
  pub min_interval_secs: i64,
  /// How often `watch` prunes the asset cache
  pub cleanup_interval_secs: u64,
  /// How often `watch` checks connectivity to the remote store
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: 300,
      min_interval_secs: 60,
      cleanup_interval_secs: 3600,
      probe_interval_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub app_name: String,
  pub default_body: String,
  pub icon: String,
  pub badge: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      app_name: "Folio".to_string(),
      default_body: "New notification".to_string(),
      icon: "/assets/icons/icon-192x192.png".to_string(),
      badge: "/assets/icons/icon-72x72.png".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter when FOLIO_LOG is unset
  pub level: String,
  /// Also write a daily-rotated log file into the data directory
  pub file: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: false,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./folio.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/folio/config.yaml
  ///
  /// Without a file every setting takes its default.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("folio.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("folio").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Resolve the cache manager's settings against the configured origin.
  ///
  /// The remote store's host is always bypassed so sync traffic never goes
  /// through the cache.
  pub fn cache_settings(&self) -> Result<CacheSettings> {
    let origin =
      Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid asset path '{}': {}", path, e))
    };

    let mut manifest = Vec::with_capacity(self.cache.manifest.len() + self.cache.external.len());
    for path in &self.cache.manifest {
      manifest.push(resolve(path)?);
    }
    for external in &self.cache.external {
      manifest.push(Url::parse(external).map_err(|e| eyre!("Invalid URL '{}': {}", external, e))?);
    }

    let mut bypass_hosts = self.cache.bypass_hosts.clone();
    if let Some(host) = self.remote_host() {
      if !bypass_hosts.contains(&host) {
        bypass_hosts.push(host);
      }
    }

    Ok(CacheSettings {
      bucket: format!("{}-{}", self.cache.prefix, self.cache.version),
      manifest,
      shell: resolve(&self.cache.shell)?,
      fallback_image: resolve(&self.cache.fallback_image)?,
      bypass_hosts,
      retention: self.retention()?,
    })
  }

  fn retention(&self) -> Result<TimeDelta> {
    let days = self.cache.retention_days;
    if days < 0 {
      return Err(eyre!("cache.retention_days must not be negative (got {})", days));
    }
    TimeDelta::try_days(days).ok_or_else(|| eyre!("cache.retention_days is out of range: {}", days))
  }

  /// Minimum spacing between auto-save syncs.
  pub fn min_sync_interval(&self) -> Result<TimeDelta> {
    let secs = self.sync.min_interval_secs;
    if secs < 0 {
      return Err(eyre!("sync.min_interval_secs must not be negative (got {})", secs));
    }
    TimeDelta::try_seconds(secs)
      .ok_or_else(|| eyre!("sync.min_interval_secs is out of range: {}", secs))
  }

  fn remote_host(&self) -> Option<String> {
    let remote = self.remote.as_ref()?;
    let url = Url::parse(&remote.url).ok()?;
    url.host_str().map(String::from)
  }

  pub fn cache_timeout(&self) -> Duration {
    Duration::from_secs(self.cache.timeout_secs)
  }

  /// Get the backend's public API key from environment variables.
  ///
  /// Checks FOLIO_SUPABASE_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("FOLIO_SUPABASE_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Backend API key not found. Set FOLIO_SUPABASE_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Get the signed-in user's session token from environment variables.
  ///
  /// Checks FOLIO_SESSION_TOKEN. Sync without it fails as not authenticated.
  pub fn get_session_token() -> Option<String> {
    std::env::var("FOLIO_SESSION_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
