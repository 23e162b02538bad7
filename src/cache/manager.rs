//! Cache manager that decides, per request, between cache and network.

use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use reqwest::Method;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::BucketStorage;
use super::traits::{CacheSource, CachedResponse, Destination, Fetcher, Intercepted, Request};
use crate::error::{CacheError, FetchError};

/// Resolved settings for one cache manager.
#[derive(Debug, Clone)]
pub struct CacheSettings {
  /// Name of the current bucket; every other bucket is obsolete
  pub bucket: String,
  /// Assets that must be cached before install succeeds, in order
  pub manifest: Vec<Url>,
  /// App shell served for documents with no cached copy
  pub shell: Url,
  /// Served for image requests that miss both cache and network
  pub fallback_image: Url,
  /// Requests to these hosts (or their subdomains) are never intercepted
  pub bypass_hosts: Vec<String>,
  /// Entries captured longer ago than this are pruned by cleanup
  pub retention: Duration,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
  pub bucket: String,
  pub cached: usize,
}

#[derive(Debug, Clone)]
pub struct ActivationReport {
  pub bucket: String,
  pub deleted: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheStatus {
  pub bucket: String,
  pub installed: bool,
  pub controlling: bool,
  pub entries: usize,
  pub obsolete_buckets: Vec<String>,
}

/// Offline cache manager.
///
/// Documents are network-first with a cached fallback; every other asset is
/// cache-first with background revalidation.
pub struct CacheManager<S: BucketStorage, F: Fetcher> {
  storage: Arc<S>,
  fetcher: Arc<F>,
  settings: Arc<CacheSettings>,
  /// Set once activation has claimed the open clients
  controlling: Arc<AtomicBool>,
  revalidations: Arc<Mutex<JoinSet<()>>>,
}

impl<S, F> CacheManager<S, F>
where
  S: BucketStorage + 'static,
  F: Fetcher + 'static,
{
  pub fn new(storage: Arc<S>, fetcher: Arc<F>, settings: CacheSettings) -> Self {
    Self {
      storage,
      fetcher,
      settings: Arc::new(settings),
      controlling: Arc::new(AtomicBool::new(false)),
      revalidations: Arc::new(Mutex::new(JoinSet::new())),
    }
  }

  /// Populate the current bucket with the manifest.
  ///
  /// Every asset is fetched before anything is written; a single failure
  /// (network error or non-2xx status) aborts the install and leaves the
  /// storage untouched.
  pub async fn install(&self) -> Result<InstallReport, CacheError> {
    info!(bucket = %self.settings.bucket, "Installing; caching app shell");

    let fetches = self.settings.manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      match self.fetcher.fetch(&request).await {
        Ok(response) if response.is_ok() => Ok((url.to_string(), response)),
        Ok(response) => Err(CacheError::InstallIncomplete {
          url: url.to_string(),
          reason: format!("HTTP {}", response.status),
        }),
        Err(err) => Err(CacheError::InstallIncomplete {
          url: url.to_string(),
          reason: err.reason,
        }),
      }
    });

    let mut entries = try_join_all(fetches).await?;

    let now = Utc::now();
    for (_, response) in &mut entries {
      response.stamp_date(now);
    }

    self
      .storage
      .open_bucket(&self.settings.bucket)
      .map_err(CacheError::storage)?;
    self
      .storage
      .put_all(&self.settings.bucket, &entries)
      .map_err(CacheError::storage)?;

    info!(bucket = %self.settings.bucket, cached = entries.len(), "Install completed");
    Ok(InstallReport {
      bucket: self.settings.bucket.clone(),
      cached: entries.len(),
    })
  }

  /// Delete every bucket but the current one, then take control of clients.
  pub fn activate(&self) -> Result<ActivationReport, CacheError> {
    info!(bucket = %self.settings.bucket, "Activating");

    let mut deleted = Vec::new();
    for name in self.storage.bucket_names().map_err(CacheError::storage)? {
      if name != self.settings.bucket {
        info!(bucket = %name, "Deleting old cache");
        self
          .storage
          .delete_bucket(&name)
          .map_err(CacheError::storage)?;
        deleted.push(name);
      }
    }

    self.controlling.store(true, Ordering::SeqCst);
    info!("Activation completed; clients claimed");

    Ok(ActivationReport {
      bucket: self.settings.bucket.clone(),
      deleted,
    })
  }

  /// Run one outgoing request through the cache.
  ///
  /// Only a miss with a failed network fetch and no applicable fallback is
  /// an error; it carries the underlying network failure.
  pub async fn handle(&self, request: &Request) -> Result<Intercepted, CacheError> {
    if request.method != Method::GET || self.bypasses(&request.url) {
      debug!(method = %request.method, url = %request.url, "Passing request through");
      return Ok(Intercepted::Passthrough);
    }

    if request.accepts_html() {
      self.network_first(request).await
    } else {
      self.cache_first(request).await
    }
  }

  /// Prune entries of the current bucket captured before `now - retention`.
  ///
  /// Entries without a parseable Date header are kept.
  pub fn cleanup(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
    let bucket = &self.settings.bucket;
    let cutoff = now - self.settings.retention;
    let mut removed = 0;

    for url in self.storage.entry_urls(bucket).map_err(CacheError::storage)? {
      let Some(response) = self
        .storage
        .match_entry(bucket, &url)
        .map_err(CacheError::storage)?
      else {
        continue;
      };

      if response.captured_at().is_some_and(|at| at < cutoff) {
        self
          .storage
          .delete_entry(bucket, &url)
          .map_err(CacheError::storage)?;
        removed += 1;
      }
    }

    if removed > 0 {
      info!(removed, "Cleaned up old cache entries");
    }
    Ok(removed)
  }

  pub fn status(&self) -> Result<CacheStatus, CacheError> {
    let names = self.storage.bucket_names().map_err(CacheError::storage)?;
    let installed = names.contains(&self.settings.bucket);
    let entries = if installed {
      self
        .storage
        .entry_urls(&self.settings.bucket)
        .map_err(CacheError::storage)?
        .len()
    } else {
      0
    };

    Ok(CacheStatus {
      bucket: self.settings.bucket.clone(),
      installed,
      controlling: self.controlling.load(Ordering::SeqCst),
      entries,
      obsolete_buckets: names
        .into_iter()
        .filter(|name| *name != self.settings.bucket)
        .collect(),
    })
  }

  /// Wait for in-flight background revalidations.
  pub async fn settle(&self) {
    let mut tasks = {
      let mut guard = self
        .revalidations
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
      std::mem::take(&mut *guard)
    };

    while let Some(result) = tasks.join_next().await {
      if let Err(e) = result {
        warn!("Background revalidation task failed: {}", e);
      }
    }
  }

  fn bypasses(&self, url: &Url) -> bool {
    let Some(host) = url.host_str() else {
      return false;
    };
    self
      .settings
      .bypass_hosts
      .iter()
      .any(|bypass| host == bypass || host.ends_with(&format!(".{}", bypass)))
  }

  async fn network_first(&self, request: &Request) -> Result<Intercepted, CacheError> {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          store(&*self.storage, &self.settings.bucket, request.url.as_str(), &response);
        }
        Ok(Intercepted::respond(response, CacheSource::Network))
      }
      Err(err) => {
        debug!(url = %request.url, "Network failed for document: {}", err);

        if let Some(cached) = self.lookup(request.url.as_str()) {
          return Ok(Intercepted::respond(cached, CacheSource::Offline));
        }
        if let Some(shell) = self.lookup(self.settings.shell.as_str()) {
          return Ok(Intercepted::respond(shell, CacheSource::Shell));
        }

        Err(CacheError::Network(err))
      }
    }
  }

  async fn cache_first(&self, request: &Request) -> Result<Intercepted, CacheError> {
    if let Some(cached) = self.lookup(request.url.as_str()) {
      self.spawn_revalidation(request.clone());
      return Ok(Intercepted::respond(cached, CacheSource::Cache));
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.status == 200 {
          store(&*self.storage, &self.settings.bucket, request.url.as_str(), &response);
        }
        Ok(Intercepted::respond(response, CacheSource::Network))
      }
      Err(err) => {
        if request.destination == Destination::Image {
          if let Some(fallback) = self.lookup(self.settings.fallback_image.as_str()) {
            return Ok(Intercepted::respond(fallback, CacheSource::Placeholder));
          }
        }
        Err(CacheError::Network(err))
      }
    }
  }

  /// Cache lookup for the request path; storage failures count as a miss.
  fn lookup(&self, url: &str) -> Option<CachedResponse> {
    match self.storage.match_entry(&self.settings.bucket, url) {
      Ok(found) => found,
      Err(e) => {
        warn!(url, "Cache lookup failed: {}", e);
        None
      }
    }
  }

  fn spawn_revalidation(&self, request: Request) {
    let storage = Arc::clone(&self.storage);
    let fetcher = Arc::clone(&self.fetcher);
    let bucket = self.settings.bucket.clone();

    let mut tasks = self
      .revalidations
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    // Reap whatever already finished so the set does not grow unbounded
    while tasks.try_join_next().is_some() {}
    tasks.spawn(async move {
      if let Err(e) = revalidate(&*storage, &*fetcher, &bucket, &request).await {
        debug!("Fetch and cache failed: {}", e);
      }
    });
  }
}

/// Re-fetch a cached asset and overwrite its entry on a 200.
async fn revalidate<S, F>(
  storage: &S,
  fetcher: &F,
  bucket: &str,
  request: &Request,
) -> Result<(), FetchError>
where
  S: BucketStorage + ?Sized,
  F: Fetcher + ?Sized,
{
  let response = fetcher.fetch(request).await?;
  if response.status == 200 {
    store(storage, bucket, request.url.as_str(), &response);
  }
  Ok(())
}

/// Best-effort write; failures are logged and never reach the requester.
fn store<S: BucketStorage + ?Sized>(storage: &S, bucket: &str, url: &str, response: &CachedResponse) {
  let mut response = response.clone();
  response.stamp_date(Utc::now());
  if let Err(e) = storage.put_entry(bucket, url, &response) {
    warn!(url, "Failed to cache response: {}", e);
  }
}

impl<S: BucketStorage, F: Fetcher> Clone for CacheManager<S, F> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      settings: Arc::clone(&self.settings),
      controlling: Arc::clone(&self.controlling),
      revalidations: Arc::clone(&self.revalidations),
    }
  }
}
