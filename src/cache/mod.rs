//! Offline cache for the app's own content requests.
//!
//! This module keeps one versioned bucket of request/response pairs and:
//! - Precaches a fixed manifest at install time (all or nothing)
//! - Drops every other bucket on activation
//! - Serves documents network-first with cached and app-shell fallbacks
//! - Serves other assets cache-first, revalidating in the background
//! - Prunes entries older than a retention window

mod background;
mod fetcher;
mod manager;
mod push;
mod storage;
mod traits;

pub use background::{BackgroundSync, SYNC_NOTES_TAG};
pub use fetcher::HttpFetcher;
pub use manager::{CacheManager, CacheSettings};
pub use push::PushPayload;
pub use traits::{CacheSource, Destination, Intercepted, Request};
#[cfg(test)]
pub use traits::{CachedResponse, Fetcher};
