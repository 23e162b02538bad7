//! Core traits and types for the offline cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::error::FetchError;

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
  Document,
  Image,
  Style,
  Script,
  Font,
  #[default]
  Other,
}

impl Destination {
  /// Guess the destination from the URL's file extension.
  pub fn from_url(url: &Url) -> Self {
    let ext = url
      .path()
      .rsplit_once('.')
      .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
      Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico") => Self::Image,
      Some("css") => Self::Style,
      Some("js" | "mjs") => Self::Script,
      Some("woff" | "woff2" | "ttf" | "otf") => Self::Font,
      Some("html" | "htm") => Self::Document,
      _ => Self::Other,
    }
  }
}

/// An outgoing content request as seen by the cache manager.
#[derive(Debug, Clone)]
pub struct Request {
  pub url: Url,
  pub method: Method,
  /// Value of the Accept header, if any
  pub accept: Option<String>,
  pub destination: Destination,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      url,
      method: Method::GET,
      accept: None,
      destination: Destination::Other,
    }
  }

  /// A navigation request for an HTML document.
  pub fn document(url: Url) -> Self {
    Self::get(url)
      .with_accept("text/html,application/xhtml+xml,*/*;q=0.8")
      .with_destination(Destination::Document)
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = Some(accept.into());
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  /// Document requests are recognised by their Accept header, not the destination.
  pub fn accepts_html(&self) -> bool {
    self
      .accept
      .as_deref()
      .is_some_and(|accept| accept.contains("text/html"))
  }
}

/// A stored (or storable) HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
  pub status: u16,
  /// Header names are lowercase
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name.to_ascii_lowercase(), value.into());
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Capture time, taken from the Date header.
  pub fn captured_at(&self) -> Option<DateTime<Utc>> {
    let date = self.header("date")?;
    DateTime::parse_from_rfc2822(date)
      .ok()
      .map(|d| d.with_timezone(&Utc))
  }

  /// Give the response a Date header if the origin did not send one.
  pub fn stamp_date(&mut self, now: DateTime<Utc>) {
    self
      .headers
      .entry("date".to_string())
      .or_insert_with(|| http_date(now));
  }
}

/// Format a timestamp the way HTTP Date headers are written.
pub fn http_date(at: DateTime<Utc>) -> String {
  at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Network access used by the cache manager.
///
/// Returns `Ok` for every HTTP status; `Err` only when no response arrived.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<CachedResponse, FetchError>;
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Asset served from cache, refreshed in the background
  Cache,
  /// Document served from cache because the network failed
  Offline,
  /// App shell served for a document with no cached copy
  Shell,
  /// Fallback image served for an image with no cached copy
  Placeholder,
}

/// Outcome of running a request through the cache manager.
#[derive(Debug, Clone)]
pub enum Intercepted {
  /// Not handled; the caller goes straight to the network
  Passthrough,
  Respond {
    response: CachedResponse,
    source: CacheSource,
  },
}

impl Intercepted {
  pub fn respond(response: CachedResponse, source: CacheSource) -> Self {
    Self::Respond { response, source }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_destination_from_extension() {
    let dest = |path: &str| Destination::from_url(&Url::parse(path).unwrap());
    assert_eq!(dest("https://folio.example.com/assets/a.PNG"), Destination::Image);
    assert_eq!(dest("https://folio.example.com/styles/main.css"), Destination::Style);
    assert_eq!(dest("https://folio.example.com/scripts/main.js?v=2"), Destination::Script);
    assert_eq!(dest("https://folio.example.com/"), Destination::Other);
    assert_eq!(dest("https://folio.example.com/v1.2/about"), Destination::Other);
  }

  #[test]
  fn test_accepts_html() {
    let url = Url::parse("https://folio.example.com/about").unwrap();
    assert!(Request::document(url.clone()).accepts_html());
    assert!(!Request::get(url.clone()).accepts_html());
    assert!(!Request::get(url).with_accept("image/avif,image/*").accepts_html());
  }

  #[test]
  fn test_date_header_round_trip() {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 12, 31).unwrap();
    let mut response = CachedResponse::new(200, "body");
    response.stamp_date(at);

    assert_eq!(response.header("Date"), Some("Sun, 01 Mar 2026 08:12:31 GMT"));
    assert_eq!(response.captured_at(), Some(at));
  }

  #[test]
  fn test_stamp_date_keeps_origin_date() {
    let mut response =
      CachedResponse::new(200, "body").with_header("Date", "Tue, 15 Nov 1994 08:12:31 GMT");
    response.stamp_date(Utc::now());

    assert_eq!(
      response.captured_at(),
      Some(Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap())
    );
  }

  #[test]
  fn test_unparseable_date_has_no_capture_time() {
    let response = CachedResponse::new(200, "body").with_header("date", "yesterday");
    assert_eq!(response.captured_at(), None);
  }
}
