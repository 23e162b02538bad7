//! Bucket storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::traits::CachedResponse;
use crate::db::Database;

/// Trait for cache bucket storage backends.
///
/// A bucket is a named collection of request URL -> response pairs.
pub trait BucketStorage: Send + Sync {
  /// Names of every existing bucket.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Create the bucket if it does not exist yet.
  fn open_bucket(&self, bucket: &str) -> Result<()>;

  /// Delete a bucket and all its entries. Returns whether it existed.
  fn delete_bucket(&self, bucket: &str) -> Result<bool>;

  /// Look up the stored response for a URL.
  fn match_entry(&self, bucket: &str, url: &str) -> Result<Option<CachedResponse>>;

  /// Store (or overwrite) a single entry, creating the bucket if needed.
  fn put_entry(&self, bucket: &str, url: &str, response: &CachedResponse) -> Result<()>;

  /// Store a batch of entries atomically: either all land or none do.
  fn put_all(&self, bucket: &str, entries: &[(String, CachedResponse)]) -> Result<()>;

  /// URLs of every entry in a bucket.
  fn entry_urls(&self, bucket: &str) -> Result<Vec<String>>;

  /// Delete one entry. Returns whether it existed.
  fn delete_entry(&self, bucket: &str, url: &str) -> Result<bool>;
}

/// Stable, fixed-length key for a request URL.
fn url_hash(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

fn ensure_bucket(conn: &Connection, bucket: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to create bucket {}: {}", bucket, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  bucket: &str,
  url: &str,
  response: &CachedResponse,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (bucket, url_hash, url, status, headers, body, stored_at)
       VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        bucket,
        url_hash(url),
        url,
        response.status,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store entry {}: {}", url, e))?;
  Ok(())
}

impl BucketStorage for Database {
  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn open_bucket(&self, bucket: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_bucket(&conn, bucket)
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE bucket = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", bucket, e))?;
    let removed = tx
      .execute("DELETE FROM cache_buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_entry(&self, bucket: &str, url: &str) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, headers, body FROM cache_entries
         WHERE bucket = ? AND url_hash = ?",
        params![bucket, url_hash(url)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", url, e))?;

    match row {
      Some((status, headers, body)) => {
        let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", url, e))?;
        Ok(Some(CachedResponse {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put_entry(&self, bucket: &str, url: &str, response: &CachedResponse) -> Result<()> {
    let conn = self.lock()?;
    ensure_bucket(&conn, bucket)?;
    insert_entry(&conn, bucket, url, response)
  }

  fn put_all(&self, bucket: &str, entries: &[(String, CachedResponse)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_bucket(&tx, bucket)?;
    for (url, response) in entries {
      insert_entry(&tx, bucket, url, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn entry_urls(&self, bucket: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT url FROM cache_entries WHERE bucket = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls = stmt
      .query_map(params![bucket], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list entries: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read entry url: {}", e))?;

    Ok(urls)
  }

  fn delete_entry(&self, bucket: &str, url: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_entries WHERE bucket = ? AND url_hash = ?",
        params![bucket, url_hash(url)],
      )
      .map_err(|e| eyre!("Failed to delete entry {}: {}", url, e))?;
    Ok(removed > 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const BUCKET: &str = "folio-app-v2.0.0";

  #[test]
  fn test_put_and_match() {
    let db = Database::open_in_memory().unwrap();
    let response = CachedResponse::new(200, "body {}").with_header("Content-Type", "text/css");

    db.put_entry(BUCKET, "https://folio.example.com/styles/main.css", &response)
      .unwrap();

    let cached = db
      .match_entry(BUCKET, "https://folio.example.com/styles/main.css")
      .unwrap()
      .unwrap();
    assert_eq!(cached, response);
    assert_eq!(cached.header("content-type"), Some("text/css"));

    assert!(db
      .match_entry("other-bucket", "https://folio.example.com/styles/main.css")
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_put_overwrites_same_url() {
    let db = Database::open_in_memory().unwrap();
    let url = "https://folio.example.com/scripts/main.js";

    db.put_entry(BUCKET, url, &CachedResponse::new(200, "v1"))
      .unwrap();
    db.put_entry(BUCKET, url, &CachedResponse::new(200, "v2"))
      .unwrap();

    assert_eq!(db.entry_urls(BUCKET).unwrap(), vec![url.to_string()]);
    assert_eq!(db.match_entry(BUCKET, url).unwrap().unwrap().body, b"v2");
  }

  #[test]
  fn test_delete_bucket_removes_entries() {
    let db = Database::open_in_memory().unwrap();
    db.put_entry("folio-app-v1", "https://a/x", &CachedResponse::new(200, "x"))
      .unwrap();
    db.open_bucket(BUCKET).unwrap();

    assert!(db.delete_bucket("folio-app-v1").unwrap());
    assert!(!db.delete_bucket("folio-app-v1").unwrap());

    assert_eq!(db.bucket_names().unwrap(), vec![BUCKET.to_string()]);
    assert!(db.entry_urls("folio-app-v1").unwrap().is_empty());
  }

  #[test]
  fn test_put_all_creates_bucket() {
    let db = Database::open_in_memory().unwrap();
    let entries = vec![
      ("https://a/1".to_string(), CachedResponse::new(200, "1")),
      ("https://a/2".to_string(), CachedResponse::new(200, "2")),
    ];

    db.put_all(BUCKET, &entries).unwrap();

    assert_eq!(db.bucket_names().unwrap(), vec![BUCKET.to_string()]);
    assert_eq!(db.entry_urls(BUCKET).unwrap().len(), 2);
  }

  #[test]
  fn test_delete_entry() {
    let db = Database::open_in_memory().unwrap();
    db.put_entry(BUCKET, "https://a/1", &CachedResponse::new(200, "1"))
      .unwrap();

    assert!(db.delete_entry(BUCKET, "https://a/1").unwrap());
    assert!(!db.delete_entry(BUCKET, "https://a/1").unwrap());
    assert!(db.match_entry(BUCKET, "https://a/1").unwrap().is_none());
  }
}
