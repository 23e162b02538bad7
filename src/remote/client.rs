use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::RemoteConfig;
use crate::error::SyncError;
use crate::notes::{Note, NoteId, RemoteNoteStore, RemoteUser};
use crate::remote::api_types::{rows_into_notes, ApiNoteRow, ApiUser};

/// Client for the hosted note table (PostgREST under `/rest/v1`, auth under `/auth/v1`)
#[derive(Clone)]
pub struct SupabaseClient {
  client: reqwest::Client,
  base: Url,
  table: String,
  api_key: String,
  session_token: Option<String>,
}

fn unavailable(e: impl std::fmt::Display) -> SyncError {
  SyncError::RemoteUnavailable(e.to_string())
}

/// Map a non-success write response to `WriteRejected`, keeping the body for context.
async fn check_write(response: Response, what: &str) -> Result<(), SyncError> {
  let status = response.status();
  if status.is_success() {
    return Ok(());
  }

  let body = response.text().await.unwrap_or_default();
  Err(SyncError::WriteRejected(format!(
    "{} failed with {}: {}",
    what,
    status,
    body.trim()
  )))
}

impl SupabaseClient {
  pub fn new(config: &RemoteConfig, api_key: String, session_token: Option<String>) -> Result<Self> {
    // A base without a trailing slash would have its last segment replaced by `join`
    let mut raw = config.url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }
    let base = Url::parse(&raw).map_err(|e| eyre!("Invalid remote URL {}: {}", config.url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create remote client: {}", e))?;

    Ok(Self {
      client,
      base,
      table: config.table.clone(),
      api_key,
      session_token,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
    self.base.join(path).map_err(unavailable)
  }

  fn table_url(&self) -> Result<Url, SyncError> {
    self.endpoint(&format!("rest/v1/{}", self.table))
  }

  /// Attach the project key and the bearer credential. Without a session the
  /// project key doubles as the bearer, which PostgREST treats as anonymous.
  fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
    let bearer = self.session_token.as_deref().unwrap_or(&self.api_key);
    builder
      .header("apikey", &self.api_key)
      .bearer_auth(bearer)
  }
}

#[async_trait]
impl RemoteNoteStore for SupabaseClient {
  async fn current_user(&self) -> Result<Option<RemoteUser>, SyncError> {
    if self.session_token.is_none() {
      return Ok(None);
    }

    let response = self
      .authorize(self.client.get(self.endpoint("auth/v1/user")?))
      .send()
      .await
      .map_err(unavailable)?;

    match response.status() {
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
        debug!("Session token rejected by the auth endpoint");
        Ok(None)
      }
      status if status.is_success() => {
        let user: ApiUser = response.json().await.map_err(unavailable)?;
        Ok(Some(RemoteUser {
          id: user.id,
          email: user.email,
        }))
      }
      status => Err(unavailable(format!("auth lookup failed with {}", status))),
    }
  }

  async fn fetch_notes(&self, user_id: &str) -> Result<Vec<Note>, SyncError> {
    let mut url = self.table_url()?;
    url
      .query_pairs_mut()
      .append_pair("select", "*")
      .append_pair("user_id", &format!("eq.{}", user_id));

    let response = self
      .authorize(self.client.get(url))
      .send()
      .await
      .map_err(unavailable)?;

    let status = response.status();
    if !status.is_success() {
      return Err(unavailable(format!("fetch failed with {}", status)));
    }

    let rows: Vec<serde_json::Value> = response.json().await.map_err(unavailable)?;
    let total = rows.len();
    let notes = rows_into_notes(rows);
    debug!(total, kept = notes.len(), "Fetched remote notes");
    Ok(notes)
  }

  async fn upsert_notes(&self, user_id: &str, notes: &[Note]) -> Result<(), SyncError> {
    if notes.is_empty() {
      return Ok(());
    }

    let rows: Vec<ApiNoteRow> = notes
      .iter()
      .map(|note| ApiNoteRow::from_note(note, user_id))
      .collect();

    let response = self
      .authorize(self.client.post(self.table_url()?))
      .header("Prefer", "resolution=merge-duplicates,return=minimal")
      .json(&rows)
      .send()
      .await
      .map_err(unavailable)?;

    check_write(response, "upsert").await
  }

  async fn delete_note(&self, id: NoteId) -> Result<(), SyncError> {
    let mut url = self.table_url()?;
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{}", id));

    let response = self
      .authorize(self.client.delete(url))
      .send()
      .await
      .map_err(unavailable)?;

    check_write(response, "delete").await
  }

  async fn probe(&self) -> Result<(), SyncError> {
    let mut url = self.table_url()?;
    url
      .query_pairs_mut()
      .append_pair("select", "id")
      .append_pair("limit", "1");

    let response = self
      .authorize(self.client.get(url))
      .send()
      .await
      .map_err(unavailable)?;

    // Auth failures still prove the backend answered
    if response.status().is_server_error() {
      return Err(unavailable(format!("probe failed with {}", response.status())));
    }
    Ok(())
  }
}
