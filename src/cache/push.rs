//! Push message payloads and the notifications they produce.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;

use crate::config::NotificationConfig;

/// Push message body; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub tag: Option<String>,
  pub url: Option<String>,
}

/// Notification ready to hand to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  /// Opened when the notification is clicked
  pub url: String,
}

impl PushPayload {
  /// Parse a push message. A message without data is an empty payload.
  pub fn parse(data: Option<&str>) -> Result<Self> {
    match data.map(str::trim) {
      None | Some("") => Ok(Self::default()),
      Some(raw) => {
        serde_json::from_str(raw).map_err(|e| eyre!("Invalid push payload: {}", e))
      }
    }
  }

  pub fn into_notification(self, config: &NotificationConfig) -> Notification {
    Notification {
      title: self.title.unwrap_or_else(|| config.app_name.clone()),
      body: self.body.unwrap_or_else(|| config.default_body.clone()),
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      tag: self.tag.unwrap_or_else(|| "general".to_string()),
      url: self.url.unwrap_or_else(|| "/".to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_payload_uses_defaults() {
    let config = NotificationConfig::default();
    let notification = PushPayload::parse(None).unwrap().into_notification(&config);

    assert_eq!(notification.title, "Folio");
    assert_eq!(notification.body, "New notification");
    assert_eq!(notification.tag, "general");
    assert_eq!(notification.url, "/");
    assert_eq!(notification.icon, config.icon);
  }

  #[test]
  fn test_payload_fields_override_defaults() {
    let payload =
      PushPayload::parse(Some(r#"{"title":"Synced","url":"/notes","extra":true}"#)).unwrap();
    let notification = payload.into_notification(&NotificationConfig::default());

    assert_eq!(notification.title, "Synced");
    assert_eq!(notification.url, "/notes");
    assert_eq!(notification.body, "New notification");
  }

  #[test]
  fn test_invalid_payload_is_rejected() {
    assert!(PushPayload::parse(Some("not json")).is_err());
  }
}
