//! Command-line subcommands and their handlers

use chrono::{Local, Utc};
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use url::Url;

use crate::app::App;
use crate::cache::{CacheSource, Destination, Intercepted, PushPayload, Request};
use crate::context::AppContext;
use crate::notes::{NoteEdit, NoteId, Theme};

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Manage locally stored notes
  Notes {
    #[command(subcommand)]
    action: NotesCommand,
  },
  /// Show or change app settings
  Settings {
    #[arg(long, value_enum)]
    theme: Option<Theme>,
    #[arg(long)]
    offline_mode: Option<bool>,
  },
  /// Merge local notes with the remote store
  Sync,
  /// Replace local notes with the remote copy
  Restore,
  /// Check remote store connectivity and session
  Health,
  /// Operate the offline asset cache
  Cache {
    #[command(subcommand)]
    action: CacheCommand,
  },
  /// Render a push message payload as a notification
  Push {
    /// JSON payload; omit for an empty message
    payload: Option<String>,
  },
  /// Run until interrupted: auto-save, cache maintenance, deferred sync
  Watch,
}

#[derive(Debug, Subcommand)]
pub enum NotesCommand {
  /// List notes, newest first
  #[command(alias = "ls")]
  List,
  Add {
    title: String,
    #[arg(default_value = "")]
    content: String,
    #[arg(long)]
    color: Option<String>,
  },
  Edit {
    id: i64,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    color: Option<String>,
  },
  #[command(alias = "rm")]
  Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
  /// Fetch and store the asset manifest
  Install,
  /// Drop obsolete buckets
  Activate,
  /// Prune entries past the retention window
  Cleanup,
  Status,
  /// Run one request through the cache and report where it was served from
  Fetch {
    /// Absolute URL, or a path resolved against the configured origin
    url: String,
    /// Send as a document navigation
    #[arg(long, conflicts_with = "image")]
    html: bool,
    /// Send as an image request
    #[arg(long)]
    image: bool,
    #[arg(long, default_value = "GET")]
    method: String,
  },
}

pub async fn run(command: Command, ctx: &AppContext) -> Result<()> {
  match command {
    Command::Notes { action } => notes(action, ctx),
    Command::Settings {
      theme,
      offline_mode,
    } => settings(ctx, theme, offline_mode),
    Command::Sync => {
      let report = ctx.sync.sync(Utc::now()).await?;
      println!(
        "Synced {} notes at {} ({} deleted remotely)",
        report.notes.len(),
        report.synced_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        report.deleted_remotely
      );
      Ok(())
    }
    Command::Restore => {
      match ctx.sync.restore().await? {
        0 => println!("Remote store has no notes; local notes left as they were"),
        n => println!("Restored {} notes", n),
      }
      Ok(())
    }
    Command::Health => {
      let report = ctx.sync.health().await;
      println!("timestamp:     {}", report.timestamp.to_rfc3339());
      println!("configured:    {}", report.configured);
      println!("connected:     {}", report.connected);
      println!("authenticated: {}", report.authenticated);
      Ok(())
    }
    Command::Cache { action } => cache(action, ctx).await,
    Command::Push { payload } => {
      let notification =
        PushPayload::parse(payload.as_deref())?.into_notification(&ctx.config.notifications);
      println!("{}", notification.title);
      println!("  {}", notification.body);
      println!("  tag: {}  url: {}", notification.tag, notification.url);
      println!("  icon: {}  badge: {}", notification.icon, notification.badge);
      Ok(())
    }
    Command::Watch => App::new(ctx).run().await,
  }
}

fn notes(action: NotesCommand, ctx: &AppContext) -> Result<()> {
  let now = Utc::now();
  match action {
    NotesCommand::List => {
      let notes = ctx.notes.load_notes()?;
      if notes.is_empty() {
        println!("No notes");
      }
      for note in notes {
        let modified = note.last_modified().with_timezone(&Local);
        println!(
          "{:>14}  {}  {}  {}",
          note.id,
          modified.format("%Y-%m-%d %H:%M"),
          note.color,
          note.title
        );
      }
    }
    NotesCommand::Add {
      title,
      content,
      color,
    } => {
      let note = ctx.notes.add(&title, &content, color.as_deref(), now)?;
      println!("Added note {}", note.id);
    }
    NotesCommand::Edit {
      id,
      title,
      content,
      color,
    } => {
      let edit = NoteEdit {
        title,
        content,
        color,
      };
      if edit.is_empty() {
        return Err(eyre!("Nothing to change; pass --title, --content or --color"));
      }
      let note = ctx.notes.edit(NoteId(id), edit, now)?;
      println!("Updated note {}", note.id);
    }
    NotesCommand::Delete { id } => {
      if !ctx.notes.delete(NoteId(id), now)? {
        return Err(eyre!("Note {} not found", id));
      }
      println!("Deleted note {}", id);
    }
  }
  Ok(())
}

fn settings(ctx: &AppContext, theme: Option<Theme>, offline_mode: Option<bool>) -> Result<()> {
  let mut settings = ctx.notes.load_settings()?;
  if theme.is_some() || offline_mode.is_some() {
    if let Some(theme) = theme {
      settings.theme = theme;
    }
    if let Some(offline_mode) = offline_mode {
      settings.offline_mode = offline_mode;
    }
    ctx.notes.save_settings(&settings)?;
  }

  println!("theme:        {}", settings.theme);
  println!("offline mode: {}", settings.offline_mode);
  Ok(())
}

async fn cache(action: CacheCommand, ctx: &AppContext) -> Result<()> {
  match action {
    CacheCommand::Install => {
      let report = ctx.cache.install().await?;
      println!("Cached {} assets in {}", report.cached, report.bucket);
    }
    CacheCommand::Activate => {
      let report = ctx.cache.activate()?;
      println!("Active bucket: {}", report.bucket);
      for name in report.deleted {
        println!("  deleted {}", name);
      }
    }
    CacheCommand::Cleanup => {
      let removed = ctx.cache.cleanup(Utc::now())?;
      println!("Removed {} expired entries", removed);
    }
    CacheCommand::Status => {
      let status = ctx.cache.status()?;
      println!("bucket:    {}", status.bucket);
      println!("installed: {}", status.installed);
      println!("active:    {}", status.controlling);
      println!("entries:   {}", status.entries);
      if !status.obsolete_buckets.is_empty() {
        println!("obsolete:  {}", status.obsolete_buckets.join(", "));
      }
    }
    CacheCommand::Fetch {
      url,
      html,
      image,
      method,
    } => {
      let url = resolve_url(&ctx.config.origin, &url)?;
      let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

      let request = if html {
        Request::document(url)
      } else if image || Destination::from_url(&url) == Destination::Image {
        Request::get(url)
          .with_accept("image/avif,image/webp,image/*,*/*;q=0.8")
          .with_destination(Destination::Image)
      } else {
        let destination = Destination::from_url(&url);
        Request::get(url).with_destination(destination)
      };
      let request = request.with_method(method);

      match ctx.cache.handle(&request).await? {
        Intercepted::Passthrough => println!("passthrough: not handled by the cache"),
        Intercepted::Respond { response, source } => {
          println!(
            "{}: HTTP {} ({} bytes)",
            source_label(source),
            response.status,
            response.body.len()
          );
        }
      }
    }
  }
  Ok(())
}

fn source_label(source: CacheSource) -> &'static str {
  match source {
    CacheSource::Network => "network",
    CacheSource::Cache => "cache",
    CacheSource::Offline => "cache (offline)",
    CacheSource::Shell => "app shell",
    CacheSource::Placeholder => "fallback image",
  }
}

/// Absolute URLs pass through; anything else is joined onto the origin.
fn resolve_url(origin: &str, raw: &str) -> Result<Url> {
  if let Ok(url) = Url::parse(raw) {
    return Ok(url);
  }
  let origin = Url::parse(origin).map_err(|e| eyre!("Invalid origin '{}': {}", origin, e))?;
  origin
    .join(raw)
    .map_err(|e| eyre!("Invalid URL '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("folio").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_resolve_relative_path() {
    let url = resolve_url("http://localhost:8080", "/styles/main.css").unwrap();
    assert_eq!(url.as_str(), "http://localhost:8080/styles/main.css");
  }

  #[test]
  fn test_resolve_absolute_url() {
    let url = resolve_url("http://localhost:8080", "https://cdn.example.com/a.css").unwrap();
    assert_eq!(url.host_str(), Some("cdn.example.com"));
  }

  #[test]
  fn test_parse_notes_add() {
    match parse(&["notes", "add", "Groceries", "milk", "--color", "#ff0000"]) {
      Command::Notes {
        action: NotesCommand::Add {
          title,
          content,
          color,
        },
      } => {
        assert_eq!(title, "Groceries");
        assert_eq!(content, "milk");
        assert_eq!(color.as_deref(), Some("#ff0000"));
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn test_parse_settings_theme() {
    match parse(&["settings", "--theme", "dark"]) {
      Command::Settings { theme, offline_mode } => {
        assert_eq!(theme, Some(Theme::Dark));
        assert_eq!(offline_mode, None);
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn test_fetch_html_and_image_conflict() {
    let result = Cli::try_parse_from(["folio", "cache", "fetch", "/", "--html", "--image"]);
    assert!(result.is_err());
  }
}
