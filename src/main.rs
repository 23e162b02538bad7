mod app;
mod cache;
mod commands;
mod config;
mod context;
mod db;
mod error;
mod event;
mod logging;
mod notes;
mod remote;
#[cfg(test)]
mod testing;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Offline notes and asset cache for the Folio portfolio app")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./folio.yaml, then $XDG_CONFIG_HOME/folio/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let _log_guard = logging::init(&config.logging, &context::data_dir(&config)?)?;

  let ctx = context::AppContext::init(config)?;
  let result = commands::run(args.command, &ctx).await;
  ctx.shutdown().await;

  result
}
