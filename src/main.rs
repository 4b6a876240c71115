mod api;
mod app;
mod commands;
mod config;
mod event;
mod logging;
mod mutation;
mod query;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "postdeck")]
#[command(about = "A terminal UI for browsing and editing blog posts over a REST API")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./postdeck.yaml, then $XDG_CONFIG_HOME/postdeck/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL to use instead of the configured one
  #[arg(short, long)]
  base_url: Option<String>,

  /// Initial page size of the post list (5, 10, 20 or 50)
  #[arg(short, long)]
  page_size: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line wins over the file
  if let Some(base_url) = args.base_url {
    config.api.base_url = base_url;
  }
  if let Some(page_size) = args.page_size {
    config.posts.page_size = page_size;
  }
  config.validate()?;

  // Held until exit so buffered log lines are flushed
  let _log_guard = logging::init(&config.logging)?;
  tracing::info!(base_url = %config.api.base_url, "starting postdeck");

  // Initialize and run the app
  let mut app = app::App::new(config).await?;
  app.run().await?;

  Ok(())
}
