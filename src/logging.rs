use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "postdeck.log";

/// Where logs go when the config does not say
pub fn default_log_path() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("postdeck")
    .join(LOG_FILE_NAME)
}

/// Install the global subscriber, writing to a file since the terminal is
/// taken by the UI. Keep the guard alive until exit or buffered lines are
/// lost.
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard> {
  let path = config.file.clone().unwrap_or_else(default_log_path);
  let (dir, file_name) = split_path(&path)?;
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let env_filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log level {:?}: {}", config.level, e))?;

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  tracing::info!(path = %path.display(), "logging initialised");
  Ok(guard)
}

fn split_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Log path {} has no file name", path.display()))?;
  let dir = path
    .parent()
    .filter(|dir| !dir.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_path_is_under_postdeck_dir() {
    let path = default_log_path();
    assert!(path.ends_with("postdeck/postdeck.log"));
  }

  #[test]
  fn test_split_path() {
    let (dir, name) = split_path(Path::new("logs/app.log")).unwrap();
    assert_eq!(dir, Path::new("logs"));
    assert_eq!(name, "app.log");

    let (dir, _) = split_path(Path::new("app.log")).unwrap();
    assert_eq!(dir, Path::new("."));

    assert!(split_path(Path::new("/")).is_err());
  }
}
