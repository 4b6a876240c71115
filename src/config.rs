use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_BASE_URL;
use crate::query::{MutationOptions, QueryOptions};

/// Page sizes offered by the post list, in cycle order
pub const PAGE_SIZES: [u32; 4] = [5, 10, 20, 50];

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub queries: QueriesConfig,
  pub mutations: MutationsConfig,
  pub posts: PostsConfig,
  pub connectivity: ConnectivityConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
    }
  }
}

/// Query cache knobs. Durations are in milliseconds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueriesConfig {
  pub stale_time_ms: u64,
  pub gc_time_ms: u64,
  pub retry: u32,
  pub retry_delay_ms: u64,
  pub refetch_interval_ms: Option<u64>,
  pub refetch_on_reconnect: bool,
  pub refetch_on_window_focus: bool,
  pub stale_while_revalidate: bool,
}

impl Default for QueriesConfig {
  fn default() -> Self {
    let defaults = QueryOptions::default();
    Self {
      stale_time_ms: millis(defaults.stale_time),
      gc_time_ms: millis(defaults.gc_time),
      retry: defaults.retry,
      retry_delay_ms: millis(defaults.retry_delay),
      refetch_interval_ms: defaults.refetch_interval.map(millis),
      refetch_on_reconnect: defaults.refetch_on_reconnect,
      refetch_on_window_focus: defaults.refetch_on_window_focus,
      stale_while_revalidate: defaults.stale_while_revalidate,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MutationsConfig {
  pub retry: u32,
  pub retry_delay_ms: u64,
}

impl Default for MutationsConfig {
  fn default() -> Self {
    let defaults = MutationOptions::default();
    Self {
      retry: defaults.retry,
      retry_delay_ms: millis(defaults.retry_delay),
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PostsConfig {
  /// Initial page size of the post list (one of 5, 10, 20, 50)
  pub page_size: u32,
}

impl Default for PostsConfig {
  fn default() -> Self {
    Self { page_size: 10 }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectivityConfig {
  pub probe_interval_ms: u64,
  pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_interval_ms: 10_000,
      probe_timeout_ms: 3_000,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter used when RUST_LOG is not set
  pub level: String,
  /// Log file; defaults to the platform data directory
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

fn millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./postdeck.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/postdeck/config.yaml
  ///
  /// With no file anywhere the defaults are used; the demo API needs no
  /// credentials.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("postdeck.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("postdeck").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid "all defaults" config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Reject values that would only fail later, deep in the UI
  pub fn validate(&self) -> Result<()> {
    url::Url::parse(&self.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url {:?}: {}", self.api.base_url, e))?;
    if !PAGE_SIZES.contains(&self.posts.page_size) {
      return Err(eyre!(
        "posts.page_size must be one of {:?}, got {}",
        PAGE_SIZES,
        self.posts.page_size
      ));
    }
    if self.connectivity.probe_interval_ms == 0 {
      return Err(eyre!("connectivity.probe_interval_ms must be positive"));
    }
    Ok(())
  }

  pub fn query_options(&self) -> QueryOptions {
    let q = &self.queries;
    QueryOptions {
      stale_time: Duration::from_millis(q.stale_time_ms),
      gc_time: Duration::from_millis(q.gc_time_ms),
      retry: q.retry,
      retry_delay: Duration::from_millis(q.retry_delay_ms),
      refetch_interval: q.refetch_interval_ms.map(Duration::from_millis),
      refetch_on_reconnect: q.refetch_on_reconnect,
      refetch_on_window_focus: q.refetch_on_window_focus,
      stale_while_revalidate: q.stale_while_revalidate,
    }
  }

  pub fn mutation_options(&self) -> MutationOptions {
    MutationOptions {
      retry: self.mutations.retry,
      retry_delay: Duration::from_millis(self.mutations.retry_delay_ms),
    }
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_millis(self.connectivity.probe_interval_ms)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.connectivity.probe_timeout_ms)
  }
}
