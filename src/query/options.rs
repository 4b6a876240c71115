use std::time::Duration;

/// Upper bound for the exponential retry backoff
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Behaviour knobs for every query in a cache.
///
/// Nothing here is implicit: the application builds this from its config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
  /// Age after which cached data is stale and eligible for refetch
  pub stale_time: Duration,
  /// Idle time with zero subscribers before an entry is evicted
  pub gc_time: Duration,
  /// Extra attempts after a failed fetch
  pub retry: u32,
  /// Base delay, doubled on each attempt
  pub retry_delay: Duration,
  /// Default polling interval for subscribed queries
  pub refetch_interval: Option<Duration>,
  pub refetch_on_reconnect: bool,
  pub refetch_on_window_focus: bool,
  /// Serve stale data immediately while a background refetch runs,
  /// instead of waiting for fresh data
  pub stale_while_revalidate: bool,
}

/// `base * 2^attempt`, capped
fn backoff(base: Duration, attempt: u32) -> Duration {
  let factor = 2u32.saturating_pow(attempt);
  base
    .checked_mul(factor)
    .unwrap_or(MAX_RETRY_DELAY)
    .min(MAX_RETRY_DELAY)
}

impl QueryOptions {
  /// Delay before retry number `attempt` (0-based)
  pub fn retry_backoff(&self, attempt: u32) -> Duration {
    backoff(self.retry_delay, attempt)
  }
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(60),
      gc_time: Duration::from_secs(5 * 60),
      retry: 1,
      retry_delay: Duration::from_secs(1),
      refetch_interval: None,
      refetch_on_reconnect: true,
      refetch_on_window_focus: false,
      stale_while_revalidate: true,
    }
  }
}

/// Behaviour knobs for mutations. Writes are not retried unless asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOptions {
  pub retry: u32,
  pub retry_delay: Duration,
}

impl MutationOptions {
  pub fn retry_backoff(&self, attempt: u32) -> Duration {
    backoff(self.retry_delay, attempt)
  }
}

impl Default for MutationOptions {
  fn default() -> Self {
    Self {
      retry: 0,
      retry_delay: Duration::from_secs(1),
    }
  }
}
