//! View-side handle onto one cached query.
//!
//! Inspired by TanStack Query's observers: a `Query<T>` subscribes to its key
//! in the shared cache, kicks off fetches, and is polled from the event loop
//! tick to pick up state changes.
//!
//! # Example
//!
//! ```ignore
//! let client = client.clone();
//! let mut query = Query::new(&cache, keys::users::list(), move || {
//!     let client = client.clone();
//!     async move { client.list_users().await }
//! });
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.data() {
//!     Some(users) => render_users(&users),
//!     None if query.is_loading() => render_spinner(),
//!     None => {}
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::RemoteError;

use super::cache::{FetchStatus, Fetcher, QueryCache, QueryStatus, Subscription};
use super::keys::QueryKey;

/// Observer of a single cache key
pub struct Query<T> {
  cache: QueryCache,
  key: QueryKey,
  fetcher: Fetcher,
  status: Option<QueryStatus>,
  data: Option<Arc<T>>,
  receiver: mpsc::UnboundedReceiver<QueryStatus>,
  _subscription: Subscription,
  interval: Option<JoinHandle<()>>,
  enabled: bool,
  started: bool,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Query<T> {
  /// Subscribe to `key`. Nothing is fetched until `fetch()`.
  pub fn new<F, Fut>(cache: &QueryCache, key: QueryKey, fetch: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
  {
    let (tx, receiver) = mpsc::unbounded_channel();
    let subscription = cache.subscribe(&key, move |_, status| {
      // Receiver gone means the handle is being dropped
      let _ = tx.send(status.clone());
    });

    let mut query = Self {
      cache: cache.clone(),
      key,
      fetcher: Fetcher::new(fetch),
      status: None,
      data: None,
      receiver,
      _subscription: subscription,
      interval: None,
      enabled: true,
      started: false,
      _marker: PhantomData,
    };
    query.sync();
    query
  }

  /// Use a stale time different from the cache default for this key
  pub fn with_stale_time(self, stale_time: Duration) -> Self {
    self.cache.set_stale_time(&self.key, stale_time);
    self
  }

  /// Poll the server every `interval` while this handle lives
  pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
    self.set_refetch_interval(Some(interval));
    self
  }

  /// Only fetch once `enabled` is true (dependent queries)
  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn set_enabled(&mut self, enabled: bool) {
    let was_enabled = self.enabled;
    self.enabled = enabled;
    if enabled && !was_enabled {
      self.fetch();
    }
  }

  /// Replace (or stop, with None) the polling interval
  pub fn set_refetch_interval(&mut self, interval: Option<Duration>) {
    if let Some(task) = self.interval.take() {
      task.abort();
    }
    let Some(period) = interval else {
      return;
    };
    let cache = self.cache.clone();
    let key = self.key.clone();
    self.interval = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      // The first tick completes immediately
      ticker.tick().await;
      loop {
        ticker.tick().await;
        // A slow response is waited for, not replaced
        cache.refetch_with(&key, false);
      }
    }));
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Fetch through the cache: served from cache when fresh, joined when a
  /// request is already running.
  pub fn fetch(&mut self) {
    if !self.enabled {
      return;
    }
    self.started = true;
    self.cache.ensure_fetch(&self.key, self.fetcher.clone());
    self.sync();
  }

  /// Force a network round-trip, superseding any running request
  pub fn refetch(&mut self) {
    if !self.enabled {
      return;
    }
    if self.cache.refetch(&self.key) == 0 {
      // Never fetched yet, so the cache has no fetch function for the key
      self.fetch();
    }
  }

  /// Drain pending notifications. Returns true if anything changed.
  /// Call this in your event loop tick handler.
  ///
  /// An entry that was evicted from under a started handle (cache cleared)
  /// is fetched again, as a freshly mounted observer would.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while self.receiver.try_recv().is_ok() {
      changed = true;
    }
    if changed {
      self.sync();
      let reset = self.status() == FetchStatus::Idle && !self.is_fetching();
      if reset && self.started && self.enabled {
        tracing::debug!(key = %self.key, "entry was reset, fetching again");
        self.fetch();
      }
    }
    changed
  }

  fn sync(&mut self) {
    self.status = self.cache.state(&self.key);
    self.data = self.cache.get::<T>(&self.key);
  }

  pub fn data(&self) -> Option<Arc<T>> {
    self.data.clone()
  }

  pub fn status(&self) -> FetchStatus {
    self
      .status
      .as_ref()
      .map(|status| status.status)
      .unwrap_or_default()
  }

  /// First load: fetching with nothing to show yet
  pub fn is_loading(&self) -> bool {
    self.data.is_none() && self.is_fetching()
  }

  /// Any request running, including background refetches
  pub fn is_fetching(&self) -> bool {
    self.status.as_ref().is_some_and(|status| status.is_fetching)
  }

  pub fn is_stale(&self) -> bool {
    self.status.as_ref().map_or(true, |status| status.is_stale)
  }

  pub fn is_error(&self) -> bool {
    self.status() == FetchStatus::Error
  }

  pub fn error(&self) -> Option<&RemoteError> {
    self.status.as_ref().and_then(|status| status.error.as_ref())
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(task) = self.interval.take() {
      task.abort();
    }
  }
}

impl<T> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("status", &self.status)
      .field("enabled", &self.enabled)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::keys::{posts, users};
  use crate::query::QueryOptions;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn cache() -> QueryCache {
    QueryCache::new(QueryOptions {
      retry: 0,
      ..QueryOptions::default()
    })
  }

  #[tokio::test]
  async fn test_query_success() {
    let cache = cache();
    let mut query = Query::new(&cache, users::list(), || async {
      Ok::<_, RemoteError>(vec![1, 2, 3])
    });

    assert_eq!(query.status(), FetchStatus::Idle);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert_eq!(query.status(), FetchStatus::Success);
    assert_eq!(query.data().as_deref(), Some(&vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_query_error() {
    let cache = cache();
    let mut query: Query<i32> = Query::new(&cache, users::list(), || async {
      Err(RemoteError::status(500, "Something went wrong"))
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_error());
    assert_eq!(
      query.error().map(RemoteError::message),
      Some("Something went wrong")
    );
  }

  #[tokio::test]
  async fn test_handles_on_one_key_see_the_same_data() {
    let cache = cache();
    let counter = Arc::new(AtomicU32::new(0));
    let make = |counter: Arc<AtomicU32>| {
      move || {
        let counter = Arc::clone(&counter);
        async move {
          tokio::time::sleep(Duration::from_millis(20)).await;
          Ok::<_, RemoteError>(counter.fetch_add(1, Ordering::SeqCst))
        }
      }
    };

    let mut first = Query::new(&cache, posts::detail(1), make(Arc::clone(&counter)));
    let mut second = Query::new(&cache, posts::detail(1), make(Arc::clone(&counter)));
    first.fetch();
    second.fetch();
    assert!(first.is_loading());

    tokio::time::sleep(Duration::from_millis(60)).await;
    first.poll();
    second.poll();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(first.data().as_deref(), Some(&0));
    assert_eq!(second.data().as_deref(), Some(&0));
  }

  #[tokio::test]
  async fn test_disabled_query_waits_until_enabled() {
    let cache = cache();
    let mut query = Query::new(&cache, users::detail(1), || async {
      Ok::<_, RemoteError>("Leanne")
    })
    .enabled(false);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!query.poll());
    assert!(query.data().is_none());

    query.set_enabled(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.data().as_deref(), Some(&"Leanne"));
  }

  #[tokio::test]
  async fn test_refetch_interval_polls_until_dropped() {
    let cache = cache();
    let counter = Arc::new(AtomicU32::new(0));
    let counted = Arc::clone(&counter);
    let mut query = Query::new(&cache, users::list(), move || {
      let counted = Arc::clone(&counted);
      async move { Ok::<_, RemoteError>(counted.fetch_add(1, Ordering::SeqCst)) }
    })
    .with_refetch_interval(Duration::from_millis(20));

    query.fetch();
    tokio::time::sleep(Duration::from_millis(90)).await;
    let polled = counter.load(Ordering::SeqCst);
    assert!(polled >= 3, "expected several fetches, got {}", polled);

    drop(query);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_drop = counter.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(counter.load(Ordering::SeqCst), after_drop);
  }

  #[tokio::test]
  async fn test_cleared_query_fetches_again_on_poll() {
    let cache = cache();
    let counter = Arc::new(AtomicU32::new(0));
    let counted = Arc::clone(&counter);
    let mut query = Query::new(&cache, users::list(), move || {
      let counted = Arc::clone(&counted);
      async move { Ok::<_, RemoteError>(counted.fetch_add(1, Ordering::SeqCst)) }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.data().as_deref(), Some(&0));

    cache.clear();
    assert!(query.poll());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(query.poll());

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(query.data().as_deref(), Some(&1));
  }

  #[tokio::test]
  async fn test_refetch_before_first_fetch_starts_one() {
    let cache = cache();
    let mut query = Query::new(&cache, users::list(), || async {
      Ok::<_, RemoteError>(3u8)
    });

    query.refetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.data().as_deref(), Some(&3));
  }

  #[tokio::test]
  async fn test_interval_shorter_than_response_waits_for_it() {
    let cache = cache();
    let running = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    let (gauge, high) = (Arc::clone(&running), Arc::clone(&peak));
    let mut query = Query::new(&cache, users::list(), move || {
      let (gauge, high) = (Arc::clone(&gauge), Arc::clone(&high));
      async move {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        high.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        gauge.fetch_sub(1, Ordering::SeqCst);
        Ok::<_, RemoteError>(7u8)
      }
    })
    .with_refetch_interval(Duration::from_millis(20));

    query.fetch();
    tokio::time::sleep(Duration::from_millis(300)).await;
    query.poll();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(query.data().as_deref(), Some(&7));
    assert!(query.status.as_ref().and_then(|status| status.updated_at).is_some());
  }
}
