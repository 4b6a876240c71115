//! In-memory query cache.
//!
//! One `QueryCache` is built at startup and handed to every view. Clones
//! share the same store. Entries are keyed by `QueryKey` and hold type-erased
//! data, so lists, details and infinite pages live side by side.
//!
//! Locking: all bookkeeping happens under a single mutex and never across an
//! await. Listeners are called after the lock is released, so they may call
//! back into the cache.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::api::RemoteError;

use super::keys::QueryKey;
use super::observer::{ErrorObserver, TracingErrorObserver};
use super::online::OnlineManager;
use super::options::QueryOptions;

/// Type-erased cached value
pub type AnyData = Arc<dyn Any + Send + Sync>;

type FetchResult = Result<AnyData, RemoteError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type Listener = Arc<dyn Fn(&QueryKey, &QueryStatus) + Send + Sync>;

/// Errors surfaced by typed cache reads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
  #[error(transparent)]
  Remote(#[from] RemoteError),
  #[error("cached value for {0} has an unexpected type")]
  TypeMismatch(String),
}

/// Re-runnable fetch function for one key
#[derive(Clone)]
pub struct Fetcher(Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>);

impl Fetcher {
  pub fn new<T, F, Fut>(fetch: F) -> Self
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
  {
    Self(Arc::new(move || {
      let fut = fetch();
      async move { fut.await.map(|data| Arc::new(data) as AnyData) }.boxed()
    }))
  }

  fn call(&self) -> BoxFuture<'static, FetchResult> {
    (self.0)()
  }
}

/// Data lifecycle of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchStatus {
  /// Never fetched
  #[default]
  Idle,
  /// First fetch in progress, no data yet
  Loading,
  /// Last fetch failed (older data may still be present)
  Error,
  /// Data present and last fetch succeeded
  Success,
}

/// Snapshot of an entry as seen by listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStatus {
  pub status: FetchStatus,
  pub is_fetching: bool,
  pub is_stale: bool,
  pub has_data: bool,
  pub error: Option<RemoteError>,
  pub updated_at: Option<DateTime<Utc>>,
}

/// Row of the cache inspector
#[derive(Debug, Clone)]
pub struct EntrySummary {
  pub key: QueryKey,
  pub status: QueryStatus,
  pub subscribers: usize,
}

/// Saved state of one entry, see `QueryCache::snapshot`
#[derive(Clone)]
pub struct EntrySnapshot {
  key: QueryKey,
  data: AnyData,
  status: FetchStatus,
  error: Option<RemoteError>,
  fetched_at: Option<Instant>,
  updated_at: Option<DateTime<Utc>>,
  invalidated: bool,
}

impl EntrySnapshot {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn data(&self) -> &AnyData {
    &self.data
  }
}

/// What a fetch call found: a value to hand out now, or a request to await
enum Begun {
  Cached(AnyData),
  Pending(SharedFetch),
}

struct InFlight {
  generation: u64,
  future: SharedFetch,
  /// Status to fall back to if the request is cancelled
  prior_status: FetchStatus,
}

#[derive(Default)]
struct Entry {
  data: Option<AnyData>,
  status: FetchStatus,
  error: Option<RemoteError>,
  fetched_at: Option<Instant>,
  updated_at: Option<DateTime<Utc>>,
  invalidated: bool,
  stale_time: Option<Duration>,
  listeners: HashMap<u64, Listener>,
  fetcher: Option<Fetcher>,
  in_flight: Option<InFlight>,
  generation: u64,
  gc_epoch: u64,
}

impl Entry {
  fn is_stale(&self, options: &QueryOptions) -> bool {
    if self.data.is_none() || self.invalidated {
      return true;
    }
    let stale_time = self.stale_time.unwrap_or(options.stale_time);
    self
      .fetched_at
      .map(|at| at.elapsed() >= stale_time)
      .unwrap_or(true)
  }

  fn snapshot(&self, options: &QueryOptions) -> QueryStatus {
    QueryStatus {
      status: self.status,
      is_fetching: self.in_flight.is_some(),
      is_stale: self.is_stale(options),
      has_data: self.data.is_some(),
      error: self.error.clone(),
      updated_at: self.updated_at,
    }
  }

  fn notification(&self, key: &QueryKey, options: &QueryOptions) -> Option<Notification> {
    if self.listeners.is_empty() {
      return None;
    }
    Some(Notification {
      key: key.clone(),
      status: self.snapshot(options),
      listeners: self.listeners.values().cloned().collect(),
    })
  }

  fn store(&mut self, data: AnyData) {
    self.data = Some(data);
    self.status = FetchStatus::Success;
    self.error = None;
    self.fetched_at = Some(Instant::now());
    self.updated_at = Some(Utc::now());
    self.invalidated = false;
  }
}

/// Pending listener calls, fired once the lock is gone
struct Notification {
  key: QueryKey,
  status: QueryStatus,
  listeners: Vec<Listener>,
}

impl Notification {
  fn fire(self) {
    for listener in self.listeners {
      listener(&self.key, &self.status);
    }
  }
}

fn fire_all(notifications: Vec<Notification>) {
  for notification in notifications {
    notification.fire();
  }
}

#[derive(Default)]
struct State {
  entries: HashMap<QueryKey, Entry>,
  next_listener: u64,
}

struct CacheInner {
  state: Mutex<State>,
  options: QueryOptions,
  online: OnlineManager,
  observer: Arc<dyn ErrorObserver>,
}

/// Shared query cache handle
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<CacheInner>,
}

impl QueryCache {
  pub fn new(options: QueryOptions) -> Self {
    Self::with_observer(options, OnlineManager::default(), Arc::new(TracingErrorObserver))
  }

  pub fn with_observer(
    options: QueryOptions,
    online: OnlineManager,
    observer: Arc<dyn ErrorObserver>,
  ) -> Self {
    Self {
      inner: Arc::new(CacheInner {
        state: Mutex::new(State::default()),
        options,
        online,
        observer,
      }),
    }
  }

  pub fn options(&self) -> &QueryOptions {
    &self.inner.options
  }

  pub fn observer(&self) -> Arc<dyn ErrorObserver> {
    Arc::clone(&self.inner.observer)
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    // Entries stay consistent between statements, so a poisoned lock is usable
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  // ==========================================================================
  // Fetching
  // ==========================================================================

  /// Get the value for `key`, fetching it if needed.
  ///
  /// Fresh data is returned as-is. Stale data is returned immediately with a
  /// background refetch when stale-while-revalidate is on; otherwise the call
  /// waits for the network. Concurrent callers for one key share one request.
  pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetch: F) -> Result<Arc<T>, QueryError>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
  {
    let data = self.fetch_with(key, Fetcher::new(fetch)).await?;
    downcast(key, data)
  }

  /// Untyped `fetch`, for callers that already hold a `Fetcher`
  pub async fn fetch_with(&self, key: &QueryKey, fetcher: Fetcher) -> Result<AnyData, QueryError> {
    match self.begin_fetch(key, fetcher) {
      Begun::Cached(data) => Ok(data),
      Begun::Pending(pending) => Ok(pending.await?),
    }
  }

  /// Start or join the request for `key` without waiting for it. The entry
  /// is `Loading`/fetching by the time this returns.
  pub fn ensure_fetch(&self, key: &QueryKey, fetcher: Fetcher) {
    self.begin_fetch(key, fetcher);
  }

  fn begin_fetch(&self, key: &QueryKey, fetcher: Fetcher) -> Begun {
    let (begun, notification) = {
      let mut state = self.lock();
      let entry = state.entries.entry(key.clone()).or_default();
      entry.fetcher = Some(fetcher.clone());

      let stale = entry.is_stale(&self.inner.options);
      let cached = entry.data.clone();
      if let Some(data) = &cached {
        if !stale {
          return Begun::Cached(Arc::clone(data));
        }
      }

      let started = entry.in_flight.is_none();
      let pending = match &entry.in_flight {
        Some(in_flight) => in_flight.future.clone(),
        None => self.spawn_fetch(key, entry, fetcher),
      };
      let notification = if started {
        entry.notification(key, &self.inner.options)
      } else {
        None
      };

      let begun = match cached {
        Some(data) if self.inner.options.stale_while_revalidate => {
          tracing::debug!(%key, "serving stale data while revalidating");
          Begun::Cached(data)
        }
        _ => Begun::Pending(pending),
      };
      (begun, notification)
    };

    if let Some(notification) = notification {
      notification.fire();
    }
    begun
  }

  /// Fire-and-forget fetch, used to warm the cache
  pub fn prefetch<T, F, Fut>(&self, key: &QueryKey, fetch: F)
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
  {
    let cache = self.clone();
    let key = key.clone();
    tokio::spawn(async move {
      if let Err(err) = cache.fetch(&key, fetch).await {
        tracing::debug!(%key, %err, "prefetch failed");
      }
    });
  }

  /// Start (or join) a request for an entry. With `force`, a running request
  /// is superseded: its result will be ignored when it lands.
  fn start_fetch(&self, key: &QueryKey, entry: &mut Entry, force: bool) -> Option<SharedFetch> {
    if let Some(in_flight) = &entry.in_flight {
      if !force {
        return Some(in_flight.future.clone());
      }
    }
    let fetcher = entry.fetcher.clone()?;
    Some(self.spawn_fetch(key, entry, fetcher))
  }

  fn spawn_fetch(&self, key: &QueryKey, entry: &mut Entry, fetcher: Fetcher) -> SharedFetch {
    entry.generation += 1;
    let generation = entry.generation;
    let prior_status = entry
      .in_flight
      .as_ref()
      .map(|in_flight| in_flight.prior_status)
      .unwrap_or(entry.status);

    let cache = self.clone();
    let owned_key = key.clone();
    let future = async move {
      let result = cache.run_with_retry(&owned_key, &fetcher).await;
      cache.settle(&owned_key, generation, &result);
      result
    }
    .boxed()
    .shared();

    entry.in_flight = Some(InFlight {
      generation,
      future: future.clone(),
      prior_status,
    });
    if entry.data.is_none() {
      entry.status = FetchStatus::Loading;
    }

    tracing::debug!(%key, generation, "fetch started");
    // Drive the request even if every caller goes away
    tokio::spawn(future.clone());
    future
  }

  /// Run a request that is not stored as an entry (a next page, say) under
  /// the same offline pause and retry policy as cached fetches. A final
  /// failure is reported to the error observer.
  pub async fn run_fetch<T, F, Fut>(&self, key: &QueryKey, fetch: F) -> Result<T, RemoteError>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
  {
    let result = self.retrying(key, fetch).await;
    if let Err(err) = &result {
      self.inner.observer.on_query_error(key, err);
    }
    result
  }

  async fn run_with_retry(&self, key: &QueryKey, fetcher: &Fetcher) -> FetchResult {
    self.retrying(key, || fetcher.call()).await
  }

  async fn retrying<T, F, Fut>(&self, key: &QueryKey, fetch: F) -> Result<T, RemoteError>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
  {
    let mut attempt = 0;
    loop {
      if !self.inner.online.is_online() {
        tracing::debug!(%key, "offline, fetch paused");
        self.inner.online.wait_online().await;
      }

      match fetch().await {
        Ok(data) => return Ok(data),
        Err(err) if attempt < self.inner.options.retry => {
          let delay = self.inner.options.retry_backoff(attempt);
          tracing::warn!(%key, attempt, ?delay, %err, "fetch failed, retrying");
          attempt += 1;
          tokio::time::sleep(delay).await;
        }
        Err(err) => return Err(err),
      }
    }
  }

  /// Apply a finished request, unless it was cancelled or superseded
  fn settle(&self, key: &QueryKey, generation: u64, result: &FetchResult) {
    let notification = {
      let mut state = self.lock();
      let Some(entry) = state.entries.get_mut(key) else {
        tracing::debug!(%key, "entry removed before fetch settled");
        return;
      };
      match &entry.in_flight {
        Some(in_flight) if in_flight.generation == generation => {}
        _ => {
          tracing::debug!(%key, generation, "ignoring superseded fetch");
          return;
        }
      }

      entry.in_flight = None;
      match result {
        Ok(data) => entry.store(Arc::clone(data)),
        Err(err) => {
          entry.status = FetchStatus::Error;
          entry.error = Some(err.clone());
        }
      }
      if entry.listeners.is_empty() {
        self.schedule_gc(key, entry);
      }
      entry.notification(key, &self.inner.options)
    };

    match result {
      Ok(_) => tracing::debug!(%key, generation, "fetch settled"),
      Err(err) => self.inner.observer.on_query_error(key, err),
    }
    if let Some(notification) = notification {
      notification.fire();
    }
  }

  // ==========================================================================
  // Subscriptions and garbage collection
  // ==========================================================================

  /// Register a listener for every state change of `key`
  pub fn subscribe<F>(&self, key: &QueryKey, listener: F) -> Subscription
  where
    F: Fn(&QueryKey, &QueryStatus) + Send + Sync + 'static,
  {
    let mut state = self.lock();
    let id = state.next_listener;
    state.next_listener += 1;

    let entry = state.entries.entry(key.clone()).or_default();
    entry.listeners.insert(id, Arc::new(listener));
    // Any pending collection is now void
    entry.gc_epoch += 1;

    Subscription {
      cache: self.clone(),
      key: key.clone(),
      id,
    }
  }

  fn unsubscribe(&self, key: &QueryKey, id: u64) {
    let mut state = self.lock();
    if let Some(entry) = state.entries.get_mut(key) {
      entry.listeners.remove(&id);
      if entry.listeners.is_empty() {
        self.schedule_gc(key, entry);
      }
    }
  }

  fn schedule_gc(&self, key: &QueryKey, entry: &mut Entry) {
    entry.gc_epoch += 1;
    let epoch = entry.gc_epoch;
    let gc_time = self.inner.options.gc_time;

    // Without a runtime (teardown, sync tests) the entry simply stays
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      return;
    };
    let cache = self.clone();
    let key = key.clone();
    handle.spawn(async move {
      tokio::time::sleep(gc_time).await;
      cache.collect(&key, epoch);
    });
  }

  fn collect(&self, key: &QueryKey, epoch: u64) {
    let mut state = self.lock();
    let collectable = state.entries.get(key).is_some_and(|entry| {
      entry.gc_epoch == epoch && entry.listeners.is_empty() && entry.in_flight.is_none()
    });
    if collectable {
      state.entries.remove(key);
      tracing::debug!(%key, "entry garbage collected");
    }
  }

  // ==========================================================================
  // Bulk operations by prefix
  // ==========================================================================

  /// Mark matching entries stale and refetch those somebody is watching.
  /// Returns how many entries matched.
  pub fn invalidate(&self, prefix: &QueryKey) -> usize {
    let mut notifications = Vec::new();
    let mut matched = 0;
    {
      let mut state = self.lock();
      for (key, entry) in state.entries.iter_mut() {
        if !key.starts_with(prefix) {
          continue;
        }
        matched += 1;
        entry.invalidated = true;
        if !entry.listeners.is_empty() {
          self.start_fetch(key, entry, true);
        }
        notifications.extend(entry.notification(key, &self.inner.options));
      }
    }
    tracing::debug!(%prefix, matched, "invalidated");
    fire_all(notifications);
    matched
  }

  /// Refetch every matching entry that knows how to fetch itself. A request
  /// already running is superseded.
  pub fn refetch(&self, prefix: &QueryKey) -> usize {
    self.refetch_with(prefix, true)
  }

  /// Refetch matching entries. Without `cancel_running`, an entry whose
  /// request is still in the air keeps it and counts as refetched.
  pub fn refetch_with(&self, prefix: &QueryKey, cancel_running: bool) -> usize {
    let mut notifications = Vec::new();
    let mut started = 0;
    {
      let mut state = self.lock();
      for (key, entry) in state.entries.iter_mut() {
        if !key.starts_with(prefix) {
          continue;
        }
        let joined = entry.in_flight.is_some() && !cancel_running;
        if self.start_fetch(key, entry, cancel_running).is_some() {
          started += 1;
          if !joined {
            notifications.extend(entry.notification(key, &self.inner.options));
          }
        }
      }
    }
    fire_all(notifications);
    started
  }

  /// Refetch stale entries that have subscribers and no request running.
  /// Used by the focus and reconnect triggers.
  fn refetch_stale_active(&self) -> usize {
    let mut notifications = Vec::new();
    let mut started = 0;
    {
      let mut state = self.lock();
      for (key, entry) in state.entries.iter_mut() {
        let due = !entry.listeners.is_empty()
          && entry.in_flight.is_none()
          && entry.is_stale(&self.inner.options);
        if due && self.start_fetch(key, entry, false).is_some() {
          started += 1;
          notifications.extend(entry.notification(key, &self.inner.options));
        }
      }
    }
    fire_all(notifications);
    started
  }

  /// Detach running requests for matching entries. The network call is not
  /// aborted; its result is dropped when it arrives.
  pub fn cancel(&self, prefix: &QueryKey) -> usize {
    let mut notifications = Vec::new();
    let mut cancelled = 0;
    {
      let mut state = self.lock();
      for (key, entry) in state.entries.iter_mut() {
        if !key.starts_with(prefix) {
          continue;
        }
        if let Some(in_flight) = entry.in_flight.take() {
          cancelled += 1;
          entry.status = in_flight.prior_status;
          notifications.extend(entry.notification(key, &self.inner.options));
        }
      }
    }
    if cancelled > 0 {
      tracing::debug!(%prefix, cancelled, "cancelled in-flight fetches");
    }
    fire_all(notifications);
    cancelled
  }

  /// Evict matching entries now. Watched entries are reset in place instead,
  /// so their subscribers stay attached and see the reset.
  pub fn remove(&self, prefix: &QueryKey) -> usize {
    let count = self.evict(|key| key.starts_with(prefix));
    tracing::debug!(%prefix, count, "removed");
    count
  }

  /// Evict everything
  pub fn clear(&self) -> usize {
    let count = self.evict(|_| true);
    tracing::info!(count, "cache cleared");
    count
  }

  fn evict(&self, matches: impl Fn(&QueryKey) -> bool) -> usize {
    let options = &self.inner.options;
    let mut notifications = Vec::new();
    let mut count = 0;
    self.lock().entries.retain(|key, entry| {
      if !matches(key) {
        return true;
      }
      count += 1;
      if entry.listeners.is_empty() {
        return false;
      }
      // generation is kept so a request still in the air is ignored
      *entry = Entry {
        listeners: std::mem::take(&mut entry.listeners),
        fetcher: entry.fetcher.take(),
        stale_time: entry.stale_time,
        generation: entry.generation,
        ..Entry::default()
      };
      notifications.extend(entry.notification(key, options));
      true
    });
    fire_all(notifications);
    count
  }

  // ==========================================================================
  // Direct reads and writes
  // ==========================================================================

  /// Write a value without a network round-trip
  pub fn set<T: Send + Sync + 'static>(&self, key: &QueryKey, data: T) {
    self.set_arc(key, Arc::new(data));
  }

  /// Write an already shared value; reads will return this exact `Arc`
  pub fn set_arc(&self, key: &QueryKey, data: AnyData) {
    let notification = {
      let mut state = self.lock();
      let entry = state.entries.entry(key.clone()).or_default();
      entry.store(data);
      if entry.listeners.is_empty() {
        self.schedule_gc(key, entry);
      }
      entry.notification(key, &self.inner.options)
    };
    if let Some(notification) = notification {
      notification.fire();
    }
  }

  /// Read-modify-write. Returns false if there is no value of type `T`.
  pub fn update<T, F>(&self, key: &QueryKey, f: F) -> bool
  where
    T: Send + Sync + 'static,
    F: FnOnce(&T) -> Option<T>,
  {
    let Some(current) = self.get::<T>(key) else {
      return false;
    };
    match f(&current) {
      Some(next) => {
        self.set(key, next);
        true
      }
      None => false,
    }
  }

  pub fn get<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
    let data = self.get_raw(key)?;
    downcast(key, data).ok()
  }

  pub fn get_raw(&self, key: &QueryKey) -> Option<AnyData> {
    self.lock().entries.get(key).and_then(|entry| entry.data.clone())
  }

  /// Copies of every matching entry that holds data
  pub fn snapshot(&self, prefix: &QueryKey) -> Vec<EntrySnapshot> {
    self
      .lock()
      .entries
      .iter()
      .filter(|(key, _)| key.starts_with(prefix))
      .filter_map(|(key, entry)| {
        Some(EntrySnapshot {
          key: key.clone(),
          data: entry.data.clone()?,
          status: entry.status,
          error: entry.error.clone(),
          fetched_at: entry.fetched_at,
          updated_at: entry.updated_at,
          invalidated: entry.invalidated,
        })
      })
      .collect()
  }

  /// Put an entry back as `snapshot` saw it: same `Arc`, status and
  /// freshness. Listeners and any running request are left alone.
  pub fn restore(&self, snapshot: EntrySnapshot) {
    let key = snapshot.key;
    let notification = {
      let mut state = self.lock();
      let entry = state.entries.entry(key.clone()).or_default();
      entry.data = Some(snapshot.data);
      entry.status = snapshot.status;
      entry.error = snapshot.error;
      entry.fetched_at = snapshot.fetched_at;
      entry.updated_at = snapshot.updated_at;
      entry.invalidated = snapshot.invalidated;
      if entry.listeners.is_empty() {
        self.schedule_gc(&key, entry);
      }
      entry.notification(&key, &self.inner.options)
    };
    if let Some(notification) = notification {
      notification.fire();
    }
  }

  pub fn state(&self, key: &QueryKey) -> Option<QueryStatus> {
    self
      .lock()
      .entries
      .get(key)
      .map(|entry| entry.snapshot(&self.inner.options))
  }

  /// Override the stale time for one key
  pub fn set_stale_time(&self, key: &QueryKey, stale_time: Duration) {
    let mut state = self.lock();
    state.entries.entry(key.clone()).or_default().stale_time = Some(stale_time);
  }

  /// Every entry, ordered by key, for display
  pub fn inspect(&self) -> Vec<EntrySummary> {
    let mut summaries: Vec<EntrySummary> = self
      .lock()
      .entries
      .iter()
      .map(|(key, entry)| EntrySummary {
        key: key.clone(),
        status: entry.snapshot(&self.inner.options),
        subscribers: entry.listeners.len(),
      })
      .collect();
    summaries.sort_by_cached_key(|summary| summary.key.to_string());
    summaries
  }

  // ==========================================================================
  // Connectivity and focus
  // ==========================================================================

  pub fn is_online(&self) -> bool {
    self.inner.online.is_online()
  }

  /// Feed a connectivity signal. Coming back online refetches stale watched
  /// queries when `refetch_on_reconnect` is set.
  pub fn set_online(&self, online: bool) {
    if !self.inner.online.set_online(online) {
      return;
    }
    tracing::info!(online, "connectivity changed");
    if online && self.inner.options.refetch_on_reconnect {
      let started = self.refetch_stale_active();
      tracing::debug!(started, "refetching after reconnect");
    }
  }

  /// Feed a focus signal
  pub fn focus_changed(&self, focused: bool) {
    if focused && self.inner.options.refetch_on_window_focus {
      let started = self.refetch_stale_active();
      tracing::debug!(started, "refetching on focus");
    }
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new(QueryOptions::default())
  }
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, data: AnyData) -> Result<Arc<T>, QueryError> {
  data
    .downcast::<T>()
    .map_err(|_| QueryError::TypeMismatch(key.to_string()))
}

/// Live listener registration. Dropping it unsubscribes.
pub struct Subscription {
  cache: QueryCache,
  key: QueryKey,
  id: u64,
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.cache.unsubscribe(&self.key, self.id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{ListPostsParams, PaginatedResponse, Post};
  use crate::query::keys::{posts, users, ListFilters};
  use std::sync::atomic::{AtomicU32, Ordering};

  fn list_key(page: u32) -> QueryKey {
    posts::list(&ListFilters::page(&ListPostsParams::new(page, 10)))
  }

  fn counting_fetcher(
    counter: &Arc<AtomicU32>,
    delay: Duration,
  ) -> impl Fn() -> BoxFuture<'static, Result<u32, RemoteError>> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move || {
      let counter = Arc::clone(&counter);
      async move {
        tokio::time::sleep(delay).await;
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
      }
      .boxed()
    }
  }

  fn options() -> QueryOptions {
    QueryOptions {
      retry: 0,
      retry_delay: Duration::from_millis(1),
      ..QueryOptions::default()
    }
  }

  #[tokio::test]
  async fn test_concurrent_fetches_share_one_request() {
    let cache = QueryCache::new(options());
    let counter = Arc::new(AtomicU32::new(0));
    let key = list_key(1);

    let (a, b) = tokio::join!(
      cache.fetch(&key, counting_fetcher(&counter, Duration::from_millis(30))),
      cache.fetch(&key, counting_fetcher(&counter, Duration::from_millis(30))),
    );

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(*a, 1);
    assert!(Arc::ptr_eq(&a, &b));
  }

  #[tokio::test]
  async fn test_fresh_data_is_served_without_fetching() {
    let cache = QueryCache::new(options());
    let counter = Arc::new(AtomicU32::new(0));
    let key = list_key(1);

    cache
      .fetch(&key, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();
    let again = cache
      .fetch(&key, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(*again, 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_returns_stale_then_refreshes() {
    let cache = QueryCache::new(QueryOptions {
      stale_time: Duration::ZERO,
      ..options()
    });
    let counter = Arc::new(AtomicU32::new(0));
    let key = list_key(1);

    cache
      .fetch(&key, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();
    let stale = cache
      .fetch(&key, counting_fetcher(&counter, Duration::from_millis(20)))
      .await
      .unwrap();
    assert_eq!(*stale, 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.get::<u32>(&key).as_deref(), Some(&2));
  }

  #[tokio::test]
  async fn test_blocking_mode_waits_for_fresh_data() {
    let cache = QueryCache::new(QueryOptions {
      stale_time: Duration::ZERO,
      stale_while_revalidate: false,
      ..options()
    });
    let counter = Arc::new(AtomicU32::new(0));
    let key = list_key(1);

    cache
      .fetch(&key, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();
    let fresh = cache
      .fetch(&key, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(*fresh, 2);
  }

  #[tokio::test]
  async fn test_failed_fetch_is_retried_then_stored_as_error() {
    let cache = QueryCache::new(QueryOptions {
      retry: 2,
      retry_delay: Duration::from_millis(1),
      ..QueryOptions::default()
    });
    let attempts = Arc::new(AtomicU32::new(0));
    let key = users::list();

    let counted = Arc::clone(&attempts);
    let result = cache
      .fetch(&key, move || {
        let counted = Arc::clone(&counted);
        async move {
          counted.fetch_add(1, Ordering::SeqCst);
          Err::<u32, _>(RemoteError::status(500, "boom"))
        }
      })
      .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(
      result.unwrap_err(),
      QueryError::Remote(RemoteError::status(500, "boom"))
    );
    let status = cache.state(&key).unwrap();
    assert_eq!(status.status, FetchStatus::Error);
    assert!(!status.is_fetching);
  }

  #[tokio::test]
  async fn test_invalidate_prefix_marks_only_matching_entries() {
    let cache = QueryCache::new(options());
    cache.set(&list_key(1), 1u32);
    cache.set(&list_key(2), 2u32);
    cache.set(&posts::detail(1), 3u32);
    cache.set(&users::list(), 4u32);

    let matched = cache.invalidate(&posts::lists());

    assert_eq!(matched, 2);
    assert!(cache.state(&list_key(1)).unwrap().is_stale);
    assert!(cache.state(&list_key(2)).unwrap().is_stale);
    assert!(!cache.state(&posts::detail(1)).unwrap().is_stale);
    assert!(!cache.state(&users::list()).unwrap().is_stale);
  }

  #[tokio::test]
  async fn test_invalidate_refetches_subscribed_entries() {
    let cache = QueryCache::new(options());
    let counter = Arc::new(AtomicU32::new(0));
    let watched = list_key(1);
    let unwatched = list_key(2);

    cache
      .fetch(&watched, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();
    cache
      .fetch(&unwatched, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();
    let _subscription = cache.subscribe(&watched, |_, _| {});

    cache.invalidate(&posts::lists());
    tokio::time::sleep(Duration::from_millis(30)).await;

    // one refetch, for the watched key only
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(cache.get::<u32>(&watched).as_deref(), Some(&3));
    assert!(cache.state(&unwatched).unwrap().is_stale);
  }

  #[tokio::test]
  async fn test_listeners_see_transitions_and_stop_after_unsubscribe() {
    let cache = QueryCache::new(options());
    let key = list_key(1);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let subscription = cache.subscribe(&key, move |_, status| {
      sink.lock().unwrap().push(status.status);
    });

    cache.fetch(&key, || async { Ok(7u32) }).await.unwrap();
    drop(subscription);
    cache.set(&key, 8u32);

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![FetchStatus::Loading, FetchStatus::Success]);
  }

  #[tokio::test]
  async fn test_cancelled_fetch_leaves_cache_untouched() {
    let cache = QueryCache::new(options());
    let key = list_key(1);
    cache.set(&key, 1u32);
    cache.invalidate(&key);

    // stale value comes back at once, the refetch keeps running
    let stale = cache
      .fetch(&key, || async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(2u32)
      })
      .await
      .unwrap();
    assert_eq!(*stale, 1);
    assert!(cache.state(&key).unwrap().is_fetching);

    assert_eq!(cache.cancel(&posts::all()), 1);
    assert!(!cache.state(&key).unwrap().is_fetching);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.get::<u32>(&key).as_deref(), Some(&1));
    assert_eq!(cache.state(&key).unwrap().status, FetchStatus::Success);
  }

  #[tokio::test]
  async fn test_unwatched_entries_are_collected_after_gc_time() {
    let cache = QueryCache::new(QueryOptions {
      gc_time: Duration::from_millis(20),
      ..options()
    });
    let idle = list_key(1);
    let watched = list_key(2);

    let subscription = cache.subscribe(&watched, |_, _| {});
    cache.set(&idle, 1u32);
    cache.set(&watched, 2u32);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(cache.get::<u32>(&idle).is_none());
    assert!(cache.get::<u32>(&watched).is_some());

    drop(subscription);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(cache.get::<u32>(&watched).is_none());
  }

  #[tokio::test]
  async fn test_resubscribe_cancels_pending_collection() {
    let cache = QueryCache::new(QueryOptions {
      gc_time: Duration::from_millis(30),
      ..options()
    });
    let key = list_key(1);
    cache.set(&key, 1u32);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let _subscription = cache.subscribe(&key, |_, _| {});
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(cache.get::<u32>(&key).is_some());
  }

  #[tokio::test]
  async fn test_remove_and_clear() {
    let cache = QueryCache::new(options());
    cache.set(&list_key(1), 1u32);
    cache.set(&posts::detail(1), 2u32);
    cache.set(&users::list(), 3u32);

    assert_eq!(cache.remove(&posts::detail(1)), 1);
    assert!(cache.get::<u32>(&posts::detail(1)).is_none());
    assert!(cache.get::<u32>(&list_key(1)).is_some());

    assert_eq!(cache.clear(), 2);
    assert!(cache.inspect().is_empty());
  }

  #[tokio::test]
  async fn test_clear_resets_watched_entries_in_place() {
    let cache = QueryCache::new(options());
    let key = list_key(1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = cache.subscribe(&key, move |_, status| {
      sink.lock().unwrap().push(status.has_data);
    });
    cache.fetch(&key, || async { Ok(1u32) }).await.unwrap();

    assert_eq!(cache.clear(), 1);
    assert!(cache.get::<u32>(&key).is_none());
    assert_eq!(cache.inspect().len(), 1);
    assert_eq!(seen.lock().unwrap().last(), Some(&false));

    // the fetch function survived, so a refetch works without a new fetch call
    assert_eq!(cache.refetch(&key), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.get::<u32>(&key).as_deref(), Some(&1));
  }

  #[tokio::test]
  async fn test_type_mismatch_is_reported() {
    let cache = QueryCache::new(options());
    let key = list_key(1);
    cache.set(&key, 1u32);

    let result = cache
      .fetch(&key, || async { Ok(String::from("not a number")) })
      .await;
    assert!(matches!(result, Err(QueryError::TypeMismatch(_))));
    assert!(cache.get::<String>(&key).is_none());
  }

  #[tokio::test]
  async fn test_offline_fetch_waits_for_reconnect() {
    let online = OnlineManager::new(false);
    let cache = QueryCache::with_observer(options(), online, Arc::new(TracingErrorObserver));
    let key = users::list();

    let pending = {
      let cache = cache.clone();
      let key = key.clone();
      tokio::spawn(async move { cache.fetch(&key, || async { Ok(5u32) }).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());
    assert!(!cache.is_online());

    cache.set_online(true);
    let value = tokio::time::timeout(Duration::from_millis(100), pending)
      .await
      .expect("fetch should resume")
      .unwrap()
      .unwrap();
    assert_eq!(*value, 5);
  }

  #[tokio::test]
  async fn test_focus_refetches_stale_watched_entries_only_when_enabled() {
    let counter = Arc::new(AtomicU32::new(0));
    let key = list_key(1);

    let disabled = QueryCache::new(QueryOptions {
      stale_time: Duration::ZERO,
      ..options()
    });
    disabled
      .fetch(&key, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();
    let _watch = disabled.subscribe(&key, |_, _| {});
    disabled.focus_changed(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let enabled = QueryCache::new(QueryOptions {
      stale_time: Duration::ZERO,
      refetch_on_window_focus: true,
      ..options()
    });
    enabled
      .fetch(&key, counting_fetcher(&counter, Duration::ZERO))
      .await
      .unwrap();
    let _watch = enabled.subscribe(&key, |_, _| {});
    enabled.focus_changed(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_set_arc_returns_the_same_object() {
    let cache = QueryCache::new(options());
    let key = list_key(1);
    let page: AnyData = Arc::new(PaginatedResponse::<Post> {
      data: Vec::new(),
      total_count: 0,
      page: 1,
      limit: 10,
    });

    cache.set_arc(&key, Arc::clone(&page));
    assert!(Arc::ptr_eq(&cache.get_raw(&key).unwrap(), &page));
  }

  #[tokio::test]
  async fn test_refetch_without_cancel_joins_running_request() {
    let cache = QueryCache::new(options());
    let counter = Arc::new(AtomicU32::new(0));
    let key = list_key(1);
    let _watch = cache.subscribe(&key, |_, _| {});

    cache.ensure_fetch(&key, Fetcher::new(counting_fetcher(&counter, Duration::from_millis(40))));
    assert!(cache.state(&key).unwrap().is_fetching);
    assert_eq!(cache.refetch_with(&key, false), 1);
    assert_eq!(cache.refetch_with(&key, false), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get::<u32>(&key).as_deref(), Some(&1));
  }
}
