//! Page-by-page lists stored under a single cache key.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{PaginatedResponse, RemoteError};

use super::cache::QueryCache;
use super::handle::Query;
use super::keys::QueryKey;

type PageLoader<T> =
  Arc<dyn Fn(u32) -> BoxFuture<'static, Result<PaginatedResponse<T>, RemoteError>> + Send + Sync>;

/// The page after `last`, or None once every row has been loaded
pub fn next_page_param<T>(last: &PaginatedResponse<T>) -> Option<u32> {
  let seen = u64::from(last.page) * u64::from(last.limit);
  (seen < last.total_count).then(|| last.page + 1)
}

/// Value stored under an infinite key: loaded pages in order, each with the
/// page number that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfiniteData<T> {
  pub pages: Vec<PaginatedResponse<T>>,
  pub page_params: Vec<u32>,
}

impl<T> InfiniteData<T> {
  pub fn items(&self) -> impl Iterator<Item = &T> {
    self.pages.iter().flat_map(|page| page.data.iter())
  }

  pub fn next_page_param(&self) -> Option<u32> {
    self.pages.last().and_then(next_page_param)
  }

  pub fn total_count(&self) -> u64 {
    self.pages.last().map_or(0, |page| page.total_count)
  }

  fn push(&mut self, param: u32, page: PaginatedResponse<T>) {
    self.page_params.push(param);
    self.pages.push(page);
  }
}

impl<T: Clone> InfiniteData<T> {
  fn with_page(&self, param: u32, page: PaginatedResponse<T>) -> Self {
    let mut next = self.clone();
    next.push(param, page);
    next
  }
}

impl<T> Default for InfiniteData<T> {
  fn default() -> Self {
    Self {
      pages: Vec::new(),
      page_params: Vec::new(),
    }
  }
}

/// Handle for an infinite list. Page 1 goes through the cache like any
/// query; later pages are appended to the cached value.
pub struct InfiniteQuery<T> {
  query: Query<InfiniteData<T>>,
  cache: QueryCache,
  loader: PageLoader<T>,
  loaded: Arc<AtomicU32>,
  next_page: Option<JoinHandle<()>>,
  errors_tx: mpsc::UnboundedSender<RemoteError>,
  errors_rx: mpsc::UnboundedReceiver<RemoteError>,
  next_page_error: Option<RemoteError>,
}

impl<T: Clone + Send + Sync + 'static> InfiniteQuery<T> {
  pub fn new<F, Fut>(cache: &QueryCache, key: QueryKey, load: F) -> Self
  where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PaginatedResponse<T>, RemoteError>> + Send + 'static,
  {
    let loader: PageLoader<T> = Arc::new(move |page| load(page).boxed());
    let loaded = Arc::new(AtomicU32::new(0));

    // A refetch reloads as many pages as are currently shown
    let reload = {
      let loader = Arc::clone(&loader);
      let loaded = Arc::clone(&loaded);
      move || {
        let loader = Arc::clone(&loader);
        let loaded = Arc::clone(&loaded);
        let wanted = loaded.load(Ordering::SeqCst).max(1) as usize;
        async move {
          let mut data = InfiniteData::default();
          let mut param = 1;
          loop {
            let page = loader(param).await?;
            let next = next_page_param(&page);
            data.push(param, page);
            match next {
              Some(next) if data.pages.len() < wanted => param = next,
              _ => break,
            }
          }
          loaded.store(data.pages.len() as u32, Ordering::SeqCst);
          Ok(data)
        }
      }
    };

    let (errors_tx, errors_rx) = mpsc::unbounded_channel();
    Self {
      query: Query::new(cache, key, reload),
      cache: cache.clone(),
      loader,
      loaded,
      next_page: None,
      errors_tx,
      errors_rx,
      next_page_error: None,
    }
  }

  pub fn key(&self) -> &QueryKey {
    self.query.key()
  }

  pub fn fetch(&mut self) {
    self.query.fetch();
  }

  pub fn refetch(&mut self) {
    self.query.refetch();
  }

  /// Load the page after the last one, unless one is already on its way
  pub fn fetch_next_page(&mut self) {
    if self.is_fetching_next_page() || self.query.is_fetching() {
      return;
    }
    let Some(next) = self.next_page_param() else {
      return;
    };

    self.next_page_error = None;
    let cache = self.cache.clone();
    let key = self.query.key().clone();
    let loader = Arc::clone(&self.loader);
    let loaded = Arc::clone(&self.loaded);
    let errors = self.errors_tx.clone();
    self.next_page = Some(tokio::spawn(async move {
      match cache.run_fetch(&key, || loader(next)).await {
        Ok(page) => {
          let appended = cache.update::<InfiniteData<T>, _>(&key, |data| {
            // A refetch may have replaced the pages meanwhile
            (data.next_page_param() == Some(next)).then(|| data.with_page(next, page))
          });
          if appended {
            if let Some(data) = cache.get::<InfiniteData<T>>(&key) {
              loaded.store(data.pages.len() as u32, Ordering::SeqCst);
            }
            tracing::debug!(%key, page = next, "page appended");
          } else {
            tracing::debug!(%key, page = next, "dropping page for replaced list");
          }
        }
        Err(err) => {
          let _ = errors.send(err);
        }
      }
    }));
  }

  /// Returns true if anything changed since the last poll
  pub fn poll(&mut self) -> bool {
    let mut changed = self.query.poll();
    while let Ok(err) = self.errors_rx.try_recv() {
      self.next_page_error = Some(err);
      changed = true;
    }
    if self.next_page.as_ref().is_some_and(JoinHandle::is_finished) {
      self.next_page = None;
      changed = true;
    }
    changed
  }

  pub fn data(&self) -> Option<Arc<InfiniteData<T>>> {
    self.query.data()
  }

  pub fn next_page_param(&self) -> Option<u32> {
    self.query.data().and_then(|data| data.next_page_param())
  }

  pub fn has_next_page(&self) -> bool {
    self.next_page_param().is_some()
  }

  pub fn is_fetching_next_page(&self) -> bool {
    self.next_page.as_ref().is_some_and(|task| !task.is_finished())
  }

  pub fn is_loading(&self) -> bool {
    self.query.is_loading()
  }

  pub fn is_fetching(&self) -> bool {
    self.query.is_fetching() || self.is_fetching_next_page()
  }

  /// Error of the whole list, else of the last next-page load
  pub fn error(&self) -> Option<&RemoteError> {
    self.query.error().or(self.next_page_error.as_ref())
  }
}

impl<T> Drop for InfiniteQuery<T> {
  fn drop(&mut self) {
    if let Some(task) = self.next_page.take() {
      task.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{ListPostsParams, Post};
  use crate::query::keys::{posts, ListFilters};
  use crate::query::QueryOptions;
  use std::time::Duration;

  fn page(page: u32, limit: u32, total: u64) -> PaginatedResponse<u64> {
    let first = u64::from((page - 1) * limit) + 1;
    let last = (first + u64::from(limit) - 1).min(total);
    PaginatedResponse {
      data: (first..=last).collect(),
      total_count: total,
      page,
      limit,
    }
  }

  fn key() -> QueryKey {
    posts::infinite(&ListFilters::pageless(&ListPostsParams::new(1, 10)))
  }

  fn cache() -> QueryCache {
    QueryCache::new(QueryOptions {
      retry: 0,
      ..QueryOptions::default()
    })
  }

  fn counting_loader(
    calls: &Arc<AtomicU32>,
  ) -> impl Fn(u32) -> BoxFuture<'static, Result<PaginatedResponse<u64>, RemoteError>>
       + Send
       + Sync
       + 'static {
    let calls = Arc::clone(calls);
    move |n| {
      calls.fetch_add(1, Ordering::SeqCst);
      async move { Ok(page(n, 10, 25)) }.boxed()
    }
  }

  #[test]
  fn test_next_page_param() {
    let second = PaginatedResponse::<Post> {
      data: Vec::new(),
      total_count: 25,
      page: 2,
      limit: 10,
    };
    assert_eq!(next_page_param(&second), Some(3));

    let third = PaginatedResponse { page: 3, ..second };
    assert_eq!(next_page_param(&third), None);
  }

  #[test]
  fn test_next_page_param_on_exact_fit() {
    assert_eq!(next_page_param(&page(2, 10, 20)), None);
    assert_eq!(next_page_param(&page(1, 10, 0)), None);
  }

  #[tokio::test]
  async fn test_pages_append_until_exhausted() {
    let cache = cache();
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = InfiniteQuery::new(&cache, key(), counting_loader(&calls));

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.next_page_param(), Some(2));

    query.fetch_next_page();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    query.fetch_next_page();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    let data = query.data().unwrap();
    assert_eq!(data.page_params, vec![1, 2, 3]);
    assert_eq!(data.items().count(), 25);
    assert!(!query.has_next_page());

    // nothing left to load
    query.fetch_next_page();
    assert!(!query.is_fetching_next_page());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_refetch_reloads_every_loaded_page() {
    let cache = cache();
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = InfiniteQuery::new(&cache, key(), counting_loader(&calls));

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    query.fetch_next_page();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    query.refetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(query.data().unwrap().page_params, vec![1, 2]);
  }

  #[tokio::test]
  async fn test_next_page_error_keeps_loaded_pages() {
    let cache = cache();
    let mut query = InfiniteQuery::new(&cache, key(), |n| async move {
      if n == 1 {
        Ok(page(1, 10, 25))
      } else {
        Err(RemoteError::status(503, "unavailable"))
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    query.fetch_next_page();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert_eq!(query.error().and_then(RemoteError::http_status), Some(503));
    assert_eq!(query.data().unwrap().pages.len(), 1);
    assert!(query.has_next_page());
  }

  #[tokio::test]
  async fn test_next_page_waits_while_offline() {
    let cache = cache();
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = InfiniteQuery::new(&cache, key(), counting_loader(&calls));

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    cache.set_online(false);
    query.fetch_next_page();
    tokio::time::sleep(Duration::from_millis(30)).await;
    query.poll();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(query.data().unwrap().pages.len(), 1);
    assert!(query.is_fetching_next_page());

    cache.set_online(true);
    tokio::time::sleep(Duration::from_millis(30)).await;
    query.poll();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.data().unwrap().page_params, vec![1, 2]);
  }
}
