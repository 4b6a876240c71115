use std::future::Future;
use std::sync::Arc;

use crate::api::{BlogClient, NewPost, PaginatedResponse, Post, PostUpdate, RemoteError};
use crate::query::keys::posts;
use crate::query::{AnyData, EntrySnapshot, InfiniteData, MutationOptions, QueryCache};

/// Post writes and the cache bookkeeping that goes with them
#[derive(Clone)]
pub struct PostMutations {
  client: BlogClient,
  cache: QueryCache,
  options: MutationOptions,
}

impl PostMutations {
  pub fn new(client: BlogClient, cache: QueryCache, options: MutationOptions) -> Self {
    Self {
      client,
      cache,
      options,
    }
  }

  /// Create a post. Every post list is refetched afterwards so the new row
  /// shows up wherever it belongs.
  pub async fn create(&self, post: NewPost) -> Result<Post, RemoteError> {
    let created = self
      .retrying("create_post", || self.client.create_post(&post))
      .await?;
    tracing::info!(id = created.id, "post created");
    self.invalidate_lists();
    Ok(created)
  }

  /// Update a post. There is no optimistic patch: the edited post and the
  /// lists are refetched once the server confirms.
  pub async fn update(&self, id: u64, update: PostUpdate) -> Result<Post, RemoteError> {
    let updated = self
      .retrying("update_post", || self.client.update_post(id, &update))
      .await?;
    tracing::info!(id, "post updated");
    self.cache.invalidate(&posts::detail(id));
    self.invalidate_lists();
    Ok(updated)
  }

  /// Delete a post, hiding it from every cached list straight away.
  ///
  /// If the server refuses, each list entry gets back the exact value it
  /// held before. On success the post's detail entry is dropped and the
  /// lists are refetched, which also corrects their totals.
  pub async fn delete(&self, id: u64) -> Result<u64, RemoteError> {
    let prefixes = posts::list_shaped();
    // A refetch landing now would bring the row back
    for prefix in &prefixes {
      self.cache.cancel(prefix);
    }

    let mut patched: Vec<EntrySnapshot> = Vec::new();
    for saved in prefixes.iter().flat_map(|prefix| self.cache.snapshot(prefix)) {
      if let Some(data) = without_post(saved.data(), id) {
        self.cache.set_arc(saved.key(), data);
        patched.push(saved);
      }
    }
    tracing::debug!(id, entries = patched.len(), "optimistic delete applied");

    match self
      .retrying("delete_post", || self.client.delete_post(id))
      .await
    {
      Ok(deleted) => {
        tracing::info!(id, "post deleted");
        self.cache.remove(&posts::detail(id));
        self.invalidate_lists();
        Ok(deleted)
      }
      Err(err) => {
        for saved in patched {
          self.cache.restore(saved);
        }
        tracing::warn!(id, "delete failed, lists rolled back");
        Err(err)
      }
    }
  }

  fn invalidate_lists(&self) {
    for prefix in posts::list_shaped() {
      self.cache.invalidate(&prefix);
    }
  }

  async fn retrying<T, F, Fut>(&self, name: &'static str, op: F) -> Result<T, RemoteError>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
  {
    let mut attempt = 0;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if attempt < self.options.retry => {
          let delay = self.options.retry_backoff(attempt);
          tracing::warn!(mutation = name, attempt, ?delay, %err, "mutation failed, retrying");
          attempt += 1;
          tokio::time::sleep(delay).await;
        }
        Err(err) => {
          self.cache.observer().on_mutation_error(name, &err);
          return Err(err);
        }
      }
    }
  }
}

/// Copy of a cached post list without post `id`, or None if `data` is not a
/// post list or does not contain it.
pub fn without_post(data: &AnyData, id: u64) -> Option<AnyData> {
  if let Some(page) = data.downcast_ref::<PaginatedResponse<Post>>() {
    let patched = strip_page(page, id)?;
    return Some(Arc::new(patched));
  }

  let infinite = data.downcast_ref::<InfiniteData<Post>>()?;
  if !infinite.items().any(|post| post.id == id) {
    return None;
  }
  let patched = InfiniteData {
    pages: infinite
      .pages
      .iter()
      .map(|page| strip_page(page, id).unwrap_or_else(|| page.clone()))
      .collect(),
    page_params: infinite.page_params.clone(),
  };
  Some(Arc::new(patched))
}

fn strip_page(page: &PaginatedResponse<Post>, id: u64) -> Option<PaginatedResponse<Post>> {
  if !page.data.iter().any(|post| post.id == id) {
    return None;
  }
  // total_count stays as the server reported it
  Some(PaginatedResponse {
    data: page.data.iter().filter(|post| post.id != id).cloned().collect(),
    total_count: page.total_count,
    page: page.page,
    limit: page.limit,
  })
}
