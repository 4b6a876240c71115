use crate::api::error::RemoteError;
use crate::api::types::{
  Comment, ListPostsParams, NewPost, PaginatedResponse, Post, PostUpdate, User,
};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

/// Public demo backend used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

/// Header carrying the unpaginated row count
const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Blog REST API client
#[derive(Clone, Debug)]
pub struct BlogClient {
  client: reqwest::Client,
  base: Url,
}

impl BlogClient {
  pub fn new(base_url: &str) -> Result<Self, RemoteError> {
    let mut base = Url::parse(base_url)?;
    // Url::join replaces the last segment unless the path ends in '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let client = reqwest::Client::builder()
      .user_agent(concat!("postdeck/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self { client, base })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  fn url(&self, path: &str) -> Result<Url, RemoteError> {
    Ok(self.base.join(path)?)
  }

  async fn send(
    &self,
    method: Method,
    url: Url,
    body: Option<&(impl Serialize + ?Sized)>,
  ) -> Result<Response, RemoteError> {
    tracing::debug!(%method, %url, "request");
    let mut req = self.client.request(method, url);
    if let Some(body) = body {
      req = req.json(body);
    }

    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
      let text = resp.text().await.unwrap_or_default();
      let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
      } else {
        text
      };
      return Err(RemoteError::status(status.as_u16(), message));
    }
    Ok(resp)
  }

  async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes)
      .map_err(|e| RemoteError::transport(format!("failed to parse response: {}", e)))
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
    let resp = self
      .send(Method::GET, self.url(path)?, None::<&()>)
      .await?;
    Self::decode(resp).await
  }

  /// List one page of posts.
  ///
  /// Only `_page`, `_limit` and `userId` go to the server. The search term
  /// is applied to the returned rows, so `total_count` still reflects the
  /// unsearched match count.
  pub async fn list_posts(
    &self,
    params: &ListPostsParams,
  ) -> Result<PaginatedResponse<Post>, RemoteError> {
    let mut url = self.url("posts")?;
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("_page", &params.page.to_string());
      query.append_pair("_limit", &params.limit.to_string());
      if let Some(user_id) = params.user_id {
        query.append_pair("userId", &user_id.to_string());
      }
    }

    let resp = self.send(Method::GET, url, None::<&()>).await?;
    let total_count = resp
      .headers()
      .get(TOTAL_COUNT_HEADER)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.trim().parse::<u64>().ok())
      .unwrap_or(0);

    let mut posts: Vec<Post> = Self::decode(resp).await?;
    if !params.search.is_empty() {
      posts.retain(|post| post.matches(&params.search));
    }

    Ok(PaginatedResponse {
      data: posts,
      total_count,
      page: params.page,
      limit: params.limit,
    })
  }

  pub async fn get_post(&self, id: u64) -> Result<Post, RemoteError> {
    self.get(&format!("posts/{}", id)).await
  }

  pub async fn create_post(&self, post: &NewPost) -> Result<Post, RemoteError> {
    let resp = self
      .send(Method::POST, self.url("posts")?, Some(post))
      .await?;
    Self::decode(resp).await
  }

  pub async fn update_post(&self, id: u64, update: &PostUpdate) -> Result<Post, RemoteError> {
    let resp = self
      .send(Method::PUT, self.url(&format!("posts/{}", id))?, Some(update))
      .await?;
    Self::decode(resp).await
  }

  /// Delete a post, returning the id that was deleted
  pub async fn delete_post(&self, id: u64) -> Result<u64, RemoteError> {
    self
      .send(Method::DELETE, self.url(&format!("posts/{}", id))?, None::<&()>)
      .await?;
    Ok(id)
  }

  pub async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
    self.get("users").await
  }

  pub async fn get_user(&self, id: u64) -> Result<User, RemoteError> {
    self.get(&format!("users/{}", id)).await
  }

  pub async fn list_comments(&self, post_id: u64) -> Result<Vec<Comment>, RemoteError> {
    self.get(&format!("posts/{}/comments", post_id)).await
  }
}
