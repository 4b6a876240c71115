use serde::{Deserialize, Serialize};

/// Maximum number of characters kept by `Post::short_title`
const SHORT_TITLE_LEN: usize = 30;

/// A blog post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
  pub id: u64,
  pub title: String,
  pub body: String,
  pub user_id: u64,
}

impl Post {
  /// Title cut to 30 characters, with "..." appended when it was longer.
  /// Computed on read, never sent to the server.
  pub fn short_title(&self) -> String {
    if self.title.chars().count() > SHORT_TITLE_LEN {
      let head: String = self.title.chars().take(SHORT_TITLE_LEN).collect();
      format!("{}...", head)
    } else {
      self.title.clone()
    }
  }

  /// Case-insensitive match of `needle` against title or body
  pub fn matches(&self, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    self.title.to_lowercase().contains(&needle) || self.body.to_lowercase().contains(&needle)
  }
}

/// Payload for creating a post (the server assigns the id)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
  pub title: String,
  pub body: String,
  pub user_id: u64,
}

/// Partial post sent on update; absent fields are left out of the body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub body: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_id: Option<u64>,
}

impl From<NewPost> for PostUpdate {
  fn from(post: NewPost) -> Self {
    Self {
      title: Some(post.title),
      body: Some(post.body),
      user_id: Some(post.user_id),
    }
  }
}

/// A post author. Profile fields beyond the basics are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub email: String,
  #[serde(flatten)]
  pub profile: serde_json::Map<String, serde_json::Value>,
}

/// A comment on a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id: u64,
  pub post_id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub body: String,
}

/// One page of results.
///
/// `total_count` is whatever the server reported for the unpaginated match,
/// which only accounts for server-side filters. Client-side search narrows
/// `data` without touching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedResponse<T> {
  pub data: Vec<T>,
  pub total_count: u64,
  pub page: u32,
  pub limit: u32,
}

impl<T> PaginatedResponse<T> {
  /// Number of pages implied by `total_count`
  pub fn total_pages(&self) -> u32 {
    if self.limit == 0 {
      return 0;
    }
    self.total_count.div_ceil(self.limit as u64) as u32
  }
}

/// Arguments for listing posts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPostsParams {
  pub page: u32,
  pub limit: u32,
  /// Applied locally after the fetch; never sent to the server
  pub search: String,
  pub user_id: Option<u64>,
}

impl ListPostsParams {
  pub fn new(page: u32, limit: u32) -> Self {
    Self {
      page: page.max(1),
      limit: limit.max(1),
      search: String::new(),
      user_id: None,
    }
  }

  pub fn with_search(mut self, search: impl Into<String>) -> Self {
    self.search = search.into();
    self
  }

  /// Zero is not a valid user id and is treated as "no filter"
  pub fn with_user(mut self, user_id: Option<u64>) -> Self {
    self.user_id = user_id.filter(|id| *id > 0);
    self
  }
}

impl Default for ListPostsParams {
  fn default() -> Self {
    Self::new(1, 10)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn post(title: &str, body: &str) -> Post {
    Post {
      id: 1,
      title: title.to_string(),
      body: body.to_string(),
      user_id: 1,
    }
  }

  #[test]
  fn test_short_title_keeps_short_titles() {
    assert_eq!(post("Hello", "").short_title(), "Hello");
    let exact = "a".repeat(30);
    assert_eq!(post(&exact, "").short_title(), exact);
  }

  #[test]
  fn test_short_title_truncates_long_titles() {
    let long = "sunt aut facere repellat provident occaecati excepturi";
    let short = post(long, "").short_title();
    assert_eq!(short, "sunt aut facere repellat provi...");
  }

  #[test]
  fn test_matches_title_or_body_case_insensitive() {
    assert!(post("Lorem ipsum", "x").matches("lorem"));
    assert!(post("Other", "dolor LOREM").matches("Lorem"));
    assert!(!post("Other", "nothing").matches("lorem"));
  }

  #[test]
  fn test_post_serializes_camel_case() {
    let json = serde_json::to_value(NewPost {
      title: "T".into(),
      body: "B".into(),
      user_id: 1,
    })
    .unwrap();
    assert_eq!(json, serde_json::json!({"title": "T", "body": "B", "userId": 1}));
  }

  #[test]
  fn test_post_update_skips_missing_fields() {
    let json = serde_json::to_value(PostUpdate {
      title: Some("T".into()),
      ..Default::default()
    })
    .unwrap();
    assert_eq!(json, serde_json::json!({"title": "T"}));
  }

  #[test]
  fn test_user_keeps_profile_fields() {
    let user: User = serde_json::from_value(serde_json::json!({
      "id": 1,
      "name": "Leanne Graham",
      "username": "Bret",
      "email": "a@b.c",
      "phone": "1-770"
    }))
    .unwrap();
    assert_eq!(user.name, "Leanne Graham");
    assert_eq!(user.profile.get("phone"), Some(&serde_json::json!("1-770")));
  }

  #[test]
  fn test_total_pages() {
    let page = PaginatedResponse::<Post> {
      data: Vec::new(),
      total_count: 25,
      page: 1,
      limit: 10,
    };
    assert_eq!(page.total_pages(), 3);
  }

  #[test]
  fn test_params_clamp_and_zero_user() {
    let params = ListPostsParams::new(0, 0).with_user(Some(0));
    assert_eq!(params.page, 1);
    assert_eq!(params.limit, 1);
    assert_eq!(params.user_id, None);
  }
}
