//! Query key registry.
//!
//! Every cache interaction builds its key through these functions, so that
//! prefix operations (`invalidate(posts::lists())`, ...) reliably reach all
//! the entries they should. Keys are ordered tuples compared structurally:
//! `[entity, "list" | "detail" | "infinite", filters-or-id]`.

use std::fmt;

use crate::api::ListPostsParams;

/// One segment of a query key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
  Tag(&'static str),
  Id(u64),
  Filters(ListFilters),
}

/// Filter set identifying a list query
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ListFilters {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub search: Option<String>,
  pub user_id: Option<u64>,
}

impl ListFilters {
  /// Filters for a single page
  pub fn page(params: &ListPostsParams) -> Self {
    Self {
      page: Some(params.page),
      ..Self::pageless(params)
    }
  }

  /// Filters for an infinite list, where the page is the cursor, not identity
  pub fn pageless(params: &ListPostsParams) -> Self {
    Self {
      page: None,
      limit: Some(params.limit),
      search: Some(params.search.clone()),
      user_id: params.user_id,
    }
  }
}

/// Hierarchical cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
  fn root(entity: &'static str) -> Self {
    Self(vec![KeyPart::Tag(entity)])
  }

  fn child(&self, part: KeyPart) -> Self {
    let mut parts = self.0.clone();
    parts.push(part);
    Self(parts)
  }

  /// True when `prefix` is equal to, or an ancestor of, this key
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.starts_with(&prefix.0)
  }
}

impl fmt::Display for KeyPart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyPart::Tag(tag) => write!(f, "\"{}\"", tag),
      KeyPart::Id(id) => write!(f, "{}", id),
      KeyPart::Filters(filters) => {
        let mut fields = Vec::new();
        if let Some(page) = filters.page {
          fields.push(format!("page:{}", page));
        }
        if let Some(limit) = filters.limit {
          fields.push(format!("limit:{}", limit));
        }
        if let Some(search) = &filters.search {
          fields.push(format!("search:{:?}", search));
        }
        if let Some(user_id) = filters.user_id {
          fields.push(format!("userId:{}", user_id));
        }
        write!(f, "{{{}}}", fields.join(","))
      }
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
    write!(f, "[{}]", parts.join(","))
  }
}

pub mod posts {
  use super::{KeyPart, ListFilters, QueryKey};

  pub fn all() -> QueryKey {
    QueryKey::root("posts")
  }

  pub fn lists() -> QueryKey {
    all().child(KeyPart::Tag("list"))
  }

  pub fn list(filters: &ListFilters) -> QueryKey {
    lists().child(KeyPart::Filters(filters.clone()))
  }

  pub fn infinites() -> QueryKey {
    all().child(KeyPart::Tag("infinite"))
  }

  pub fn infinite(filters: &ListFilters) -> QueryKey {
    infinites().child(KeyPart::Filters(filters.clone()))
  }

  pub fn details() -> QueryKey {
    all().child(KeyPart::Tag("detail"))
  }

  pub fn detail(id: u64) -> QueryKey {
    details().child(KeyPart::Id(id))
  }

  /// Every prefix whose entries hold rows of posts
  pub fn list_shaped() -> [QueryKey; 2] {
    [lists(), infinites()]
  }
}

pub mod users {
  use super::{KeyPart, QueryKey};

  pub fn all() -> QueryKey {
    QueryKey::root("users")
  }

  pub fn lists() -> QueryKey {
    all().child(KeyPart::Tag("list"))
  }

  /// The user list takes no filters, so it shares the `lists` key
  pub fn list() -> QueryKey {
    lists()
  }

  pub fn details() -> QueryKey {
    all().child(KeyPart::Tag("detail"))
  }

  pub fn detail(id: u64) -> QueryKey {
    details().child(KeyPart::Id(id))
  }
}

pub mod comments {
  use super::{KeyPart, QueryKey};

  pub fn all() -> QueryKey {
    QueryKey::root("comments")
  }

  pub fn lists() -> QueryKey {
    all().child(KeyPart::Tag("list"))
  }

  pub fn list(post_id: u64) -> QueryKey {
    lists().child(KeyPart::Id(post_id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn filters(page: u32, limit: u32, search: &str, user_id: Option<u64>) -> ListFilters {
    ListFilters::page(
      &ListPostsParams::new(page, limit)
        .with_search(search)
        .with_user(user_id),
    )
  }

  #[test]
  fn test_equal_filters_give_equal_keys() {
    let a = posts::list(&filters(1, 10, "lorem", Some(2)));
    let b = posts::list(&filters(1, 10, "lorem", Some(2)));
    assert_eq!(a, b);
  }

  #[test]
  fn test_any_differing_field_gives_different_key() {
    let base = filters(1, 10, "lorem", Some(2));
    let variants = [
      filters(2, 10, "lorem", Some(2)),
      filters(1, 20, "lorem", Some(2)),
      filters(1, 10, "ipsum", Some(2)),
      filters(1, 10, "lorem", Some(3)),
      filters(1, 10, "lorem", None),
    ];
    for variant in variants {
      assert_ne!(posts::list(&base), posts::list(&variant));
    }
  }

  #[test]
  fn test_children_start_with_their_parents() {
    let list = posts::list(&filters(1, 10, "", None));
    assert!(list.starts_with(&posts::lists()));
    assert!(list.starts_with(&posts::all()));
    assert!(posts::detail(3).starts_with(&posts::details()));
    assert!(!posts::detail(3).starts_with(&posts::lists()));
    assert!(!users::detail(3).starts_with(&posts::all()));
    assert!(!posts::lists().starts_with(&list));
  }

  #[test]
  fn test_list_and_infinite_are_distinct_branches() {
    let params = ListPostsParams::new(1, 10);
    let infinite = posts::infinite(&ListFilters::pageless(&params));
    assert!(!infinite.starts_with(&posts::lists()));
    assert!(infinite.starts_with(&posts::infinites()));
  }

  #[test]
  fn test_display() {
    let key = posts::list(&filters(1, 10, "", Some(2)));
    assert_eq!(
      key.to_string(),
      r#"["posts","list",{page:1,limit:10,search:"",userId:2}]"#
    );
    assert_eq!(comments::list(4).to_string(), r#"["comments","list",4]"#);
  }
}
