use ratatui::prelude::*;

/// Truncate a string to at most `max_len` characters, ending in "..." if
/// anything was cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// One slot of the pagination strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageItem {
  Page(u32),
  Ellipsis,
}

/// Pages to offer around `current`: always the first and last, plus the
/// neighbours of the current page, with gaps shown as ellipses. Empty when
/// there is at most one page.
pub fn page_numbers(current: u32, total: u32) -> Vec<PageItem> {
  if total <= 1 {
    return Vec::new();
  }

  let mut items = vec![PageItem::Page(1)];
  let start = current.saturating_sub(1).max(2);
  let end = current.saturating_add(1).min(total - 1);

  if start > 2 {
    items.push(PageItem::Ellipsis);
  }
  items.extend((start..=end).map(PageItem::Page));
  if end < total - 1 {
    items.push(PageItem::Ellipsis);
  }
  items.push(PageItem::Page(total));
  items
}

/// Small marker for background activity on a query
pub fn fetch_indicator(is_fetching: bool, is_stale: bool) -> Span<'static> {
  if is_fetching {
    Span::styled(" ⟳ fetching ", Style::default().fg(Color::Yellow))
  } else if is_stale {
    Span::styled(" stale ", Style::default().fg(Color::DarkGray))
  } else {
    Span::styled(" fresh ", Style::default().fg(Color::Green))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use PageItem::{Ellipsis, Page};

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
    assert_eq!(truncate("ééééé", 4), "é...");
  }

  #[test]
  fn test_single_page_has_no_strip() {
    assert!(page_numbers(1, 0).is_empty());
    assert!(page_numbers(1, 1).is_empty());
  }

  #[test]
  fn test_small_page_counts_have_no_gaps() {
    assert_eq!(page_numbers(1, 2), vec![Page(1), Page(2)]);
    assert_eq!(page_numbers(2, 3), vec![Page(1), Page(2), Page(3)]);
  }

  #[test]
  fn test_ellipses_around_current_page() {
    assert_eq!(
      page_numbers(1, 10),
      vec![Page(1), Page(2), Ellipsis, Page(10)]
    );
    assert_eq!(
      page_numbers(5, 10),
      vec![Page(1), Ellipsis, Page(4), Page(5), Page(6), Ellipsis, Page(10)]
    );
    assert_eq!(
      page_numbers(10, 10),
      vec![Page(1), Ellipsis, Page(9), Page(10)]
    );
  }
}
