use crate::api::{ListPostsParams, Post, User};
use crate::app::AppContext;
use crate::query::{InfiniteData, InfiniteQuery, Query};
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{fetch_indicator, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::post_list::{author_name, next_author, next_page_size};
use crate::ui::views::{PostDetailView, PostFormView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::sync::Arc;

/// Rows from the end of the list at which the next page is requested
const LOAD_AHEAD: usize = 2;

/// Post list that grows as the selection nears its end
pub struct InfinitePostsView {
  ctx: AppContext,
  params: ListPostsParams,
  query: InfiniteQuery<Post>,
  users: Query<Vec<User>>,
  list_state: ListState,
  search: SearchInput,
}

impl InfinitePostsView {
  pub fn new(ctx: AppContext) -> Self {
    let params = ListPostsParams::new(1, ctx.page_size);
    let mut query = ctx.infinite_posts(&params);
    query.fetch();
    let mut users = ctx.users();
    users.fetch();

    Self {
      ctx,
      params,
      query,
      users,
      list_state: ListState::default(),
      search: SearchInput::new(),
    }
  }

  fn data(&self) -> Option<Arc<InfiniteData<Post>>> {
    self.query.data()
  }

  fn row_count(&self) -> usize {
    self.data().map_or(0, |data| data.items().count())
  }

  fn selected_post(&self) -> Option<Post> {
    let idx = self.list_state.selected()?;
    self.data()?.items().nth(idx).cloned()
  }

  fn set_params(&mut self, params: ListPostsParams) {
    if params == self.params {
      return;
    }
    self.ctx.cache.cancel(self.query.key());
    self.params = params;
    self.query = self.ctx.infinite_posts(&self.params);
    self.query.fetch();
    self.list_state.select(Some(0));
  }

  /// Ask for the next page once the selection is close to the last row
  fn load_more_if_needed(&mut self) {
    let Some(selected) = self.list_state.selected() else {
      return;
    };
    if selected + LOAD_AHEAD >= self.row_count() && self.query.has_next_page() {
      self.query.fetch_next_page();
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let data = self.data();
    let len = data.as_ref().map_or(0, |data| data.items().count());
    ensure_valid_selection(&mut self.list_state, len);

    let title = if self.query.is_loading() {
      " Posts (loading...) ".to_string()
    } else if let Some(err) = self.query.error() {
      format!(" Posts (error: {}) ", err)
    } else {
      let total = data.as_ref().map_or(0, |data| data.total_count());
      format!(" Posts ({} of {}) ", len, total)
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let Some(data) = data.filter(|_| len > 0) else {
      let content = if self.query.is_loading() {
        "Loading posts..."
      } else if self.query.error().is_some() {
        "Failed to load posts. Press 'r' to retry."
      } else {
        "No posts found."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    };

    let users = self.users.data();
    let users = users.as_deref().map(Vec::as_slice);
    let mut items: Vec<ListItem> = data
      .items()
      .map(|post| {
        let author =
          author_name(users, post.user_id).unwrap_or_else(|| format!("user {}", post.user_id));
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:>4}", post.id), Style::default().fg(Color::Cyan)),
          Span::raw("  "),
          Span::raw(format!("{:<34}", post.short_title())),
          Span::styled(truncate(&author, 24), Style::default().fg(Color::DarkGray)),
        ]))
      })
      .collect();

    let tail = if self.query.is_fetching_next_page() {
      Some("   loading more...")
    } else if !self.query.has_next_page() {
      Some("   nothing more to load")
    } else {
      None
    };
    if let Some(tail) = tail {
      items.push(ListItem::new(Span::styled(tail, Style::default().fg(Color::DarkGray))));
    }

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for InfinitePostsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(event) => {
        let term = match event {
          SearchEvent::Submitted(term) => term,
          SearchEvent::Cleared => String::new(),
        };
        let params = self.params.clone().with_search(term);
        self.set_params(params);
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        let last = self.row_count().saturating_sub(1);
        let next = self.list_state.selected().map_or(0, |idx| (idx + 1).min(last));
        self.list_state.select(Some(next));
        self.load_more_if_needed();
      }
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('G') => {
        self.list_state.select(Some(self.row_count().saturating_sub(1)));
        self.load_more_if_needed();
      }
      KeyCode::Char('g') => self.list_state.select(Some(0)),
      KeyCode::Char('s') => {
        let params = ListPostsParams {
          limit: next_page_size(self.params.limit),
          ..self.params.clone()
        };
        self.set_params(params);
      }
      KeyCode::Char('u') => {
        let users = self.users.data();
        let users = users.as_deref().map(Vec::as_slice).unwrap_or(&[]);
        let next = next_author(self.params.user_id, users);
        let params = self.params.clone().with_user(next);
        self.set_params(params);
      }
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('c') => {
        return ViewAction::Push(Box::new(PostFormView::create(self.ctx.clone())));
      }
      KeyCode::Char('e') => {
        if let Some(post) = self.selected_post() {
          return ViewAction::Push(Box::new(PostFormView::edit(self.ctx.clone(), &post)));
        }
      }
      KeyCode::Enter => {
        if let Some(post) = self.selected_post() {
          return ViewAction::Push(Box::new(PostDetailView::new(self.ctx.clone(), post.id)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(1), Constraint::Min(1)])
      .split(area);

    let label = Style::default().fg(Color::DarkGray);
    let mut spans = vec![
      Span::styled(" size ", label),
      Span::raw(self.params.limit.to_string()),
      Span::styled("  author ", label),
      Span::raw(
        self
          .params
          .user_id
          .map_or_else(|| "all".to_string(), |id| format!("user {}", id)),
      ),
    ];
    if !self.params.search.is_empty() {
      spans.push(Span::styled("  search ", label));
      spans.push(Span::styled(
        format!("\"{}\"", self.params.search),
        Style::default().fg(Color::Cyan),
      ));
    }
    spans.push(Span::raw(" "));
    spans.push(fetch_indicator(self.query.is_fetching(), false));
    frame.render_widget(Paragraph::new(Line::from(spans)), chunks[0]);

    self.render_list(frame, chunks[1]);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Posts (scroll)".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.users.poll();
    if self.query.poll() {
      // A short first page may already end at the selection
      self.load_more_if_needed();
    }
    ViewAction::None
  }

  fn is_editing(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("s", "size").with_priority(40),
      ShortcutInfo::new("u", "author").with_priority(40),
      ShortcutInfo::new("c", "new").with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(60),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;
  use httpmock::MockServer;
  use serde_json::json;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn posts_json(ids: std::ops::RangeInclusive<u64>) -> serde_json::Value {
    ids
      .map(|id| json!({"id": id, "title": format!("post {}", id), "body": "b", "userId": 1}))
      .collect()
  }

  #[tokio::test]
  async fn test_scrolling_to_the_end_loads_next_page() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/posts").query_param("_page", "1");
        then
          .status(200)
          .header("x-total-count", "15")
          .json_body(posts_json(1..=10));
      })
      .await;
    let second = server
      .mock_async(|when, then| {
        when.method("GET").path("/posts").query_param("_page", "2");
        then
          .status(200)
          .header("x-total-count", "15")
          .json_body(posts_json(11..=15));
      })
      .await;

    let mut view = InfinitePostsView::new(AppContext::for_tests(&server.base_url()));
    tokio::time::sleep(Duration::from_millis(80)).await;
    view.tick();
    assert_eq!(view.row_count(), 10);
    second.assert_hits_async(0).await;

    view.handle_key(key(KeyCode::Char('G')));
    tokio::time::sleep(Duration::from_millis(80)).await;
    view.tick();
    second.assert_hits_async(1).await;
    assert_eq!(view.row_count(), 15);
    assert!(!view.query.has_next_page());
  }
}
