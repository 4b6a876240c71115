use crate::api::{ListPostsParams, PaginatedResponse, Post, User};
use crate::app::AppContext;
use crate::config::PAGE_SIZES;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::ui::components::{Confirm, KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{fetch_indicator, page_numbers, truncate, PageItem};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{PostDetailView, PostFormView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::sync::Arc;
use std::time::Duration;

/// Polling period while auto-refresh is on
pub const AUTO_REFRESH: Duration = Duration::from_secs(1);

/// Page size after `current` in the cycle; unknown sizes restart it
pub fn next_page_size(current: u32) -> u32 {
  match PAGE_SIZES.iter().position(|size| *size == current) {
    Some(idx) => PAGE_SIZES[(idx + 1) % PAGE_SIZES.len()],
    None => PAGE_SIZES[0],
  }
}

/// Author filter after `current`: all authors, then each user in turn
pub fn next_author(current: Option<u64>, users: &[User]) -> Option<u64> {
  match current {
    None => users.first().map(|user| user.id),
    Some(id) => users
      .iter()
      .position(|user| user.id == id)
      .and_then(|idx| users.get(idx + 1))
      .map(|user| user.id),
  }
}

/// Name of user `id`, if the users list has it
pub fn author_name(users: Option<&[User]>, id: u64) -> Option<String> {
  users?
    .iter()
    .find(|user| user.id == id)
    .map(|user| user.name.clone())
}

/// Paginated post list, the root view
pub struct PostListView {
  ctx: AppContext,
  params: ListPostsParams,
  query: Query<PaginatedResponse<Post>>,
  /// Last page that loaded, kept on screen while another one loads
  shown: Option<Arc<PaginatedResponse<Post>>>,
  users: Query<Vec<User>>,
  list_state: ListState,
  search: SearchInput,
  confirm: Confirm<u64>,
  delete: Mutation<u64>,
  auto_refresh: bool,
}

impl PostListView {
  pub fn new(ctx: AppContext) -> Self {
    let params = ListPostsParams::new(1, ctx.page_size);
    let mut query = ctx.posts_page(&params);
    query.fetch();
    let mut users = ctx.users();
    users.fetch();

    Self {
      ctx,
      params,
      shown: query.data(),
      query,
      users,
      list_state: ListState::default(),
      search: SearchInput::new(),
      confirm: Confirm::new(),
      delete: Mutation::new(),
      auto_refresh: false,
    }
  }

  /// Showing the previous page while the current one loads
  pub fn is_placeholder(&self) -> bool {
    self.query.data().is_none() && self.shown.is_some()
  }

  fn posts(&self) -> &[Post] {
    self.shown.as_deref().map(|page| page.data.as_slice()).unwrap_or(&[])
  }

  fn total_pages(&self) -> u32 {
    self.shown.as_deref().map_or(1, |page| page.total_pages().max(1))
  }

  fn selected_post(&self) -> Option<&Post> {
    self.list_state.selected().and_then(|idx| self.posts().get(idx))
  }

  /// Switch to `params`, dropping the request for the old ones
  fn set_params(&mut self, params: ListPostsParams) {
    if params == self.params {
      return;
    }
    self.ctx.cache.cancel(self.query.key());
    self.params = params;

    let mut query = self.ctx.posts_page(&self.params);
    if self.auto_refresh {
      query.set_refetch_interval(Some(AUTO_REFRESH));
    }
    query.fetch();
    if let Some(data) = query.data() {
      self.shown = Some(data);
    }
    self.query = query;
    self.list_state.select(Some(0));
  }

  fn go_to_page(&mut self, page: u32) {
    let page = page.clamp(1, self.total_pages());
    self.set_params(ListPostsParams {
      page,
      ..self.params.clone()
    });
  }

  fn toggle_auto_refresh(&mut self) -> ViewAction {
    self.auto_refresh = !self.auto_refresh;
    let interval = if self.auto_refresh {
      Some(AUTO_REFRESH)
    } else {
      self.ctx.cache.options().refetch_interval
    };
    self.query.set_refetch_interval(interval);
    let state = if self.auto_refresh { "on" } else { "off" };
    ViewAction::Notify(format!("Auto-refresh {}", state))
  }

  fn users_slice(&self) -> Option<Arc<Vec<User>>> {
    self.users.data()
  }

  fn render_filters(&self, frame: &mut Frame, area: Rect) {
    let users = self.users_slice();
    let author = match self.params.user_id {
      Some(id) => author_name(users.as_deref().map(Vec::as_slice), id)
        .unwrap_or_else(|| format!("user {}", id)),
      None => "all".to_string(),
    };

    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default().fg(Color::White);
    let mut spans = vec![
      Span::styled(" page ", label),
      Span::styled(format!("{}/{}", self.params.page, self.total_pages()), value),
      Span::styled("  size ", label),
      Span::styled(self.params.limit.to_string(), value),
      Span::styled("  author ", label),
      Span::styled(author, value),
    ];
    if !self.params.search.is_empty() {
      spans.push(Span::styled("  search ", label));
      spans.push(Span::styled(
        format!("\"{}\"", self.params.search),
        Style::default().fg(Color::Cyan),
      ));
    }
    if self.auto_refresh {
      spans.push(Span::styled("  auto-refresh", Style::default().fg(Color::Magenta)));
    }
    if self.delete.is_pending() {
      spans.push(Span::styled("  deleting...", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::raw(" "));
    spans.push(fetch_indicator(self.query.is_fetching(), self.query.is_stale()));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.posts().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = if self.query.is_loading() && self.shown.is_none() {
      " Posts (loading...) ".to_string()
    } else if let Some(err) = self.query.error() {
      format!(" Posts (error: {}) ", err)
    } else {
      let total = self.shown.as_deref().map_or(0, |page| page.total_count);
      format!(" Posts ({}) ", total)
    };

    let border = if self.is_placeholder() {
      Color::DarkGray
    } else {
      Color::Blue
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(border));

    if self.posts().is_empty() {
      let content = if self.query.is_loading() {
        "Loading posts..."
      } else if self.query.is_error() {
        "Failed to load posts. Press 'r' to retry."
      } else {
        "No posts found."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let users = self.users_slice();
    let users = users.as_deref().map(Vec::as_slice);
    let items: Vec<ListItem> = self
      .posts()
      .iter()
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

  fn render_pager(&self, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for item in page_numbers(self.params.page, self.total_pages()) {
      match item {
        PageItem::Page(page) if page == self.params.page => spans.push(Span::styled(
          format!("[{}]", page),
          Style::default().fg(Color::Black).bg(Color::Cyan),
        )),
        PageItem::Page(page) => {
          spans.push(Span::styled(format!(" {} ", page), Style::default().fg(Color::Cyan)))
        }
        PageItem::Ellipsis => spans.push(Span::styled(" … ", Style::default().fg(Color::DarkGray))),
      }
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
  }
}

impl View for PostListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.confirm.handle_key(key) {
      KeyResult::Event(id) => {
        let mutations = self.ctx.mutations.clone();
        self.delete.run(async move { mutations.delete(id).await });
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match self.search.handle_key(key) {
      KeyResult::Event(event) => {
        let term = match event {
          SearchEvent::Submitted(term) => term,
          SearchEvent::Cleared => String::new(),
        };
        let params = ListPostsParams::new(1, self.params.limit)
          .with_search(term)
          .with_user(self.params.user_id);
        self.set_params(params);
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('l') | KeyCode::Right => self.go_to_page(self.params.page + 1),
      KeyCode::Char('h') | KeyCode::Left => self.go_to_page(self.params.page.saturating_sub(1)),
      KeyCode::Char('g') => self.go_to_page(1),
      KeyCode::Char('G') => self.go_to_page(self.total_pages()),
      KeyCode::Char('s') => {
        let limit = next_page_size(self.params.limit);
        self.set_params(ListPostsParams {
          page: 1,
          limit,
          ..self.params.clone()
        });
      }
      KeyCode::Char('u') => {
        let users = self.users_slice();
        let users = users.as_deref().map(Vec::as_slice).unwrap_or(&[]);
        let next = next_author(self.params.user_id, users);
        self.set_params(ListPostsParams {
          page: 1,
          ..self.params.clone().with_user(next)
        });
      }
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('a') => return self.toggle_auto_refresh(),
      KeyCode::Char('x') => {
        let count = self.ctx.cache.clear();
        return ViewAction::Notify(format!("Cleared {} cached queries", count));
      }
      KeyCode::Char('c') => {
        return ViewAction::Push(Box::new(PostFormView::create(self.ctx.clone())));
      }
      KeyCode::Char('e') => {
        if let Some(post) = self.selected_post() {
          return ViewAction::Push(Box::new(PostFormView::edit(self.ctx.clone(), post)));
        }
      }
      KeyCode::Char('d') => {
        if self.delete.is_pending() {
          return ViewAction::Notify("A delete is already running".to_string());
        }
        if let Some((id, question)) = self
          .selected_post()
          .map(|post| (post.id, format!("Delete \"{}\"?", post.short_title())))
        {
          self.confirm.ask(id, question);
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
      .constraints([
        Constraint::Length(1), // Filters
        Constraint::Min(1),    // Posts
        Constraint::Length(1), // Page strip
      ])
      .split(area);

    self.render_filters(frame, chunks[0]);
    self.render_list(frame, chunks[1]);
    self.render_pager(frame, chunks[2]);

    self.search.render_overlay(frame, area);
    self.confirm.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("Posts p{}", self.params.page)
  }

  fn tick(&mut self) -> ViewAction {
    self.users.poll();
    if self.query.poll() {
      if let Some(data) = self.query.data() {
        self.shown = Some(data);
      }
    }
    if self.delete.poll() {
      // Failures reach the status line through the error observer
      if let Some(id) = self.delete.state().data() {
        let message = format!("Post {} deleted", id);
        self.delete.reset();
        return ViewAction::Notify(message);
      }
    }
    ViewAction::None
  }

  fn is_editing(&self) -> bool {
    self.search.is_active() || self.confirm.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("h/l", "page").with_priority(30),
      ShortcutInfo::new("s", "size").with_priority(40),
      ShortcutInfo::new("u", "author").with_priority(40),
      ShortcutInfo::new("c", "new").with_priority(50),
      ShortcutInfo::new("e", "edit").with_priority(50),
      ShortcutInfo::new("d", "delete").with_priority(50),
      ShortcutInfo::new("a", "auto").with_priority(60),
      ShortcutInfo::new("r", "refresh").with_priority(60),
    ]
  }
}
