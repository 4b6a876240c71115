use crate::api::{Comment, Post, User};
use crate::app::AppContext;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::ui::components::{Confirm, KeyResult};
use crate::ui::renderfns::fetch_indicator;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::PostFormView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// One post with its author and comments.
///
/// The author and comments depend on the post: neither is requested until
/// the post itself has loaded.
pub struct PostDetailView {
  ctx: AppContext,
  id: u64,
  post: Query<Post>,
  author: Option<Query<User>>,
  comments: Query<Vec<Comment>>,
  confirm: Confirm<u64>,
  delete: Mutation<u64>,
  scroll: u16,
}

impl PostDetailView {
  pub fn new(ctx: AppContext, id: u64) -> Self {
    let mut post = ctx.post(id);
    post.fetch();
    let comments = ctx.comments(id).enabled(false);

    let mut view = Self {
      ctx,
      id,
      post,
      author: None,
      comments,
      confirm: Confirm::new(),
      delete: Mutation::new(),
      scroll: 0,
    };
    view.load_dependents();
    view
  }

  /// Start the author and comments queries once the post is there
  fn load_dependents(&mut self) {
    let Some(post) = self.post.data() else {
      return;
    };
    self.comments.set_enabled(true);

    let stale_author = self
      .author
      .as_ref()
      .is_some_and(|author| author.data().is_some_and(|user| user.id != post.user_id));
    if self.author.is_none() || stale_author {
      let mut author = self.ctx.user(post.user_id);
      author.fetch();
      self.author = Some(author);
    }
  }

  fn author_line(&self) -> String {
    match &self.author {
      None => "...".to_string(),
      Some(author) => match author.data() {
        Some(user) => format!("{} <{}>", user.name, user.email),
        None if author.is_error() => "unknown".to_string(),
        None => "loading...".to_string(),
      },
    }
  }

  fn render_post(&self, frame: &mut Frame, area: Rect, post: &Post) {
    let label = Style::default().fg(Color::DarkGray);
    let mut lines = vec![
      Line::from(vec![
        Span::styled("Title:  ", label),
        Span::styled(post.title.clone(), Style::default().bold()),
      ]),
      Line::from(vec![
        Span::styled("Author: ", label),
        Span::raw(self.author_line()),
      ]),
      Line::from(""),
    ];
    lines.extend(post.body.lines().map(|line| Line::from(line.to_string())));

    let paragraph = Paragraph::new(lines)
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(paragraph, area);
  }

  fn render_comments(&self, frame: &mut Frame, area: Rect) {
    let title = match self.comments.data() {
      Some(comments) => format!(" Comments ({}) ", comments.len()),
      None if self.comments.is_loading() => " Comments (loading...) ".to_string(),
      None => " Comments ".to_string(),
    };
    let block = Block::default()
      .title(title)
      .borders(Borders::TOP)
      .border_style(Style::default().fg(Color::DarkGray));

    let Some(comments) = self.comments.data() else {
      let text = if self.comments.is_error() {
        "Failed to load comments."
      } else {
        ""
      };
      frame.render_widget(Paragraph::new(text).block(block), area);
      return;
    };

    let mut lines = Vec::new();
    for comment in comments.iter() {
      lines.push(Line::from(vec![
        Span::styled(comment.name.clone(), Style::default().fg(Color::Cyan)),
        Span::styled(format!("  {}", comment.email), Style::default().fg(Color::DarkGray)),
      ]));
      lines.extend(comment.body.lines().map(|line| Line::from(format!("  {}", line))));
      lines.push(Line::from(""));
    }
    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
  }
}

impl View for PostDetailView {
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

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('r') => {
        self.post.refetch();
        self.comments.refetch();
      }
      KeyCode::Char('e') => {
        if let Some(post) = self.post.data() {
          return ViewAction::Push(Box::new(PostFormView::edit(self.ctx.clone(), &post)));
        }
      }
      KeyCode::Char('d') => {
        if !self.delete.is_pending() {
          self.confirm.ask(self.id, format!("Delete post {}?", self.id));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = if self.post.is_loading() {
      format!(" Post {} (loading...) ", self.id)
    } else if let Some(err) = self.post.error() {
      format!(" Post {} (error: {}) ", self.id, err)
    } else {
      format!(" Post {} ", self.id)
    };
    let block = Block::default()
      .title(Line::from(vec![
        Span::raw(title),
        fetch_indicator(self.post.is_fetching(), self.post.is_stale()),
      ]))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    match self.post.data() {
      Some(post) => {
        let chunks = Layout::default()
          .direction(Direction::Vertical)
          .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
          .split(inner);
        self.render_post(frame, chunks[0], &post);
        self.render_comments(frame, chunks[1]);
      }
      None => {
        let text = if self.post.is_error() {
          "Failed to load post. Press 'r' to retry."
        } else {
          "Loading post..."
        };
        frame.render_widget(
          Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
          inner,
        );
      }
    }

    self.confirm.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("Post {}", self.id)
  }

  fn tick(&mut self) -> ViewAction {
    if self.post.poll() {
      self.load_dependents();
    }
    self.comments.poll();
    if let Some(author) = &mut self.author {
      author.poll();
    }

    if self.delete.poll() {
      if let Some(id) = self.delete.state().data() {
        return ViewAction::Done(format!("Post {} deleted", id));
      }
    }
    ViewAction::None
  }

  fn is_editing(&self) -> bool {
    self.confirm.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("e", "edit").with_priority(20),
      ShortcutInfo::new("d", "delete").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(40),
    ]
  }
}
