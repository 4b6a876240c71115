use crate::api::{NewPost, Post, PostUpdate, User};
use crate::app::AppContext;
use crate::mutation::{Mutation, MutationState};
use crate::query::Query;
use crate::ui::components::{InputResult, TextInput};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::post_list::next_author;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// Author preselected for a new post
const DEFAULT_AUTHOR: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
  Create,
  Edit(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
  Title,
  Body,
  Author,
}

impl Field {
  fn next(self) -> Self {
    match self {
      Field::Title => Field::Body,
      Field::Body => Field::Author,
      Field::Author => Field::Title,
    }
  }

  fn previous(self) -> Self {
    match self {
      Field::Title => Field::Author,
      Field::Body => Field::Title,
      Field::Author => Field::Body,
    }
  }
}

/// Per-field validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
  pub title: Option<&'static str>,
  pub body: Option<&'static str>,
  pub author: Option<&'static str>,
}

impl FormErrors {
  pub fn is_empty(&self) -> bool {
    self.title.is_none() && self.body.is_none() && self.author.is_none()
  }

  fn clear(&mut self, field: Field) {
    match field {
      Field::Title => self.title = None,
      Field::Body => self.body = None,
      Field::Author => self.author = None,
    }
  }

  fn get(&self, field: Field) -> Option<&'static str> {
    match field {
      Field::Title => self.title,
      Field::Body => self.body,
      Field::Author => self.author,
    }
  }
}

/// Check a post before it is sent. Blank text counts as missing.
pub fn validate(title: &str, body: &str, author: Option<u64>) -> FormErrors {
  FormErrors {
    title: title.trim().is_empty().then_some("Title is required"),
    body: body.trim().is_empty().then_some("Content is required"),
    author: author.is_none().then_some("Author is required"),
  }
}

/// Create or edit a post
pub struct PostFormView {
  ctx: AppContext,
  mode: Mode,
  title: TextInput,
  body: TextInput,
  author: Option<u64>,
  focus: Field,
  errors: FormErrors,
  users: Query<Vec<User>>,
  save: Mutation<Post>,
}

impl PostFormView {
  pub fn create(ctx: AppContext) -> Self {
    Self::with_values(ctx, Mode::Create, "", "", Some(DEFAULT_AUTHOR))
  }

  pub fn edit(ctx: AppContext, post: &Post) -> Self {
    Self::with_values(ctx, Mode::Edit(post.id), &post.title, &post.body, Some(post.user_id))
  }

  fn with_values(ctx: AppContext, mode: Mode, title: &str, body: &str, author: Option<u64>) -> Self {
    let mut users = ctx.users();
    users.fetch();
    Self {
      ctx,
      mode,
      title: TextInput::with_value(title),
      body: TextInput::with_value(body),
      author,
      focus: Field::Title,
      errors: FormErrors::default(),
      users,
      save: Mutation::new(),
    }
  }

  fn cycle_author(&mut self, forward: bool) {
    let users = self.users.data();
    let users = users.as_deref().map(Vec::as_slice).unwrap_or(&[]);
    self.author = if forward {
      next_author(self.author, users)
    } else {
      let reversed: Vec<User> = users.iter().rev().cloned().collect();
      next_author(self.author, &reversed)
    };
    self.errors.clear(Field::Author);
  }

  fn submit(&mut self) {
    if self.save.is_pending() {
      return;
    }
    self.errors = validate(self.title.value(), self.body.value(), self.author);
    let Some(user_id) = self.author.filter(|_| self.errors.is_empty()) else {
      return;
    };

    let post = NewPost {
      title: self.title.value().trim().to_string(),
      body: self.body.value().trim().to_string(),
      user_id,
    };
    let mutations = self.ctx.mutations.clone();
    match self.mode {
      Mode::Create => self.save.run(async move { mutations.create(post).await }),
      Mode::Edit(id) => self
        .save
        .run(async move { mutations.update(id, PostUpdate::from(post)).await }),
    }
  }

  fn author_label(&self) -> String {
    let Some(id) = self.author else {
      return "Select an author".to_string();
    };
    self
      .users
      .data()
      .and_then(|users| users.iter().find(|user| user.id == id).map(|user| user.name.clone()))
      .unwrap_or_else(|| format!("user {}", id))
  }

  fn field_block(&self, field: Field, title: &'static str) -> Block<'static> {
    let color = if self.errors.get(field).is_some() {
      Color::Red
    } else if self.focus == field {
      Color::Yellow
    } else {
      Color::DarkGray
    };
    let mut block = Block::default()
      .title(format!(" {} ", title))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(color));
    if let Some(error) = self.errors.get(field) {
      let error = Line::styled(format!(" {} ", error), Style::default().fg(Color::Red));
      block = block.title_bottom(error);
    }
    block
  }

  fn input_line(&self, field: Field, input: &TextInput) -> Line<'static> {
    if self.focus != field {
      return Line::from(input.value().to_string());
    }
    let (before, after) = input.split_at_cursor();
    Line::from(vec![
      Span::raw(before.to_string()),
      Span::styled("█", Style::default().fg(Color::Yellow)),
      Span::raw(after.to_string()),
    ])
  }
}

impl View for PostFormView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        self.focus = self.focus.next();
        return ViewAction::None;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus = self.focus.previous();
        return ViewAction::None;
      }
      _ => {}
    }

    if self.focus == Field::Author {
      match key.code {
        KeyCode::Left | KeyCode::Char('h') => self.cycle_author(false),
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => self.cycle_author(true),
        KeyCode::Enter => self.submit(),
        KeyCode::Esc => return ViewAction::Pop,
        _ => {}
      }
      return ViewAction::None;
    }

    let focus = self.focus;
    let input = match focus {
      Field::Title => &mut self.title,
      _ => &mut self.body,
    };
    let before = input.value().to_string();
    let result = input.handle_key(key);
    let edited = input.value() != before;
    match result {
      InputResult::Submitted(_) => self.submit(),
      InputResult::Cancelled => return ViewAction::Pop,
      InputResult::Consumed if edited => self.errors.clear(focus),
      InputResult::Consumed | InputResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let heading = match self.mode {
      Mode::Create => " New post ".to_string(),
      Mode::Edit(id) => format!(" Edit post {} ", id),
    };
    let outer = Block::default()
      .title(heading)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(3), // Title
        Constraint::Min(5),    // Content
        Constraint::Length(3), // Author
        Constraint::Length(1), // Submit state
      ])
      .split(inner);

    let title = Paragraph::new(self.input_line(Field::Title, &self.title))
      .block(self.field_block(Field::Title, "Title"));
    frame.render_widget(title, chunks[0]);

    let body = Paragraph::new(self.input_line(Field::Body, &self.body))
      .wrap(Wrap { trim: false })
      .block(self.field_block(Field::Body, "Content"));
    frame.render_widget(body, chunks[1]);

    let author_style = if self.users.is_loading() {
      Style::default().fg(Color::DarkGray)
    } else {
      Style::default()
    };
    let author = Paragraph::new(Line::from(vec![
      Span::styled("◀ ", Style::default().fg(Color::DarkGray)),
      Span::styled(self.author_label(), author_style),
      Span::styled(" ▶", Style::default().fg(Color::DarkGray)),
    ]))
    .block(self.field_block(Field::Author, "Author"));
    frame.render_widget(author, chunks[2]);

    let state = match self.save.state() {
      MutationState::Pending => Span::styled(" Saving...", Style::default().fg(Color::Yellow)),
      MutationState::Error(err) => {
        Span::styled(format!(" {}", err), Style::default().fg(Color::Red))
      }
      _ => Span::styled(
        " Enter to save, Esc to cancel",
        Style::default().fg(Color::DarkGray),
      ),
    };
    frame.render_widget(Paragraph::new(state), chunks[3]);
  }

  fn breadcrumb_label(&self) -> String {
    match self.mode {
      Mode::Create => "New post".to_string(),
      Mode::Edit(id) => format!("Edit {}", id),
    }
  }

  fn tick(&mut self) -> ViewAction {
    self.users.poll();
    if self.save.poll() {
      if let Some(post) = self.save.state().data() {
        let message = match self.mode {
          Mode::Create => format!("Post {} created", post.id),
          Mode::Edit(id) => format!("Post {} updated", id),
        };
        return ViewAction::Done(message);
      }
    }
    ViewAction::None
  }

  fn is_editing(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("Tab", "next field").with_priority(10),
      ShortcutInfo::new("←/→", "author").with_priority(20),
      ShortcutInfo::new("Enter", "save").with_priority(30),
      ShortcutInfo::new("Esc", "cancel").with_priority(40),
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

  #[test]
  fn test_validate_reports_every_missing_field() {
    let errors = validate("  ", "", None);
    assert_eq!(errors.title, Some("Title is required"));
    assert_eq!(errors.body, Some("Content is required"));
    assert_eq!(errors.author, Some("Author is required"));
    assert!(!errors.is_empty());
  }

  #[test]
  fn test_validate_accepts_complete_post() {
    assert!(validate("Title", "Body", Some(1)).is_empty());
  }

  #[tokio::test]
  async fn test_editing_a_field_clears_only_its_error() {
    let server = MockServer::start_async().await;
    let mut form = PostFormView::create(AppContext::for_tests(&server.base_url()));
    form.handle_key(key(KeyCode::Enter));
    assert_eq!(form.errors.title, Some("Title is required"));
    assert_eq!(form.errors.body, Some("Content is required"));

    form.handle_key(key(KeyCode::Char('T')));
    assert_eq!(form.errors.title, None);
    assert_eq!(form.errors.body, Some("Content is required"));
  }

  #[tokio::test]
  async fn test_invalid_form_sends_nothing() {
    let server = MockServer::start_async().await;
    let create = server
      .mock_async(|when, then| {
        when.method("POST").path("/posts");
        then
          .status(201)
          .json_body(json!({"id": 101, "title": "t", "body": "b", "userId": 1}));
      })
      .await;
    let mut form = PostFormView::create(AppContext::for_tests(&server.base_url()));
    form.handle_key(key(KeyCode::Char('t')));
    form.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(50)).await;

    create.assert_hits_async(0).await;
    assert!(matches!(form.tick(), ViewAction::None));
  }

  #[tokio::test]
  async fn test_successful_create_closes_form() {
    let server = MockServer::start_async().await;
    let create = server
      .mock_async(|when, then| {
        when
          .method("POST")
          .path("/posts")
          .json_body(json!({"title": "Hello", "body": "World", "userId": 1}));
        then
          .status(201)
          .json_body(json!({"id": 101, "title": "Hello", "body": "World", "userId": 1}));
      })
      .await;
    let mut form = PostFormView::create(AppContext::for_tests(&server.base_url()));
    for c in "Hello".chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
    form.handle_key(key(KeyCode::Tab));
    for c in "World".chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
    form.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(80)).await;

    create.assert_async().await;
    match form.tick() {
      ViewAction::Done(message) => assert_eq!(message, "Post 101 created"),
      _ => panic!("form should close after saving"),
    }
  }

  #[tokio::test]
  async fn test_failed_update_keeps_form_open() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("PUT").path("/posts/3");
        then.status(500);
      })
      .await;
    let post = Post {
      id: 3,
      title: "t".to_string(),
      body: "b".to_string(),
      user_id: 2,
    };
    let mut form = PostFormView::edit(AppContext::for_tests(&server.base_url()), &post);
    form.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(matches!(form.tick(), ViewAction::None));
    assert!(matches!(form.save.state(), MutationState::Error(_)));
  }
}
