use crate::api::{BlogClient, Comment, ListPostsParams, PaginatedResponse, Post, RemoteError, User};
use crate::commands::Command;
use crate::config::Config;
use crate::event::{self, Event, EventHandler};
use crate::mutation::PostMutations;
use crate::query::keys::{comments, posts, users, ListFilters, QueryKey};
use crate::query::{ErrorObserver, InfiniteQuery, OnlineManager, Query, QueryCache};
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{CacheInspectorView, InfinitePostsView, PostFormView, PostListView};
use crate::ui::renderfns;
use color_eyre::{eyre::eyre, Result};
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// How long a status message stays in the footer
const STATUS_TTL: Duration = Duration::from_secs(6);

/// Users change rarely
const USERS_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Everything a view needs to reach the API and the cache
#[derive(Clone)]
pub struct AppContext {
  pub client: BlogClient,
  pub cache: QueryCache,
  pub mutations: PostMutations,
  pub page_size: u32,
}

impl AppContext {
  pub fn new(config: &Config, client: BlogClient, cache: QueryCache) -> Self {
    let mutations = PostMutations::new(client.clone(), cache.clone(), config.mutation_options());
    Self {
      client,
      cache,
      mutations,
      page_size: config.posts.page_size,
    }
  }

  /// Apply the cache-wide polling default, if any
  fn polled<T: Send + Sync + 'static>(&self, query: Query<T>) -> Query<T> {
    match self.cache.options().refetch_interval {
      Some(interval) => query.with_refetch_interval(interval),
      None => query,
    }
  }

  pub fn posts_page_key(params: &ListPostsParams) -> QueryKey {
    posts::list(&ListFilters::page(params))
  }

  pub fn posts_page(&self, params: &ListPostsParams) -> Query<PaginatedResponse<Post>> {
    let client = self.client.clone();
    let params = params.clone();
    let key = Self::posts_page_key(&params);
    self.polled(Query::new(&self.cache, key, move || {
      let client = client.clone();
      let params = params.clone();
      async move { client.list_posts(&params).await }
    }))
  }

  pub fn infinite_posts(&self, params: &ListPostsParams) -> InfiniteQuery<Post> {
    let client = self.client.clone();
    let params = params.clone();
    let key = posts::infinite(&ListFilters::pageless(&params));
    InfiniteQuery::new(&self.cache, key, move |page| {
      let client = client.clone();
      let params = ListPostsParams {
        page,
        ..params.clone()
      };
      async move { client.list_posts(&params).await }
    })
  }

  pub fn post(&self, id: u64) -> Query<Post> {
    let client = self.client.clone();
    self.polled(Query::new(&self.cache, posts::detail(id), move || {
      let client = client.clone();
      async move { client.get_post(id).await }
    }))
  }

  pub fn users(&self) -> Query<Vec<User>> {
    let client = self.client.clone();
    Query::new(&self.cache, users::list(), move || {
      let client = client.clone();
      async move { client.list_users().await }
    })
    .with_stale_time(USERS_STALE_TIME)
  }

  pub fn user(&self, id: u64) -> Query<User> {
    let client = self.client.clone();
    Query::new(&self.cache, users::detail(id), move || {
      let client = client.clone();
      async move { client.get_user(id).await }
    })
    .with_stale_time(USERS_STALE_TIME)
  }

  pub fn comments(&self, post_id: u64) -> Query<Vec<Comment>> {
    let client = self.client.clone();
    Query::new(&self.cache, comments::list(post_id), move || {
      let client = client.clone();
      async move { client.list_comments(post_id).await }
    })
  }

  /// Warm the cache with what the first screen and the forms will need
  pub fn prefetch(&self) {
    let first_page = ListPostsParams::new(1, self.page_size);
    let client = self.client.clone();
    self
      .cache
      .prefetch(&Self::posts_page_key(&first_page), move || {
        let client = client.clone();
        let params = first_page.clone();
        async move { client.list_posts(&params).await }
      });

    let client = self.client.clone();
    self.cache.prefetch(&users::list(), move || {
      let client = client.clone();
      async move { client.list_users().await }
    });
  }
}

/// Error observer that logs and also hands the message to the status line
struct StatusLineObserver {
  tx: mpsc::UnboundedSender<String>,
}

impl ErrorObserver for StatusLineObserver {
  fn on_query_error(&self, key: &QueryKey, error: &RemoteError) {
    tracing::error!(%key, status = ?error.http_status(), %error, "query error");
    let _ = self.tx.send(format!("Failed to load data: {}", status_text(error)));
  }

  fn on_mutation_error(&self, mutation: &str, error: &RemoteError) {
    tracing::error!(mutation, status = ?error.http_status(), %error, "mutation error");
    let _ = self.tx.send(format!("{} failed: {}", mutation, status_text(error)));
  }
}

/// Short form of an error for the one-line footer
fn status_text(error: &RemoteError) -> String {
  match error.http_status() {
    Some(404) => "not found".to_string(),
    Some(status) => format!("{} (HTTP {})", error.message(), status),
    None => error.message().to_string(),
  }
}

/// Main application state
pub struct App {
  config: Config,
  ctx: AppContext,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` palette, drawn over every view
  command_input: CommandInput,

  /// Latest message for the footer, with when it was set
  status: Option<(String, Instant)>,
  errors: mpsc::UnboundedReceiver<String>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub async fn new(config: Config) -> Result<Self> {
    let client = BlogClient::new(&config.api.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.api.base_url, e))?;

    // The root view fetches as soon as it is built
    let online = event::check_connectivity(client.base_url(), config.probe_timeout()).await;
    tracing::info!(online, "initial connectivity");

    let (tx, errors) = mpsc::unbounded_channel();
    let cache = QueryCache::with_observer(
      config.query_options(),
      OnlineManager::new(online),
      Arc::new(StatusLineObserver { tx }),
    );
    let ctx = AppContext::new(&config, client, cache);
    let root: Box<dyn View> = Box::new(PostListView::new(ctx.clone()));

    Ok(Self {
      config,
      ctx,
      view_stack: vec![root],
      command_input: CommandInput::new(),
      status: None,
      errors,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Restore the terminal even if the loop failed
    stdout().execute(DisableFocusChange)?;
    stdout().execute(LeaveAlternateScreen)?;
    disable_raw_mode()?;

    result
  }

  async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));
    events.watch_connectivity(
      self.ctx.client.base_url(),
      self.config.probe_interval(),
      self.config.probe_timeout(),
    );
    self.ctx.prefetch();

    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      Event::Focus(focused) => self.ctx.cache.focus_changed(focused),
      Event::Connectivity(online) => self.ctx.cache.set_online(online),
    }
  }

  fn tick(&mut self) {
    while let Ok(message) = self.errors.try_recv() {
      self.set_status(message);
    }
    if self
      .status
      .as_ref()
      .is_some_and(|(_, at)| at.elapsed() > STATUS_TTL)
    {
      self.status = None;
    }

    // Views below the top keep their caches warm but cannot navigate
    let top = self.view_stack.len().saturating_sub(1);
    let mut action = ViewAction::None;
    for (i, view) in self.view_stack.iter_mut().enumerate() {
      let result = view.tick();
      if i == top {
        action = result;
      }
    }
    self.apply(action);
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let editing = self.view_stack.last().is_some_and(|view| view.is_editing());
    if !editing || self.command_input.is_active() {
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => return self.execute_command(cmd),
        KeyResult::Event(CommandEvent::Unknown(input)) => {
          return self.set_status(format!("Unknown command: {}", input));
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    if let Some(view) = self.view_stack.last_mut() {
      let action = view.handle_key(key);
      self.apply(action);
    }
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => self.pop(),
      ViewAction::Notify(message) => self.set_status(message),
      ViewAction::Done(message) => {
        self.pop();
        self.set_status(message);
      }
    }
  }

  fn pop(&mut self) {
    if self.view_stack.len() > 1 {
      self.view_stack.pop();
    } else {
      self.should_quit = true;
    }
  }

  fn set_status(&mut self, message: String) {
    self.status = Some((message, Instant::now()));
  }

  fn replace_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
  }

  fn execute_command(&mut self, cmd: &Command) {
    tracing::debug!(command = cmd.name, "command");
    match cmd.name {
      "posts" => self.replace_root(Box::new(PostListView::new(self.ctx.clone()))),
      "infinite" => self.replace_root(Box::new(InfinitePostsView::new(self.ctx.clone()))),
      "new" => self
        .view_stack
        .push(Box::new(PostFormView::create(self.ctx.clone()))),
      "cache" => self
        .view_stack
        .push(Box::new(CacheInspectorView::new(self.ctx.cache.clone()))),
      "clear" => {
        let count = self.ctx.cache.clear();
        self.set_status(format!("Cleared {} cached queries", count));
      }
      "quit" => self.should_quit = true,
      other => tracing::warn!(command = other, "command has no handler"),
    }
  }

  fn draw(&mut self, frame: &mut Frame) {
    let online = self.ctx.cache.is_online();
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1),                          // Header
        Constraint::Length(if online { 0 } else { 1 }), // Offline banner
        Constraint::Min(1),                             // Main content
        Constraint::Length(1),                          // Footer
      ])
      .split(frame.area());

    let shortcuts = self
      .view_stack
      .last()
      .map(|view| view.shortcuts())
      .unwrap_or_default();
    renderfns::draw_header(frame, chunks[0], self.ctx.client.base_url(), online, &shortcuts);
    if !online {
      renderfns::draw_offline_banner(frame, chunks[1]);
    }

    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, chunks[2]);
    }
    self.command_input.render_overlay(frame, chunks[2]);

    let breadcrumb: Vec<String> = self
      .view_stack
      .iter()
      .map(|view| view.breadcrumb_label())
      .collect();
    let status = self.status.as_ref().map(|(message, _)| message.as_str());
    renderfns::draw_footer(frame, chunks[3], &breadcrumb, status);
  }
}

#[cfg(test)]
impl AppContext {
  /// Context against a mock server, with query retries off
  pub fn for_tests(base_url: &str) -> Self {
    let config = Config::default();
    let client = BlogClient::new(base_url).unwrap();
    let cache = QueryCache::new(crate::query::QueryOptions {
      retry: 0,
      ..config.query_options()
    });
    Self::new(&config, client, cache)
  }
}
