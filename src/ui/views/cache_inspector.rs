use crate::query::{EntrySummary, FetchStatus, QueryCache};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Row, Table, TableState};

/// Live table of what the query cache holds
pub struct CacheInspectorView {
  cache: QueryCache,
  entries: Vec<EntrySummary>,
  table_state: TableState,
}

impl CacheInspectorView {
  pub fn new(cache: QueryCache) -> Self {
    let entries = cache.inspect();
    Self {
      cache,
      entries,
      table_state: TableState::default(),
    }
  }

  fn refresh(&mut self) {
    self.entries = self.cache.inspect();
  }

  fn selected(&self) -> Option<&EntrySummary> {
    self.table_state.selected().and_then(|idx| self.entries.get(idx))
  }
}

fn status_style(status: FetchStatus) -> Style {
  match status {
    FetchStatus::Success => Style::default().fg(Color::Green),
    FetchStatus::Error => Style::default().fg(Color::Red),
    FetchStatus::Loading => Style::default().fg(Color::Yellow),
    FetchStatus::Idle => Style::default().fg(Color::DarkGray),
  }
}

impl View for CacheInspectorView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('i') => {
        if let Some(key) = self.selected().map(|entry| entry.key.clone()) {
          self.cache.invalidate(&key);
          self.refresh();
          return ViewAction::Notify(format!("Invalidated {}", key));
        }
      }
      KeyCode::Char('x') => {
        if let Some(key) = self.selected().map(|entry| entry.key.clone()) {
          self.cache.remove(&key);
          self.refresh();
          return ViewAction::Notify(format!("Removed {}", key));
        }
      }
      KeyCode::Char('c') => {
        let count = self.cache.clear();
        self.refresh();
        return ViewAction::Notify(format!("Cleared {} cached queries", count));
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.entries.len();
    match self.table_state.selected() {
      _ if len == 0 => self.table_state.select(None),
      None => self.table_state.select(Some(0)),
      Some(idx) if idx >= len => self.table_state.select(Some(len - 1)),
      Some(_) => {}
    }

    let header = Row::new(["Key", "Status", "Fetching", "Stale", "Subs", "Updated"])
      .style(Style::default().fg(Color::DarkGray).bold());
    let rows: Vec<Row> = self
      .entries
      .iter()
      .map(|entry| {
        let status = &entry.status;
        let updated = status
          .updated_at
          .map(|at| {
            at.with_timezone(&chrono::Local)
              .format("%H:%M:%S")
              .to_string()
          })
          .unwrap_or_else(|| "-".to_string());
        Row::new(vec![
          Cell::from(entry.key.to_string()).style(Style::default().fg(Color::Cyan)),
          Cell::from(format!("{:?}", status.status).to_lowercase())
            .style(status_style(status.status)),
          Cell::from(if status.is_fetching { "yes" } else { "" }),
          Cell::from(if status.is_stale { "stale" } else { "fresh" }),
          Cell::from(entry.subscribers.to_string()),
          Cell::from(updated),
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Min(30),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(6),
        Constraint::Length(5),
        Constraint::Length(9),
      ],
    )
    .header(header)
    .block(
      Block::default()
        .title(format!(" Query cache ({}) ", len))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue)),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.table_state);
  }

  fn breadcrumb_label(&self) -> String {
    "Cache".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.refresh();
    ViewAction::None
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("i", "invalidate").with_priority(10),
      ShortcutInfo::new("x", "remove").with_priority(20),
      ShortcutInfo::new("c", "clear").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(40),
    ]
  }
}
