use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

/// Yes/no prompt guarding a destructive action. Carries the value the
/// action applies to.
#[derive(Debug, Clone)]
pub struct Confirm<T> {
  pending: Option<(T, String)>,
}

impl<T: Clone> Confirm<T> {
  pub fn new() -> Self {
    Self { pending: None }
  }

  pub fn is_active(&self) -> bool {
    self.pending.is_some()
  }

  /// Ask `question` about `value`
  pub fn ask(&mut self, value: T, question: impl Into<String>) {
    self.pending = Some((value, question.into()));
  }

  /// `y` confirms with the value; `n` or Esc dismiss. Other keys are
  /// swallowed while the prompt is open.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<T> {
    let Some((value, _)) = &self.pending else {
      return KeyResult::NotHandled;
    };
    match key.code {
      KeyCode::Char('y') | KeyCode::Char('Y') => {
        let value = value.clone();
        self.pending = None;
        KeyResult::Event(value)
      }
      KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
        self.pending = None;
        KeyResult::Handled
      }
      _ => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let Some((_, question)) = &self.pending else {
      return;
    };
    let width = 50.min(area.width);
    let height = 5.min(area.height);
    let overlay = Rect::new(
      area.x + area.width.saturating_sub(width) / 2,
      area.y + area.height.saturating_sub(height) / 2,
      width,
      height,
    );
    frame.render_widget(Clear, overlay);

    let text = vec![
      Line::from(question.as_str()),
      Line::from(vec![
        Span::styled("y", Style::default().fg(Color::Cyan)),
        Span::styled(" yes   ", Style::default().fg(Color::DarkGray)),
        Span::styled("n", Style::default().fg(Color::Cyan)),
        Span::styled(" no", Style::default().fg(Color::DarkGray)),
      ]),
    ];
    let paragraph = Paragraph::new(text).wrap(Wrap { trim: true }).block(
      Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Confirm "),
    );
    frame.render_widget(paragraph, overlay);
  }
}

impl<T: Clone> Default for Confirm<T> {
  fn default() -> Self {
    Self::new()
  }
}
