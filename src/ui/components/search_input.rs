use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::ui::renderfns::draw_input_overlay;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;

/// Events emitted by search input that parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
  /// Search submitted with this term
  Submitted(String),
  /// Search cleared with Esc
  Cleared,
}

/// Search box opened with `/`. The term is only applied on Enter, so typing
/// does not start a request per keystroke.
#[derive(Debug, Clone, Default)]
pub struct SearchInput {
  input: TextInput,
  applied: String,
  active: bool,
}

impl SearchInput {
  pub fn new() -> Self {
    Self::default()
  }

  /// Check if search is currently active
  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Activate search mode, starting from the applied term
  pub fn activate(&mut self) {
    self.active = true;
    self.input = TextInput::with_value(&self.applied);
  }

  /// Handle a key event
  /// Call this regardless of active state - it handles activation too
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<SearchEvent> {
    if !self.active {
      if key.code == KeyCode::Char('/') {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match self.input.handle_key(key) {
      InputResult::Submitted(term) => {
        self.active = false;
        let term = term.trim().to_string();
        if term == self.applied {
          return KeyResult::Handled;
        }
        self.applied = term.clone();
        KeyResult::Event(SearchEvent::Submitted(term))
      }
      InputResult::Cancelled => {
        self.active = false;
        self.input.clear();
        if self.applied.is_empty() {
          return KeyResult::Handled;
        }
        self.applied.clear();
        KeyResult::Event(SearchEvent::Cleared)
      }
      // Swallow everything else while typing
      InputResult::Consumed | InputResult::NotHandled => KeyResult::Handled,
    }
  }

  /// Render the search overlay if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if self.active {
      draw_input_overlay(frame, area, "Search", "/", &self.input, &[], 0);
    }
  }
}
