use crate::ui::components::TextInput;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

/// Most suggestions shown under an input overlay
const MAX_SUGGESTIONS: usize = 8;

/// Draw a one-line input box in the top-left of `area`, optionally with a
/// list of `(name, description)` suggestions below it
pub fn draw_input_overlay(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  prefix: &str,
  input: &TextInput,
  suggestions: &[(&str, &str)],
  selected: usize,
) {
  let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
  let shown = suggestions.len().min(MAX_SUGGESTIONS) as u16;
  let height = (3 + shown).min(area.height);

  // Position at top-left of content area with small margin
  let overlay_area = Rect::new(area.x + 1, area.y + 1, width, height).intersection(area);
  frame.render_widget(Clear, overlay_area);

  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Yellow))
    .title(format!(" {} ", title));
  let inner = block.inner(overlay_area);
  frame.render_widget(block, overlay_area);

  if inner.height == 0 {
    return;
  }

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Length(1), Constraint::Min(0)])
    .split(inner);

  let (before, after) = input.split_at_cursor();
  let input_line = Line::from(vec![
    Span::styled(prefix, Style::default().fg(Color::Yellow)),
    Span::raw(before),
    Span::styled("_", Style::default().fg(Color::Yellow)),
    Span::raw(after),
  ]);
  frame.render_widget(Paragraph::new(input_line), chunks[0]);

  if suggestions.is_empty() || chunks[1].height == 0 {
    return;
  }
  let items: Vec<ListItem> = suggestions
    .iter()
    .take(MAX_SUGGESTIONS)
    .map(|(name, description)| {
      ListItem::new(Line::from(vec![
        Span::styled(format!("{:<12}", name), Style::default().fg(Color::Cyan)),
        Span::styled(*description, Style::default().fg(Color::DarkGray)),
      ]))
    })
    .collect();
  let list =
    List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
  let mut state = ListState::default();
  state.select(Some(selected));
  frame.render_stateful_widget(list, chunks[1], &mut state);
}
