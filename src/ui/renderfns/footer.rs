use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the footer bar: view breadcrumb on the left, the latest status
/// message on the right
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], status: Option<&str>) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      // Current view - highlighted
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
    .split(area);

  let crumbs = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(crumbs, chunks[0]);

  let message = Paragraph::new(format!("{} ", status.unwrap_or_default()))
    .alignment(Alignment::Right)
    .style(Style::default().fg(Color::Red).bg(Color::Black));
  frame.render_widget(message, chunks[1]);
}
