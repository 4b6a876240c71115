use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use url::Url;

/// Draw the header bar with logo, API host, connectivity and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  base_url: &Url,
  online: bool,
  shortcuts: &[ShortcutInfo],
) {
  let mut spans = vec![
    Span::styled(" postdeck ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", host_label(base_url)), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
  ];
  if online {
    spans.push(Span::styled(" online ", Style::default().fg(Color::Green)));
  } else {
    spans.push(Span::styled(
      " OFFLINE ",
      Style::default().fg(Color::White).bg(Color::Red).bold(),
    ));
  }
  spans.push(Span::raw("  "));

  let mut shortcuts = shortcuts.to_vec();
  shortcuts.sort_by_key(|s| s.priority);
  for shortcut in shortcuts {
    // Shortcuts - keys highlighted, descriptions dimmed
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}  ", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Draw the banner shown while the API host is unreachable
pub fn draw_offline_banner(frame: &mut Frame, area: Rect) {
  let banner = Paragraph::new(" You are offline. Requests are paused and resume when the connection returns.")
    .style(Style::default().fg(Color::Black).bg(Color::Yellow));
  frame.render_widget(banner, area);
}

/// Host (and port, when explicit) of the API
fn host_label(url: &Url) -> String {
  match (url.host_str(), url.port()) {
    (Some(host), Some(port)) => format!("{}:{}", host, port),
    (Some(host), None) => host.to_string(),
    (None, _) => url.as_str().to_string(),
  }
}
