use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::api::types::Usuario;
use crate::ui::view::ShortcutInfo;

/// Draw the header bar with title, signed-in user, and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  user: Option<&Usuario>,
  shortcuts: &[ShortcutInfo],
) {
  let mut spans = vec![
    Span::styled(" almacen ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", title), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
  ];

  match user {
    Some(user) => {
      spans.push(Span::styled(
        format!(" {} ", user.nombre),
        Style::default().fg(Color::Yellow).bold(),
      ));
      spans.push(Span::styled(
        format!("({}) ", user.rol_label()),
        Style::default().fg(Color::DarkGray),
      ));
    }
    None => spans.push(Span::styled(
      " sin sesión ",
      Style::default().fg(Color::DarkGray),
    )),
  }

  let mut shortcuts: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  shortcuts.sort_by_key(|s| s.priority);
  for shortcut in shortcuts {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host part of the backend URL, used as the default header title
pub fn extract_domain(url: &str) -> &str {
  let rest = url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url);
  rest.split('/').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extract_domain() {
    assert_eq!(extract_domain("https://api.brayam.pe"), "api.brayam.pe");
    assert_eq!(extract_domain("https://api.brayam.pe/v1"), "api.brayam.pe");
    assert_eq!(extract_domain("http://localhost:3000"), "localhost:3000");
  }
}
