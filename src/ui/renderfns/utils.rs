use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders};

use crate::api::types::AttendanceStatus;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for an attendance row
pub fn status_color(status: AttendanceStatus) -> Color {
  match status {
    AttendanceStatus::Complete => Color::Green,
    AttendanceStatus::InProgress => Color::Yellow,
    AttendanceStatus::Justified => Color::Cyan,
    AttendanceStatus::Absent => Color::Red,
  }
}

pub fn status_label(status: AttendanceStatus) -> &'static str {
  match status {
    AttendanceStatus::Complete => "completo",
    AttendanceStatus::InProgress => "en turno",
    AttendanceStatus::Justified => "justificado",
    AttendanceStatus::Absent => "falta",
  }
}

/// Bordered block with a centered title, shared by all list views
pub fn list_block(title: String) -> Block<'static> {
  Block::default()
    .title(title)
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue))
}

/// Rectangle of at most `width` x `height` centered in `area`
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect::new(
    area.x + (area.width - width) / 2,
    area.y + (area.height - height) / 2,
    width,
    height,
  )
}

/// Top-left anchored overlay used by the command palette and filter
pub fn overlay_area(area: Rect, height: u16) -> Rect {
  let width = (area.width * 60 / 100).clamp(30, 60).min(area.width.saturating_sub(1));
  Rect::new(
    area.x + 1,
    area.y + 1,
    width,
    height.min(area.height.saturating_sub(1)),
  )
}
