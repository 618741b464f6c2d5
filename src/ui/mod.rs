pub mod components;
pub mod renderfns;
pub mod status;
pub mod view;
pub mod views;

use ratatui::widgets::ListState;

pub use status::StatusLine;

/// Keep the selection inside `0..len`, selecting the first row when nothing
/// is selected and clearing it for an empty list.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
    return;
  }
  match state.selected() {
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
    None => state.select(Some(0)),
  }
}

/// Case-insensitive substring filter used by every list view.
pub fn matches_filter(filter: &str, fields: &[&str]) -> bool {
  let filter = filter.trim().to_lowercase();
  filter.is_empty() || fields.iter().any(|f| f.to_lowercase().contains(&filter))
}
