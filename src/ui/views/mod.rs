mod almacenes;
mod attendance;
mod dashboard;
mod fechas;
mod login;
mod subalmacenes;
mod trabajadores;
mod usuarios;

pub use almacenes::AlmacenListView;
pub use attendance::AttendanceView;
pub use dashboard::DashboardView;
pub use fechas::FechaListView;
pub use login::LoginView;
pub use subalmacenes::SubalmacenListView;
pub use trabajadores::TrabajadorListView;
pub use usuarios::UsuarioListView;

use ratatui::widgets::ListState;

/// Shown when a write is refused because another one is still running
pub(crate) const BUSY: &str = "Espera a que termine la operación en curso";

/// j/k movement shared by the list views
pub(crate) fn move_selection(state: &mut ListState, len: usize, down: bool) {
  if len == 0 {
    state.select(None);
    return;
  }
  let next = match (state.selected(), down) {
    (None, _) => 0,
    (Some(i), true) => (i + 1).min(len - 1),
    (Some(i), false) => i.saturating_sub(1),
  };
  state.select(Some(next));
}

/// Parse a required numeric id typed into a form
pub(crate) fn parse_id(value: &str, field: &str) -> Result<u64, String> {
  match value.trim().parse::<u64>() {
    Ok(id) if id > 0 => Ok(id),
    _ => Err(format!("{} debe ser un número válido", field)),
  }
}

/// Parse an optional numeric id; empty means none
pub(crate) fn parse_optional_id(value: &str, field: &str) -> Result<Option<u64>, String> {
  if value.trim().is_empty() {
    return Ok(None);
  }
  parse_id(value, field).map(Some)
}

/// Comma or space separated list of ids
pub(crate) fn parse_id_list(value: &str, field: &str) -> Result<Vec<u64>, String> {
  value
    .split(|c: char| c == ',' || c.is_whitespace())
    .filter(|part| !part.is_empty())
    .map(|part| parse_id(part, field))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_move_selection_stays_in_bounds() {
    let mut state = ListState::default();
    move_selection(&mut state, 2, true);
    assert_eq!(state.selected(), Some(0));
    move_selection(&mut state, 2, true);
    move_selection(&mut state, 2, true);
    assert_eq!(state.selected(), Some(1));
    move_selection(&mut state, 2, false);
    move_selection(&mut state, 2, false);
    assert_eq!(state.selected(), Some(0));
  }

  #[test]
  fn test_parse_ids() {
    assert_eq!(parse_id(" 12 ", "Subalmacén"), Ok(12));
    assert!(parse_id("0", "Subalmacén").is_err());
    assert!(parse_id("doce", "Subalmacén").is_err());
    assert_eq!(parse_optional_id("", "Coordinador"), Ok(None));
    assert_eq!(parse_id_list("1, 3 7", "Almacén"), Ok(vec![1, 3, 7]));
    assert!(parse_id_list("1,x", "Almacén").is_err());
  }
}
