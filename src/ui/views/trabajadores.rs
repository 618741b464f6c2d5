use crate::api::api_types::TrabajadorInput;
use crate::api::types::Trabajador;
use crate::app::AppContext;
use crate::query::{Mutation, Query, QueryState};
use crate::ui::components::{
  Dialog, DialogOutcome, Form, FormValues, KeyResult, SearchEvent, SearchInput,
};
use crate::ui::renderfns::{list_block, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{move_selection, parse_id, parse_optional_id, BUSY};
use crate::ui::{ensure_valid_selection, matches_filter};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
  Create,
  Edit(u64),
  Delete(u64),
}

/// Every worker, with activation toggle
pub struct TrabajadorListView {
  ctx: AppContext,
  query: Query<Vec<Trabajador>>,
  list_state: ListState,
  search: SearchInput,
  filter: String,
  dialog: Option<Dialog<Action>>,
  mutation: Mutation,
}

fn trabajador_form(title: &str, current: Option<&Trabajador>) -> Form {
  let id_text = |id: Option<u64>| id.map(|v| v.to_string()).unwrap_or_default();
  let horas = current
    .and_then(|t| t.horas_objetivo)
    .map(|h| h.to_string())
    .unwrap_or_default();

  Form::new(title)
    .field("Nombre", current.map(|t| t.nombre.as_str()).unwrap_or(""))
    .field("DNI", current.and_then(|t| t.dni.as_deref()).unwrap_or(""))
    .field("Subalmacén (id)", &id_text(current.and_then(|t| t.subalmacen_id)))
    .field("Coordinador (id)", &id_text(current.and_then(|t| t.coordinador_id)))
    .field("Horas objetivo", &horas)
    .hint("Coordinador y horas son opcionales")
}

fn trabajador_input(values: &FormValues) -> Result<TrabajadorInput, String> {
  let nombre = values.get(0);
  if nombre.is_empty() {
    return Err("El nombre es obligatorio".to_string());
  }
  let dni = values.get(1);
  if dni.is_empty() || !dni.chars().all(|c| c.is_ascii_alphanumeric()) {
    return Err("DNI inválido".to_string());
  }
  let subalmacen_id = parse_id(values.get(2), "Subalmacén")?;
  let coordinador_id = parse_optional_id(values.get(3), "Coordinador")?;
  let horas_objetivo = match values.get(4) {
    "" => None,
    text => match text.replace(',', ".").parse::<f64>() {
      Ok(h) if h >= 0.0 => Some(h),
      _ => return Err("Horas objetivo debe ser un número".to_string()),
    },
  };

  Ok(TrabajadorInput {
    nombre: nombre.to_string(),
    dni: dni.to_string(),
    subalmacen_id,
    coordinador_id,
    horas_objetivo,
  })
}

impl TrabajadorListView {
  pub fn new(ctx: AppContext) -> Self {
    let client = ctx.client.clone();
    let mut query = Query::new(move || {
      let client = client.clone();
      async move { client.trabajadores().await }
    });
    query.fetch();

    Self {
      ctx,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      filter: String::new(),
      dialog: None,
      mutation: Mutation::default(),
    }
  }

  fn visible(&self) -> Vec<&Trabajador> {
    self
      .query
      .data()
      .map(|list| {
        list
          .iter()
          .filter(|t| {
            matches_filter(
              &self.filter,
              &[
                &t.nombre,
                t.dni.as_deref().unwrap_or(""),
                t.subalmacen.as_deref().unwrap_or(""),
                t.coordinador.as_deref().unwrap_or(""),
              ],
            )
          })
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<Trabajador> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|t| (*t).clone())
  }

  fn submit(&mut self, action: Action, values: FormValues) {
    let input = match trabajador_input(&values) {
      Ok(input) => input,
      Err(message) => {
        if let Some(dialog) = &mut self.dialog {
          dialog.set_error(message);
        }
        return;
      }
    };

    let client = self.ctx.client.clone();
    let started = self.mutation.start(async move {
      match action {
        Action::Edit(id) => {
          client.update_trabajador(id, &input).await?;
          Ok(format!("Trabajador {} actualizado", input.nombre))
        }
        _ => {
          client.create_trabajador(&input).await?;
          Ok(format!("Trabajador {} registrado", input.nombre))
        }
      }
    });
    if started {
      self.dialog = None;
    } else if let Some(dialog) = &mut self.dialog {
      dialog.set_error(BUSY);
    }
  }

  fn toggle_active(&mut self, trabajador: Trabajador) {
    let client = self.ctx.client.clone();
    let activo = !trabajador.activo;
    let started = self.mutation.start(async move {
      client.set_trabajador_activo(trabajador.id, activo).await?;
      let estado = if activo { "activado" } else { "desactivado" };
      Ok(format!("{} {}", trabajador.nombre, estado))
    });
    if !started {
      self.ctx.status.error(BUSY);
    }
  }

  fn delete(&mut self, id: u64) {
    let client = self.ctx.client.clone();
    let started = self.mutation.start(async move {
      client.delete_trabajador(id).await?;
      Ok("Trabajador eliminado".to_string())
    });
    if !started {
      self.ctx.status.error(BUSY);
    }
  }

  // Key handling helpers for or_else chain pattern
  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    if let Some(dialog) = &mut self.dialog {
      match dialog.handle_key(key) {
        DialogOutcome::Open => {}
        DialogOutcome::Closed => self.dialog = None,
        DialogOutcome::Submitted(action, values) => self.submit(action, values),
        DialogOutcome::Confirmed(action) => {
          self.dialog = None;
          if let Action::Delete(id) = action {
            self.delete(id);
          }
        }
      }
      return Some(ViewAction::None);
    }

    match self.search.handle_key(key) {
      KeyResult::Handled | KeyResult::Event(SearchEvent::Submitted) => Some(ViewAction::None),
      KeyResult::Event(SearchEvent::Changed(filter)) => {
        self.filter = filter;
        self.list_state.select(Some(0));
        Some(ViewAction::None)
      }
      KeyResult::NotHandled => None,
    }
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let len = self.visible().len();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => move_selection(&mut self.list_state, len, true),
      KeyCode::Char('k') | KeyCode::Up => move_selection(&mut self.list_state, len, false),
      KeyCode::Char('q') | KeyCode::Esc => return Some(ViewAction::Pop),
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('a') => {
        self.dialog = Some(Dialog::form(
          Action::Create,
          trabajador_form("Nuevo trabajador", None),
        ));
      }
      KeyCode::Char('e') | KeyCode::Enter => {
        let t = self.selected()?;
        self.dialog = Some(Dialog::form(
          Action::Edit(t.id),
          trabajador_form("Editar trabajador", Some(&t)),
        ));
      }
      KeyCode::Char('t') => {
        let t = self.selected()?;
        self.toggle_active(t);
      }
      KeyCode::Char('d') => {
        let t = self.selected()?;
        self.dialog = Some(Dialog::confirm(
          Action::Delete(t.id),
          format!("¿Eliminar al trabajador {}?", t.nombre),
        ));
      }
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = match self.query.state() {
      QueryState::Loading => " Trabajadores (cargando...) ".to_string(),
      QueryState::Error(e) => format!(" Trabajadores (error: {}) ", e),
      _ => {
        let activos = self.visible().iter().filter(|t| t.activo).count();
        format!(" Trabajadores ({}, {} activos) ", len, activos)
      }
    };
    let block = list_block(title);

    if len == 0 && !self.query.is_loading() {
      let content = if self.query.is_error() {
        "No se pudieron cargar los trabajadores. Pulsa 'r' para reintentar."
      } else {
        "Sin trabajadores registrados."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .visible()
      .iter()
      .map(|t| {
        let (mark, color) = if t.activo {
          ("●", Color::Green)
        } else {
          ("○", Color::DarkGray)
        };
        let place = match (&t.almacen, &t.subalmacen) {
          (Some(a), Some(s)) => format!("{} / {}", a, s),
          (None, Some(s)) => s.clone(),
          _ => "-".to_string(),
        };
        ListItem::new(Line::from(vec![
          Span::styled(mark, Style::default().fg(color)),
          Span::raw(" "),
          Span::styled(
            format!("{:<28}", truncate(&t.nombre, 28)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(format!(" {:<10}", t.dni.as_deref().unwrap_or("-"))),
          Span::raw(format!(" {:<30}", truncate(&place, 30))),
          Span::styled(
            truncate(t.coordinador.as_deref().unwrap_or(""), 24),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for TrabajadorListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
    if let Some(dialog) = &self.dialog {
      dialog.render_overlay(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Trabajadores".to_string()
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(e) = self.query.error() {
        self.ctx.report_load_error("trabajadores", e);
      }
    }
    if let Some(result) = self.mutation.poll() {
      if self.ctx.report(result) {
        self.query.refetch();
      }
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.dialog.is_some() || self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "filter").with_priority(20),
      ShortcutInfo::new("a", "nuevo").with_priority(30),
      ShortcutInfo::new("e", "editar").with_priority(31),
      ShortcutInfo::new("t", "activar").with_priority(32),
      ShortcutInfo::new("d", "eliminar").with_priority(33),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn values(parts: &[&str]) -> FormValues {
    FormValues::new(parts.iter().map(|s| s.to_string()).collect())
  }

  #[test]
  fn test_trabajador_input() {
    let input = trabajador_input(&values(&["Rosa Huamán", "45879632", "3", "", "47,5"])).unwrap();
    assert_eq!(input.subalmacen_id, 3);
    assert_eq!(input.coordinador_id, None);
    assert_eq!(input.horas_objetivo, Some(47.5));
  }

  #[test]
  fn test_trabajador_input_rejects_missing_subalmacen() {
    let err = trabajador_input(&values(&["Rosa", "45879632", "", "", ""])).unwrap_err();
    assert!(err.contains("Subalmacén"));
    assert!(trabajador_input(&values(&["Rosa", "", "3", "", ""])).is_err());
  }
}
