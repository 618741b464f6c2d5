use crate::api::api_types::SubalmacenInput;
use crate::api::types::{Almacen, Subalmacen};
use crate::app::AppContext;
use crate::query::{Mutation, Query, QueryState};
use crate::ui::components::{
  Dialog, DialogOutcome, Form, FormValues, KeyResult, SearchEvent, SearchInput,
};
use crate::ui::renderfns::{list_block, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{move_selection, FechaListView, BUSY};
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

/// Sub-warehouses of one warehouse
pub struct SubalmacenListView {
  ctx: AppContext,
  almacen: Almacen,
  query: Query<Vec<Subalmacen>>,
  list_state: ListState,
  search: SearchInput,
  filter: String,
  dialog: Option<Dialog<Action>>,
  mutation: Mutation,
}

fn subalmacen_form(title: &str, current: Option<&Subalmacen>) -> Form {
  let nombre = current.map(|s| s.nombre.as_str()).unwrap_or("");
  let refrigerio = current.and_then(|s| s.refrigerio.as_deref()).unwrap_or("");
  let jornada = current.and_then(|s| s.jornada.as_deref()).unwrap_or("");
  Form::new(title)
    .field("Nombre", nombre)
    .field("Refrigerio", refrigerio)
    .field("Jornada", jornada)
    .hint("Refrigerio y jornada tal como los usa RRHH, p. ej. 45 min / 8 h")
}

fn subalmacen_input(almacen_id: u64, values: &FormValues) -> Result<SubalmacenInput, String> {
  let nombre = values.get(0);
  if nombre.is_empty() {
    return Err("El nombre es obligatorio".to_string());
  }
  Ok(SubalmacenInput {
    nombre: nombre.to_string(),
    almacen_id,
    refrigerio: values.get(1).to_string(),
    jornada: values.get(2).to_string(),
  })
}

impl SubalmacenListView {
  pub fn new(ctx: AppContext, almacen: Almacen) -> Self {
    let client = ctx.client.clone();
    let almacen_id = almacen.id;
    let mut query = Query::new(move || {
      let client = client.clone();
      async move { client.subalmacenes(Some(almacen_id)).await }
    });
    query.fetch();

    Self {
      ctx,
      almacen,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      filter: String::new(),
      dialog: None,
      mutation: Mutation::default(),
    }
  }

  fn visible(&self) -> Vec<&Subalmacen> {
    self
      .query
      .data()
      .map(|list| {
        list
          .iter()
          .filter(|s| matches_filter(&self.filter, &[&s.nombre]))
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<Subalmacen> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|s| (*s).clone())
  }

  fn submit(&mut self, action: Action, values: FormValues) {
    let input = match subalmacen_input(self.almacen.id, &values) {
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
          client.update_subalmacen(id, &input).await?;
          Ok(format!("Subalmacén {} actualizado", input.nombre))
        }
        _ => {
          client.create_subalmacen(&input).await?;
          Ok(format!("Subalmacén {} creado", input.nombre))
        }
      }
    });
    if started {
      self.dialog = None;
    } else if let Some(dialog) = &mut self.dialog {
      dialog.set_error(BUSY);
    }
  }

  fn delete(&mut self, id: u64) {
    let client = self.ctx.client.clone();
    let started = self.mutation.start(async move {
      client.delete_subalmacen(id).await?;
      Ok("Subalmacén eliminado".to_string())
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
      KeyCode::Enter => {
        let subalmacen = self.selected()?;
        return Some(ViewAction::Push(Box::new(FechaListView::new(
          self.ctx.clone(),
          subalmacen,
        ))));
      }
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
          subalmacen_form(&format!("Nuevo subalmacén en {}", self.almacen.nombre), None),
        ));
      }
      KeyCode::Char('e') => {
        let sub = self.selected()?;
        self.dialog = Some(Dialog::form(
          Action::Edit(sub.id),
          subalmacen_form("Editar subalmacén", Some(&sub)),
        ));
      }
      KeyCode::Char('d') => {
        let sub = self.selected()?;
        self.dialog = Some(Dialog::confirm(
          Action::Delete(sub.id),
          format!("¿Eliminar el subalmacén {}?", sub.nombre),
        ));
      }
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let name = &self.almacen.nombre;
    let title = match self.query.state() {
      QueryState::Loading => format!(" Subalmacenes [{}] (cargando...) ", name),
      QueryState::Error(e) => format!(" Subalmacenes [{}] (error: {}) ", name, e),
      _ => format!(" Subalmacenes [{}] ({}) ", name, len),
    };
    let block = list_block(title);

    if len == 0 && !self.query.is_loading() {
      let content = if self.query.is_error() {
        "No se pudieron cargar los subalmacenes. Pulsa 'r' para reintentar."
      } else {
        "Sin subalmacenes. Pulsa 'a' para crear uno."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let header = ListItem::new(Line::styled(
      format!("{:>7}  {:<28} {:<14} {}", "id", "nombre", "refrigerio", "jornada"),
      Style::default().fg(Color::DarkGray),
    ));
    let items: Vec<ListItem> = std::iter::once(header)
      .chain(self.visible().iter().map(|sub| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:>7}", sub.id), Style::default().fg(Color::DarkGray)),
          Span::raw("  "),
          Span::styled(
            format!("{:<28}", truncate(&sub.nombre, 28)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(format!(
            "{:<14}",
            truncate(sub.refrigerio.as_deref().unwrap_or("-"), 14)
          )),
          Span::raw(" "),
          Span::raw(truncate(sub.jornada.as_deref().unwrap_or("-"), 20)),
        ]))
      }))
      .collect();

    // Row 0 is the column header
    let mut state = ListState::default().with_selected(self.list_state.selected().map(|i| i + 1));
    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut state);
  }
}

impl View for SubalmacenListView {
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
    self.almacen.nombre.clone()
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(e) = self.query.error() {
        self.ctx.report_load_error("subalmacenes", e);
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
      ShortcutInfo::new("d", "eliminar").with_priority(32),
      ShortcutInfo::new("Enter", "fechas").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_subalmacen_input_keeps_parent() {
    let values = FormValues::new(vec!["Frío".into(), "45 min".into(), "8 h".into()]);
    let input = subalmacen_input(3, &values).unwrap();
    assert_eq!(input.almacen_id, 3);
    assert_eq!(input.refrigerio, "45 min");
    assert!(subalmacen_input(3, &FormValues::new(vec![String::new()])).is_err());
  }
}
