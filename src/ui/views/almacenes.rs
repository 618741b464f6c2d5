use crate::api::api_types::AlmacenInput;
use crate::api::types::Almacen;
use crate::app::AppContext;
use crate::query::{Mutation, Query, QueryState};
use crate::ui::components::{
  Dialog, DialogOutcome, Form, FormValues, KeyResult, SearchEvent, SearchInput,
};
use crate::ui::renderfns::{list_block, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{move_selection, SubalmacenListView, BUSY};
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

/// Root view: every warehouse
pub struct AlmacenListView {
  ctx: AppContext,
  query: Query<Vec<Almacen>>,
  list_state: ListState,
  search: SearchInput,
  filter: String,
  dialog: Option<Dialog<Action>>,
  mutation: Mutation,
}

fn almacen_form(title: &str, current: Option<&Almacen>) -> Form {
  Form::new(title)
    .field("Nombre", current.map(|a| a.nombre.as_str()).unwrap_or(""))
    .field(
      "Descripción",
      current.and_then(|a| a.descripcion.as_deref()).unwrap_or(""),
    )
}

fn almacen_input(values: &FormValues) -> Result<AlmacenInput, String> {
  let nombre = values.get(0);
  if nombre.is_empty() {
    return Err("El nombre es obligatorio".to_string());
  }
  Ok(AlmacenInput {
    nombre: nombre.to_string(),
    descripcion: values.optional(1),
  })
}

impl AlmacenListView {
  pub fn new(ctx: AppContext) -> Self {
    let client = ctx.client.clone();
    let mut query = Query::new(move || {
      let client = client.clone();
      async move { client.almacenes().await }
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

  fn visible(&self) -> Vec<&Almacen> {
    self
      .query
      .data()
      .map(|list| {
        list
          .iter()
          .filter(|a| {
            matches_filter(
              &self.filter,
              &[&a.nombre, a.descripcion.as_deref().unwrap_or("")],
            )
          })
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<Almacen> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|a| (*a).clone())
  }

  fn submit(&mut self, action: Action, values: FormValues) {
    let input = match almacen_input(&values) {
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
          client.update_almacen(id, &input).await?;
          Ok(format!("Almacén {} actualizado", input.nombre))
        }
        _ => {
          client.create_almacen(&input).await?;
          Ok(format!("Almacén {} creado", input.nombre))
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
      client.delete_almacen(id).await?;
      Ok("Almacén eliminado".to_string())
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
      KeyResult::Handled => Some(ViewAction::None),
      KeyResult::Event(SearchEvent::Changed(filter)) => {
        self.filter = filter;
        self.list_state.select(Some(0));
        Some(ViewAction::None)
      }
      KeyResult::Event(SearchEvent::Submitted) => Some(ViewAction::None),
      KeyResult::NotHandled => None,
    }
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let len = self.visible().len();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => move_selection(&mut self.list_state, len, true),
      KeyCode::Char('k') | KeyCode::Up => move_selection(&mut self.list_state, len, false),
      KeyCode::Enter => {
        let almacen = self.selected()?;
        return Some(ViewAction::Push(Box::new(SubalmacenListView::new(
          self.ctx.clone(),
          almacen,
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
        self.dialog = Some(Dialog::form(Action::Create, almacen_form("Nuevo almacén", None)));
      }
      KeyCode::Char('e') => {
        let almacen = self.selected()?;
        self.dialog = Some(Dialog::form(
          Action::Edit(almacen.id),
          almacen_form("Editar almacén", Some(&almacen)),
        ));
      }
      KeyCode::Char('d') => {
        let almacen = self.selected()?;
        self.dialog = Some(Dialog::confirm(
          Action::Delete(almacen.id),
          format!(
            "¿Eliminar el almacén {}? Sus subalmacenes dejarán de estar disponibles.",
            almacen.nombre
          ),
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
      QueryState::Loading => " Almacenes (cargando...) ".to_string(),
      QueryState::Error(e) => format!(" Almacenes (error: {}) ", e),
      _ if !self.filter.is_empty() => format!(" Almacenes [/{}] ({}) ", self.filter, len),
      _ => format!(" Almacenes ({}) ", len),
    };
    let block = list_block(title);

    if len == 0 && !self.query.is_loading() {
      let content = if self.query.is_error() {
        "No se pudieron cargar los almacenes. Pulsa 'r' para reintentar."
      } else if !self.filter.is_empty() {
        "Ningún almacén coincide con el filtro."
      } else {
        "No hay almacenes. Pulsa 'a' para crear uno."
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
      .map(|almacen| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:>5}", almacen.id), Style::default().fg(Color::DarkGray)),
          Span::raw("  "),
          Span::styled(
            format!("{:<30}", truncate(&almacen.nombre, 30)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(truncate(almacen.descripcion.as_deref().unwrap_or(""), 60)),
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

impl View for AlmacenListView {
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
    "Almacenes".to_string()
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(e) = self.query.error() {
        self.ctx.report_load_error("almacenes", e);
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
      ShortcutInfo::new("Enter", "subalmacenes").with_priority(40),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn busy_view() -> AlmacenListView {
    let mut view = AlmacenListView::new(AppContext::for_tests());
    assert!(view
      .mutation
      .start(std::future::pending::<crate::error::ApiResult<String>>()));
    view
  }

  #[tokio::test]
  async fn test_save_while_busy_keeps_the_form_open() {
    let mut view = busy_view();
    view.dialog = Some(Dialog::form(Action::Create, almacen_form("Nuevo almacén", None)));

    let values = FormValues::new(vec!["Central".to_string(), String::new()]);
    view.submit(Action::Create, values);

    let Some(Dialog::Form(_, form)) = &view.dialog else {
      panic!("form should stay open");
    };
    assert_eq!(form.error(), Some(BUSY));
    assert!(view.mutation.is_running());
  }

  #[tokio::test]
  async fn test_delete_while_busy_says_so() {
    let mut view = busy_view();
    view.delete(4);

    let shown = view.ctx.status.current().map(|m| m.text);
    assert_eq!(shown.as_deref(), Some(BUSY));
  }

  #[test]
  fn test_almacen_input_requires_name() {
    let empty = FormValues::new(vec![String::new(), "x".to_string()]);
    assert!(almacen_input(&empty).is_err());

    let values = FormValues::new(vec!["Central".to_string(), String::new()]);
    let input = almacen_input(&values).unwrap();
    assert_eq!(input.nombre, "Central");
    assert_eq!(input.descripcion, None);
  }
}
