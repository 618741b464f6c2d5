use crate::api::api_types::UsuarioInput;
use crate::api::types::{Rol, Usuario};
use crate::app::AppContext;
use crate::query::{Mutation, Query, QueryState};
use crate::ui::components::{
  Dialog, DialogOutcome, Form, FormValues, KeyResult, SearchEvent, SearchInput,
};
use crate::ui::renderfns::{list_block, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{move_selection, parse_id_list, BUSY};
use crate::ui::{ensure_valid_selection, matches_filter};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
  Create,
  Edit(u64),
  Delete(u64),
  Assign(u64),
}

/// Staff users of one role: coordinators or RRHH
pub struct UsuarioListView {
  ctx: AppContext,
  rol: Rol,
  query: Query<Vec<Usuario>>,
  list_state: ListState,
  search: SearchInput,
  filter: String,
  dialog: Option<Dialog<Action>>,
  mutation: Mutation,
}

fn rol_title(rol: Rol) -> &'static str {
  match rol {
    Rol::Coordinador => "Coordinadores",
    Rol::Rrhh => "RRHH",
    Rol::Administracion => "Administración",
  }
}

fn usuario_form(title: &str, current: Option<&Usuario>) -> Form {
  let activo = match current {
    Some(u) if !u.activo => "n",
    _ => "s",
  };
  let password_hint = if current.is_some() {
    "Deja la contraseña vacía para conservarla"
  } else {
    "La contraseña es obligatoria"
  };

  Form::new(title)
    .field("Nombre", current.map(|u| u.nombre.as_str()).unwrap_or(""))
    .field("Correo", current.and_then(|u| u.correo.as_deref()).unwrap_or(""))
    .masked_field("Contraseña")
    .field("Activo (s/n)", activo)
    .hint(password_hint)
}

fn usuario_input(rol: Rol, creating: bool, values: &FormValues) -> Result<UsuarioInput, String> {
  let nombre = values.get(0);
  if nombre.is_empty() {
    return Err("El nombre es obligatorio".to_string());
  }
  let correo = values.get(1);
  if !correo.contains('@') || correo.starts_with('@') || correo.ends_with('@') {
    return Err("Correo inválido".to_string());
  }
  let password = values.optional(2);
  if creating && password.is_none() {
    return Err("La contraseña es obligatoria".to_string());
  }
  let activo = match values.get(3).to_lowercase().as_str() {
    "" | "s" | "si" | "sí" | "1" => 1,
    "n" | "no" | "0" => 0,
    _ => return Err("Activo debe ser s o n".to_string()),
  };

  Ok(UsuarioInput {
    nombre: nombre.to_string(),
    correo: correo.to_string(),
    password,
    rol_id: rol.id(),
    activo,
  })
}

impl UsuarioListView {
  pub fn new(ctx: AppContext, rol: Rol) -> Self {
    let client = ctx.client.clone();
    let mut query = Query::new(move || {
      let client = client.clone();
      async move { client.usuarios(rol).await }
    });
    query.fetch();

    Self {
      ctx,
      rol,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      filter: String::new(),
      dialog: None,
      mutation: Mutation::default(),
    }
  }

  fn visible(&self) -> Vec<&Usuario> {
    self
      .query
      .data()
      .map(|list| {
        list
          .iter()
          .filter(|u| matches_filter(&self.filter, &[&u.nombre, u.correo.as_deref().unwrap_or("")]))
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<(u64, Usuario)> {
    let idx = self.list_state.selected()?;
    let usuario = self.visible().get(idx).map(|u| (*u).clone())?;
    Some((usuario.id?, usuario))
  }

  fn submit(&mut self, action: Action, values: FormValues) {
    if let Action::Assign(id) = action {
      match parse_id_list(values.get(0), "Almacenes") {
        Ok(almacenes) => self.assign(id, almacenes),
        Err(message) => {
          if let Some(dialog) = &mut self.dialog {
            dialog.set_error(message);
          }
        }
      }
      return;
    }

    let input = match usuario_input(self.rol, action == Action::Create, &values) {
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
          client.update_usuario(id, &input).await?;
          Ok(format!("Usuario {} actualizado", input.nombre))
        }
        _ => {
          client.create_usuario(&input).await?;
          Ok(format!("Usuario {} creado", input.nombre))
        }
      }
    });
    self.close_unless_busy(started);
  }

  /// The form closes once its write is under way; otherwise it stays up
  /// with a note.
  fn close_unless_busy(&mut self, started: bool) {
    if started {
      self.dialog = None;
    } else if let Some(dialog) = &mut self.dialog {
      dialog.set_error(BUSY);
    }
  }

  fn assign(&mut self, usuario_id: u64, almacenes: Vec<u64>) {
    let client = self.ctx.client.clone();
    let count = almacenes.len();
    let started = self.mutation.start(async move {
      client.assign_almacenes(usuario_id, almacenes).await?;
      Ok(format!("{} almacenes asignados", count))
    });
    self.close_unless_busy(started);
  }

  fn delete(&mut self, id: u64) {
    let client = self.ctx.client.clone();
    let started = self.mutation.start(async move {
      client.delete_usuario(id).await?;
      Ok("Usuario eliminado".to_string())
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
        let title = format!("Nuevo usuario {}", self.rol.label());
        self.dialog = Some(Dialog::form(Action::Create, usuario_form(&title, None)));
      }
      KeyCode::Char('e') | KeyCode::Enter => {
        let (id, usuario) = self.selected()?;
        self.dialog = Some(Dialog::form(
          Action::Edit(id),
          usuario_form("Editar usuario", Some(&usuario)),
        ));
      }
      KeyCode::Char('w') if self.rol == Rol::Coordinador => {
        let (id, usuario) = self.selected()?;
        let form = Form::new(&format!("Almacenes de {}", usuario.nombre))
          .field("Almacenes (ids)", "")
          .hint("Separados por comas; vacío quita todas las asignaciones");
        self.dialog = Some(Dialog::form(Action::Assign(id), form));
      }
      KeyCode::Char('d') => {
        let (id, usuario) = self.selected()?;
        self.dialog = Some(Dialog::confirm(
          Action::Delete(id),
          format!("¿Eliminar al usuario {}?", usuario.nombre),
        ));
      }
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let name = rol_title(self.rol);
    let title = match self.query.state() {
      QueryState::Loading => format!(" {} (cargando...) ", name),
      QueryState::Error(e) => format!(" {} (error: {}) ", name, e),
      _ => format!(" {} ({}) ", name, len),
    };
    let block = list_block(title);

    if len == 0 && !self.query.is_loading() {
      let content = if self.query.is_error() {
        "No se pudieron cargar los usuarios. Pulsa 'r' para reintentar."
      } else {
        "Sin usuarios con este rol."
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
      .map(|u| {
        let estado = if u.activo {
          Span::styled("activo  ", Style::default().fg(Color::Green))
        } else {
          Span::styled("inactivo", Style::default().fg(Color::Red))
        };
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<28}", truncate(&u.nombre, 28)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(format!(" {:<36} ", truncate(u.correo.as_deref().unwrap_or("-"), 36))),
          estado,
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

impl View for UsuarioListView {
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
    rol_title(self.rol).to_string()
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(e) = self.query.error() {
        self.ctx.report_load_error("usuarios", e);
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
    let mut shortcuts = vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "filter").with_priority(20),
      ShortcutInfo::new("a", "nuevo").with_priority(30),
      ShortcutInfo::new("e", "editar").with_priority(31),
      ShortcutInfo::new("d", "eliminar").with_priority(33),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    if self.rol == Rol::Coordinador {
      shortcuts.push(ShortcutInfo::new("w", "almacenes").with_priority(32));
    }
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn values(parts: &[&str]) -> FormValues {
    FormValues::new(parts.iter().map(|s| s.to_string()).collect())
  }

  #[test]
  fn test_password_required_only_on_create() {
    let form = values(&["Ana", "ana@empresa.pe", "", "s"]);
    assert!(usuario_input(Rol::Coordinador, true, &form).is_err());

    let input = usuario_input(Rol::Coordinador, false, &form).unwrap();
    assert_eq!(input.password, None);
    assert_eq!(input.rol_id, 3);
    assert_eq!(input.activo, 1);
  }

  #[test]
  fn test_usuario_input_validation() {
    assert!(usuario_input(Rol::Rrhh, true, &values(&["Ana", "ana", "x", "s"])).is_err());
    assert!(usuario_input(Rol::Rrhh, true, &values(&["Ana", "a@b.pe", "x", "tal vez"])).is_err());

    let input = usuario_input(Rol::Rrhh, true, &values(&["Ana", "a@b.pe", "x", "N"])).unwrap();
    assert_eq!(input.activo, 0);
    assert_eq!(input.password.as_deref(), Some("x"));
  }
}
