use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::api::api_types::{FechaBatchInput, FechaInput};
use crate::api::types::{Fecha, Subalmacen};
use crate::app::AppContext;
use crate::attendance::is_valid_fecha;
use crate::error::ApiError;
use crate::query::{Mutation, Query, QueryState};
use crate::ui::components::{
  Dialog, DialogOutcome, Form, FormValues, KeyResult, SearchEvent, SearchInput,
};
use crate::ui::renderfns::list_block;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{move_selection, AttendanceView, BUSY};
use crate::ui::{ensure_valid_selection, matches_filter};
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
  Add,
  Edit(u64),
  Delete(u64),
  Export(Vec<u64>),
}

/// Scheduled dates of one sub-warehouse
pub struct FechaListView {
  ctx: AppContext,
  subalmacen: Subalmacen,
  query: Query<Vec<Fecha>>,
  list_state: ListState,
  search: SearchInput,
  filter: String,
  marked: BTreeSet<u64>,
  dialog: Option<Dialog<Action>>,
  mutation: Mutation,
}

/// Split a comma/space separated list of dates, rejecting anything that is
/// not a calendar day. Duplicates are dropped, order is kept.
fn parse_fechas(value: &str) -> Result<Vec<String>, String> {
  let mut fechas: Vec<String> = Vec::new();
  for part in value
    .split(|c: char| c == ',' || c.is_whitespace())
    .filter(|p| !p.is_empty())
  {
    if !is_valid_fecha(part) {
      return Err(format!("Fecha inválida: {} (usa AAAA-MM-DD)", part));
    }
    if !fechas.iter().any(|f| f == part) {
      fechas.push(part.to_string());
    }
  }
  if fechas.is_empty() {
    return Err("Ingresa al menos una fecha".to_string());
  }
  Ok(fechas)
}

fn export_path(value: &str, subalmacen: &Subalmacen) -> PathBuf {
  if value.is_empty() {
    PathBuf::from(format!("asistencias-{}.xlsx", subalmacen.id))
  } else {
    PathBuf::from(value)
  }
}

impl FechaListView {
  pub fn new(ctx: AppContext, subalmacen: Subalmacen) -> Self {
    let client = ctx.client.clone();
    let subalmacen_id = subalmacen.id;
    let mut query = Query::new(move || {
      let client = client.clone();
      async move {
        let mut fechas = client.fechas(subalmacen_id).await?;
        // Most recent first
        fechas.sort_by(|a, b| b.fecha.cmp(&a.fecha));
        Ok(fechas)
      }
    });
    query.fetch();

    Self {
      ctx,
      subalmacen,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      filter: String::new(),
      marked: BTreeSet::new(),
      dialog: None,
      mutation: Mutation::default(),
    }
  }

  fn visible(&self) -> Vec<&Fecha> {
    self
      .query
      .data()
      .map(|list| {
        list
          .iter()
          .filter(|f| matches_filter(&self.filter, &[f.day()]))
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<Fecha> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|f| (*f).clone())
  }

  /// Marked dates, or the highlighted one when nothing is marked
  fn export_ids(&self) -> Vec<u64> {
    if !self.marked.is_empty() {
      return self.marked.iter().copied().collect();
    }
    self.selected().map(|f| vec![f.id]).unwrap_or_default()
  }

  fn submit(&mut self, action: Action, values: FormValues) {
    let client = self.ctx.client.clone();
    let subalmacen_id = self.subalmacen.id;

    let started = match action {
      Action::Add => match parse_fechas(values.get(0)) {
        Ok(fechas) => self.mutation.start(async move {
          if let [fecha] = fechas.as_slice() {
            let input = FechaInput {
              fecha: fecha.clone(),
              subalmacen_id,
            };
            client.create_fecha(&input).await?;
            return Ok(format!("Fecha {} agregada", fecha));
          }
          let input = FechaBatchInput {
            fechas,
            subalmacen_id,
          };
          let created = client.create_fechas(&input).await?;
          Ok(format!("{} fechas agregadas", created.len()))
        }),
        Err(message) => return self.show_error(message),
      },
      Action::Edit(id) => {
        let fecha = values.get(0).to_string();
        if !is_valid_fecha(&fecha) {
          return self.show_error(format!("Fecha inválida: {} (usa AAAA-MM-DD)", fecha));
        }
        self.mutation.start(async move {
          let input = FechaInput {
            fecha,
            subalmacen_id,
          };
          client.update_fecha(id, &input).await?;
          Ok(format!("Fecha cambiada a {}", input.fecha))
        })
      }
      Action::Export(ids) => {
        let path = export_path(values.get(0), &self.subalmacen);
        self.mutation.start(async move {
          let bytes = client.export_fechas(subalmacen_id, &ids).await?;
          tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ApiError::Storage(format!("{}: {}", path.display(), e)))?;
          Ok(format!("Exportado a {} ({} bytes)", path.display(), bytes.len()))
        })
      }
      Action::Delete(_) => false,
    };

    if started {
      self.dialog = None;
    } else {
      self.show_error(BUSY.to_string());
    }
  }

  fn show_error(&mut self, message: String) {
    if let Some(dialog) = &mut self.dialog {
      dialog.set_error(message);
    }
  }

  fn delete(&mut self, id: u64) {
    let client = self.ctx.client.clone();
    let started = self.mutation.start(async move {
      client.delete_fecha(id).await?;
      Ok("Fecha eliminada".to_string())
    });
    if started {
      self.marked.remove(&id);
    } else {
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
        let fecha = self.selected()?;
        return Some(ViewAction::Push(Box::new(AttendanceView::new(
          self.ctx.clone(),
          self.subalmacen.id,
          fecha.day(),
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
      KeyCode::Char(' ') => {
        let fecha = self.selected()?;
        if !self.marked.remove(&fecha.id) {
          self.marked.insert(fecha.id);
        }
        let len = self.visible().len();
        move_selection(&mut self.list_state, len, true);
      }
      KeyCode::Char('a') => {
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        self.dialog = Some(Dialog::form(
          Action::Add,
          Form::new("Agregar fechas")
            .field("Fechas", &today)
            .hint("AAAA-MM-DD, varias separadas por coma"),
        ));
      }
      KeyCode::Char('e') => {
        let fecha = self.selected()?;
        self.dialog = Some(Dialog::form(
          Action::Edit(fecha.id),
          Form::new("Cambiar fecha").field("Fecha", fecha.day()),
        ));
      }
      KeyCode::Char('d') => {
        let fecha = self.selected()?;
        self.dialog = Some(Dialog::confirm(
          Action::Delete(fecha.id),
          format!("¿Eliminar la fecha {} y sus asistencias?", fecha.day()),
        ));
      }
      KeyCode::Char('x') => {
        let ids = self.export_ids();
        if ids.is_empty() {
          self.ctx.status.error("Selecciona al menos una fecha para exportar");
          return Some(ViewAction::None);
        }
        let default_path = export_path("", &self.subalmacen);
        self.dialog = Some(Dialog::form(
          Action::Export(ids.clone()),
          Form::new(format!("Exportar {} fecha(s) a Excel", ids.len()))
            .field("Archivo", &default_path.display().to_string()),
        ));
      }
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let name = &self.subalmacen.nombre;
    let title = match self.query.state() {
      QueryState::Loading => format!(" Fechas [{}] (cargando...) ", name),
      QueryState::Error(e) => format!(" Fechas [{}] (error: {}) ", name, e),
      _ if !self.marked.is_empty() => {
        format!(" Fechas [{}] ({}, {} marcadas) ", name, len, self.marked.len())
      }
      _ => format!(" Fechas [{}] ({}) ", name, len),
    };
    let block = list_block(title);

    if len == 0 && !self.query.is_loading() {
      let content = if self.query.is_error() {
        "No se pudieron cargar las fechas. Pulsa 'r' para reintentar."
      } else {
        "Sin fechas programadas. Pulsa 'a' para agregar."
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
      .map(|fecha| {
        let mark = if self.marked.contains(&fecha.id) { "[x]" } else { "[ ]" };
        ListItem::new(Line::from(vec![
          Span::styled(mark, Style::default().fg(Color::Yellow)),
          Span::raw(" "),
          Span::styled(fecha.day().to_string(), Style::default().fg(Color::Cyan)),
          Span::styled(format!("   #{}", fecha.id), Style::default().fg(Color::DarkGray)),
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

impl View for FechaListView {
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
    self.subalmacen.nombre.clone()
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(e) = self.query.error() {
        self.ctx.report_load_error("fechas", e);
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
      ShortcutInfo::new("a", "agregar").with_priority(30),
      ShortcutInfo::new("d", "eliminar").with_priority(32),
      ShortcutInfo::new("space", "marcar").with_priority(33),
      ShortcutInfo::new("x", "exportar").with_priority(34),
      ShortcutInfo::new("Enter", "asistencias").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_fechas_batch() {
    assert_eq!(
      parse_fechas("2024-03-01, 2024-03-02 2024-03-01").unwrap(),
      vec!["2024-03-01".to_string(), "2024-03-02".to_string()]
    );
  }

  #[test]
  fn test_parse_fechas_rejects_bad_day() {
    let err = parse_fechas("2024-02-30").unwrap_err();
    assert!(err.contains("2024-02-30"));
    assert!(parse_fechas(" , ").is_err());
  }

  #[test]
  fn test_default_export_path() {
    let sub: Subalmacen = serde_json::from_str(r#"{"id":7,"nombre":"Frío"}"#).unwrap();
    assert_eq!(export_path("", &sub), PathBuf::from("asistencias-7.xlsx"));
    assert_eq!(export_path("/tmp/a.xlsx", &sub), PathBuf::from("/tmp/a.xlsx"));
  }
}
