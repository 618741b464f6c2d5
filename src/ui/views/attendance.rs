use std::sync::Arc;

use crate::api::api_types::{AttendanceUpdate, RotacionInput};
use crate::api::types::AttendanceRecord;
use crate::api::ApiClient;
use crate::app::AppContext;
use crate::attendance::{AttendanceFeed, AttendanceSource};
use crate::error::{ApiError, ApiResult};
use crate::notifications::Notification;
use crate::query::Mutation;
use crate::ui::components::{
  Dialog, DialogOutcome, Form, FormValues, KeyResult, SearchEvent, SearchInput,
};
use crate::ui::renderfns::{list_block, status_color, status_label, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{move_selection, parse_id_list, BUSY};
use crate::ui::{ensure_valid_selection, matches_filter};
use chrono::{Duration as Days, NaiveDate};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
  Edit(u64),
  Delete(u64),
  Rotate,
}

/// Attendance roster for one sub-warehouse on one day, kept live by
/// change notifications
pub struct AttendanceView {
  ctx: AppContext,
  subalmacen_id: u64,
  fecha: String,
  feed: AttendanceFeed,
  list_state: ListState,
  search: SearchInput,
  filter: String,
  dialog: Option<Dialog<Action>>,
  mutation: Mutation,
}

/// `HH:MM` or `HH:MM:SS`, empty allowed
fn valid_hora(value: &str) -> bool {
  value.is_empty()
    || chrono::NaiveTime::parse_from_str(value, "%H:%M").is_ok()
    || chrono::NaiveTime::parse_from_str(value, "%H:%M:%S").is_ok()
}

fn attendance_update(values: &FormValues) -> Result<AttendanceUpdate, String> {
  for (index, label) in [(0, "Entrada"), (1, "Salida")] {
    if !valid_hora(values.get(index)) {
      return Err(format!("{}: usa HH:MM", label));
    }
  }
  Ok(AttendanceUpdate {
    hora_entrada: values.optional(0),
    hora_salida: values.optional(1),
    justificacion: values.get(2).to_string(),
  })
}

fn shift_day(fecha: &str, days: i64) -> Option<String> {
  let date = NaiveDate::parse_from_str(fecha, "%Y-%m-%d").ok()?;
  let shifted = date.checked_add_signed(Days::days(days))?;
  Some(shifted.format("%Y-%m-%d").to_string())
}

impl AttendanceView {
  pub fn new(ctx: AppContext, subalmacen_id: u64, fecha: &str) -> Self {
    let source: Arc<dyn AttendanceSource> = Arc::new(ctx.client.clone());
    let mut feed = AttendanceFeed::new(source, ctx.attendance.clone());
    feed.set_params(Some(subalmacen_id), fecha);

    Self {
      ctx,
      subalmacen_id,
      fecha: fecha.to_string(),
      feed,
      list_state: ListState::default(),
      search: SearchInput::new(),
      filter: String::new(),
      dialog: None,
      mutation: Mutation::default(),
    }
  }

  fn visible(&self) -> Vec<&AttendanceRecord> {
    self
      .feed
      .records()
      .iter()
      .filter(|r| {
        matches_filter(
          &self.filter,
          &[
            &r.trabajador_nombre,
            r.trabajador_dni.as_deref().unwrap_or(""),
          ],
        )
      })
      .collect()
  }

  fn selected(&self) -> Option<AttendanceRecord> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|r| (*r).clone())
  }

  /// Drop the cached roster and load it again
  fn reload(&mut self) {
    self.feed.clear_cache();
    self.feed.refetch();
  }

  fn go_to_day(&mut self, days: i64) {
    if let Some(fecha) = shift_day(&self.fecha, days) {
      self.fecha = fecha;
      self.feed.set_params(Some(self.subalmacen_id), &self.fecha);
      self.list_state.select(None);
    }
  }

  fn submit(&mut self, action: Action, values: FormValues) {
    let client = self.ctx.client.clone();
    let started = match action {
      Action::Edit(id) => {
        let update = match attendance_update(&values) {
          Ok(update) => update,
          Err(message) => {
            if let Some(dialog) = &mut self.dialog {
              dialog.set_error(message);
            }
            return;
          }
        };
        self.mutation.start(async move {
          client.update_asistencia(id, &update).await?;
          Ok("Asistencia actualizada".to_string())
        })
      }
      Action::Rotate => {
        let ids = match parse_id_list(values.get(0), "Trabajador") {
          Ok(ids) if !ids.is_empty() => ids,
          Ok(_) => {
            if let Some(dialog) = &mut self.dialog {
              dialog.set_error("Ingresa al menos un trabajador");
            }
            return;
          }
          Err(message) => {
            if let Some(dialog) = &mut self.dialog {
              dialog.set_error(message);
            }
            return;
          }
        };
        let subalmacen_id = self.subalmacen_id;
        let fecha = self.fecha.clone();
        self.mutation.start(add_rotations(client, ids, subalmacen_id, fecha))
      }
      Action::Delete(_) => true,
    };

    if started {
      self.dialog = None;
    } else if let Some(dialog) = &mut self.dialog {
      dialog.set_error(BUSY);
    }
  }

  fn delete(&mut self, id: u64) {
    let client = self.ctx.client.clone();
    let started = self.mutation.start(async move {
      client.delete_asistencia(id).await?;
      Ok("Asistencia eliminada".to_string())
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
      KeyCode::Char('[') => self.go_to_day(-1),
      KeyCode::Char(']') => self.go_to_day(1),
      KeyCode::Char('q') | KeyCode::Esc => return Some(ViewAction::Pop),
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => self.reload(),
      KeyCode::Char('e') | KeyCode::Enter => {
        let record = self.selected()?;
        let form = Form::new(format!("Asistencia de {}", record.trabajador_nombre))
          .field("Entrada", record.hora_entrada.as_deref().unwrap_or(""))
          .field("Salida", record.hora_salida.as_deref().unwrap_or(""))
          .field("Justificación", record.justificacion.as_deref().unwrap_or(""))
          .hint("Horas en HH:MM; deja vacío para borrar");
        self.dialog = Some(Dialog::form(Action::Edit(record.id), form));
      }
      KeyCode::Char('d') => {
        let record = self.selected()?;
        self.dialog = Some(Dialog::confirm(
          Action::Delete(record.id),
          format!("¿Eliminar la asistencia de {}?", record.trabajador_nombre),
        ));
      }
      KeyCode::Char('o') => {
        let form = Form::new(format!("Rotación al {}", self.fecha))
          .field("Trabajadores", "")
          .hint("Ids de trabajador separados por coma");
        self.dialog = Some(Dialog::form(Action::Rotate, form));
      }
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn title(&self) -> String {
    let names = self.feed.names();
    let place = match (names.subalmacen.is_empty(), names.almacen.is_empty()) {
      (false, false) => format!("{} · {}", names.almacen, names.subalmacen),
      (false, true) => names.subalmacen.clone(),
      _ => format!("subalmacén {}", self.subalmacen_id),
    };
    let count = self.visible().len();

    if self.feed.is_loading() {
      format!(" Asistencias {} [{}] (cargando...) ", place, self.fecha)
    } else if let Some(e) = self.feed.error() {
      format!(" Asistencias {} [{}] (error: {}) ", place, self.fecha, e)
    } else {
      format!(" Asistencias {} [{}] ({}) ", place, self.fecha, count)
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);
    let block = list_block(self.title());

    if len == 0 && !self.feed.is_loading() {
      let content = if self.feed.key().is_none() {
        "Fecha inválida."
      } else if self.feed.error().is_some() {
        "No se pudieron cargar las asistencias. Pulsa 'r' para reintentar."
      } else {
        "No hay asistencias registradas para esta fecha."
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
      .map(|record| {
        let status = record.status();
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<28}", truncate(&record.trabajador_nombre, 28)),
            Style::default().fg(Color::Cyan),
          ),
          Span::styled(
            format!(" {:<10}", record.trabajador_dni.as_deref().unwrap_or("-")),
            Style::default().fg(Color::DarkGray),
          ),
          Span::raw(format!(
            " {:>8} → {:<8}",
            record.hora_entrada.as_deref().unwrap_or("--:--"),
            record.hora_salida.as_deref().unwrap_or("--:--"),
          )),
          Span::styled(
            format!(" {:<12}", status_label(status)),
            Style::default().fg(status_color(status)),
          ),
          Span::styled(
            truncate(record.justificacion.as_deref().unwrap_or(""), 40),
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

/// Add each worker to the roster in turn, reporting how many made it.
async fn add_rotations(
  client: ApiClient,
  trabajadores: Vec<u64>,
  subalmacen_id: u64,
  fecha: String,
) -> ApiResult<String> {
  let mut added = 0;
  let mut last_error: Option<ApiError> = None;

  for trabajador_id in trabajadores {
    let input = RotacionInput {
      trabajador_id,
      subalmacen_id,
      fecha: fecha.clone(),
    };
    match client.create_rotacion(&input).await {
      Ok(()) => added += 1,
      Err(e) => {
        warn!(trabajador_id, error = %e, "rotation failed");
        // Nothing else will succeed without a session
        if e == ApiError::Unauthorized {
          return Err(e);
        }
        last_error = Some(e);
      }
    }
  }

  match (added, last_error) {
    (0, Some(e)) => Err(e),
    (n, Some(e)) => Ok(format!("{} trabajador(es) agregados; otros fallaron: {}", n, e)),
    (n, None) => Ok(format!("{} trabajador(es) agregados", n)),
  }
}

impl View for AttendanceView {
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
    self.fecha.clone()
  }

  fn tick(&mut self) {
    let was_error = self.feed.error().is_some();
    if self.feed.poll() && !was_error {
      if let Some(e) = self.feed.error() {
        self.ctx.report_load_error("asistencias", e);
      }
    }
    if let Some(result) = self.mutation.poll() {
      if self.ctx.report(result) {
        self.reload();
      }
    }
  }

  fn on_notification(&mut self, notification: &Notification) {
    match notification {
      Notification::AttendanceChange {
        subalmacen_id,
        fecha,
      } => {
        if self.feed.matches(*subalmacen_id, fecha) {
          debug!(subalmacen_id = *subalmacen_id, fecha = %fecha, "attendance changed remotely, reloading");
          self.reload();
        }
      }
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.dialog.is_some() || self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("e", "editar").with_priority(31),
      ShortcutInfo::new("d", "eliminar").with_priority(32),
      ShortcutInfo::new("o", "rotación").with_priority(33),
      ShortcutInfo::new("[ ]", "día").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_attendance_update_validates_hours() {
    let values = FormValues::new(vec!["08:00".into(), String::new(), "Cita médica".into()]);
    let update = attendance_update(&values).unwrap();
    assert_eq!(update.hora_entrada.as_deref(), Some("08:00"));
    assert_eq!(update.hora_salida, None);
    assert_eq!(update.justificacion, "Cita médica");

    let bad = FormValues::new(vec!["8 am".into()]);
    assert!(attendance_update(&bad).is_err());
  }

  #[test]
  fn test_empty_form_clears_every_field() {
    let values = FormValues::new(vec![String::new(), String::new(), String::new()]);
    let body = serde_json::to_value(attendance_update(&values).unwrap()).unwrap();
    assert_eq!(
      body,
      serde_json::json!({"hora_entrada": null, "hora_salida": null, "justificacion": ""})
    );
  }

  #[tokio::test]
  async fn test_rotation_while_busy_keeps_the_form_open() {
    let mut view = AttendanceView::new(AppContext::for_tests(), 3, "2024-03-01");
    assert!(view
      .mutation
      .start(std::future::pending::<crate::error::ApiResult<String>>()));
    view.dialog = Some(Dialog::form(Action::Rotate, Form::new("Rotación").field("Trabajadores", "")));

    view.submit(Action::Rotate, FormValues::new(vec!["4, 9".to_string()]));

    let Some(Dialog::Form(_, form)) = &view.dialog else {
      panic!("form should stay open");
    };
    assert_eq!(form.error(), Some(BUSY));
  }

  #[test]
  fn test_shift_day_crosses_month() {
    assert_eq!(shift_day("2024-02-29", 1).as_deref(), Some("2024-03-01"));
    assert_eq!(shift_day("2024-03-01", -1).as_deref(), Some("2024-02-29"));
    assert_eq!(shift_day("mañana", 1), None);
  }
}
