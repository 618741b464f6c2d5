use std::time::Duration;

use crate::api::types::{DashboardResumen, HorasExtra, HorasFaltantes, TrabajadorSemana, Usuario};
use crate::app::AppContext;
use crate::error::ApiResult;
use crate::query::{Pending, Query, QueryState};
use crate::ui::renderfns::{list_block, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, Paragraph};

const MAX_ROWS: usize = 10;

/// Everything the dashboard shows, fetched together
pub struct DashboardData {
  pub resumen: DashboardResumen,
  pub horas_extras: Vec<HorasExtra>,
  pub horas_faltantes: Vec<HorasFaltantes>,
  pub semana: Vec<TrabajadorSemana>,
}

pub struct DashboardView {
  ctx: AppContext,
  query: Query<DashboardData>,
  /// Forced session check started by a manual refresh
  session_check: Option<Pending<ApiResult<Option<Usuario>>>>,
}

/// Overtime ranking, largest first
fn top_horas_extras(rows: &[HorasExtra]) -> Vec<(&str, f64)> {
  let mut ranked: Vec<(&str, f64)> = rows
    .iter()
    .filter_map(|r| r.horas_extra.map(|h| (r.nombre.as_str(), h)))
    .filter(|(_, h)| *h > 0.0)
    .collect();
  ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
  ranked.truncate(MAX_ROWS);
  ranked
}

fn top_horas_faltantes(rows: &[HorasFaltantes]) -> Vec<(&str, f64)> {
  let mut ranked: Vec<(&str, f64)> = rows
    .iter()
    .map(|r| (r.nombre.as_str(), r.faltantes()))
    .filter(|(_, h)| *h > 0.0)
    .collect();
  ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
  ranked.truncate(MAX_ROWS);
  ranked
}

fn hours_list<'a>(title: &str, rows: &[(&str, f64)], color: Color) -> List<'a> {
  let items: Vec<ListItem> = rows
    .iter()
    .map(|(nombre, horas)| {
      ListItem::new(Line::from(vec![
        Span::raw(format!("{:<24}", truncate(nombre, 24))),
        Span::styled(format!("{:>7.1} h", horas), Style::default().fg(color)),
      ]))
    })
    .collect();
  List::new(items).block(list_block(format!(" {} ({}) ", title, rows.len())))
}

impl DashboardView {
  pub fn new(ctx: AppContext) -> Self {
    let client = ctx.client.clone();
    let mut query = Query::new(move || {
      let client = client.clone();
      async move {
        let (resumen, horas_extras, horas_faltantes, semana) = tokio::try_join!(
          client.dashboard_resumen(),
          client.horas_extras(),
          client.horas_faltantes(),
          client.trabajadores_semana(),
        )?;
        Ok(DashboardData {
          resumen,
          horas_extras,
          horas_faltantes,
          semana,
        })
      }
    })
    .with_stale_time(Duration::from_secs(120));
    query.fetch();

    Self {
      ctx,
      query,
      session_check: None,
    }
  }

  /// Reload everything and re-check the token, bypassing the session TTL.
  fn refresh(&mut self) {
    self.query.refetch();
    if self.session_check.is_none() {
      let session = self.ctx.manager.session().clone();
      self.session_check = Some(Pending::spawn(async move { session.revalidate().await }));
    }
  }

  fn render_counters(&self, frame: &mut Frame, area: Rect, resumen: &DashboardResumen) {
    let counters = [
      ("Almacenes", resumen.total_almacenes),
      ("Subalmacenes", resumen.total_subalmacenes),
      ("Coordinadores", resumen.total_coordinadores),
      ("Trabajadores", resumen.total_trabajadores),
    ];
    let chunks = Layout::horizontal([Constraint::Ratio(1, 4); 4]).split(area);
    for ((label, value), chunk) in counters.iter().zip(chunks.iter()) {
      let paragraph = Paragraph::new(Line::styled(
        value.to_string(),
        Style::default()
          .fg(Color::Yellow)
          .add_modifier(Modifier::BOLD),
      ))
      .alignment(Alignment::Center)
      .block(list_block(format!(" {} ", label)));
      frame.render_widget(paragraph, *chunk);
    }
  }

  fn render_semana(&self, frame: &mut Frame, area: Rect, semana: &[TrabajadorSemana]) {
    let items: Vec<ListItem> = semana
      .iter()
      .map(|t| {
        let place = format!(
          "{} / {}",
          t.almacen.as_deref().unwrap_or("-"),
          t.subalmacen.as_deref().unwrap_or("-")
        );
        let color = if t.activo { Color::Green } else { Color::DarkGray };
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<24}", truncate(&t.nombre, 24)), Style::default().fg(color)),
          Span::raw(truncate(&place, 32)),
        ]))
      })
      .collect();
    let list = List::new(items).block(list_block(format!(" Esta semana ({}) ", semana.len())));
    frame.render_widget(list, area);
  }

  fn render_limits(&self, frame: &mut Frame, area: Rect) {
    let stats = self.ctx.client.limiter().stats();
    let items: Vec<ListItem> = stats
      .iter()
      .map(|(endpoint, usage)| {
        let color = if usage.current >= usage.limit {
          Color::Red
        } else if usage.current * 2 >= usage.limit {
          Color::Yellow
        } else {
          Color::Green
        };
        ListItem::new(Line::from(vec![
          Span::raw(format!("{:<28}", truncate(endpoint, 28))),
          Span::styled(format!("{:>9}", usage.to_string()), Style::default().fg(color)),
          Span::styled(
            format!(" / {}s", usage.window.as_secs()),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();
    let list = List::new(items).block(list_block(" Límites de peticiones ".to_string()));
    frame.render_widget(list, area);
  }
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let data = match self.query.state() {
      QueryState::Success(data) => data,
      QueryState::Error(e) => {
        let paragraph = Paragraph::new(format!(
          "No se pudo cargar el resumen: {}. Pulsa 'r' para reintentar.",
          e
        ))
        .block(list_block(" Dashboard (error) ".to_string()))
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, area);
        return;
      }
      _ => {
        let paragraph = Paragraph::new("Cargando...")
          .block(list_block(" Dashboard (cargando...) ".to_string()))
          .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, area);
        return;
      }
    };

    let [counters, middle, bottom] = Layout::vertical([
      Constraint::Length(3),
      Constraint::Percentage(50),
      Constraint::Min(5),
    ])
    .areas(area);
    let [extras, faltantes] =
      Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(middle);
    let [semana, limits] =
      Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(bottom);

    self.render_counters(frame, counters, &data.resumen);
    frame.render_widget(
      hours_list("Horas extra", &top_horas_extras(&data.horas_extras), Color::Yellow),
      extras,
    );
    frame.render_widget(
      hours_list("Horas faltantes", &top_horas_faltantes(&data.horas_faltantes), Color::Red),
      faltantes,
    );
    self.render_semana(frame, semana, &data.semana);
    self.render_limits(frame, limits);
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(e) = self.query.error() {
        self.ctx.report_load_error("dashboard", e);
      }
    }
    if self.query.is_stale() {
      self.query.refetch();
    }

    if let Some(result) = self.session_check.as_mut().and_then(|p| p.try_take()) {
      self.session_check = None;
      // A rejected token comes back as Ok(None) and the session layer takes over
      if let Err(e) = result.and_then(|inner| inner) {
        self.ctx.report_load_error("la sesión", &e);
      }
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(20),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  #[tokio::test]
  async fn test_refresh_revalidates_the_session() {
    let mut view = DashboardView::new(AppContext::for_tests());
    assert!(view.session_check.is_none());

    view.handle_key(KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE));
    assert!(view.session_check.is_some());

    // Signed out: the check settles without touching the network
    for _ in 0..50 {
      tokio::task::yield_now().await;
      view.tick();
      if view.session_check.is_none() {
        break;
      }
    }
    assert!(view.session_check.is_none());
  }

  #[test]
  fn test_top_horas_extras_ranks_and_skips_empty() {
    let rows = vec![
      HorasExtra { nombre: "Ana".into(), horas_extra: Some(2.5) },
      HorasExtra { nombre: "Luis".into(), horas_extra: None },
      HorasExtra { nombre: "Rosa".into(), horas_extra: Some(6.0) },
      HorasExtra { nombre: "Juan".into(), horas_extra: Some(0.0) },
    ];
    let ranked = top_horas_extras(&rows);
    assert_eq!(ranked, vec![("Rosa", 6.0), ("Ana", 2.5)]);
  }

  #[test]
  fn test_top_horas_faltantes() {
    let rows = vec![
      HorasFaltantes {
        nombre: "Ana".into(),
        horas_asignadas: Some(48.0),
        horas_trabajadas: Some(40.0),
      },
      HorasFaltantes {
        nombre: "Luis".into(),
        horas_asignadas: Some(48.0),
        horas_trabajadas: Some(50.0),
      },
    ];
    assert_eq!(top_horas_faltantes(&rows), vec![("Ana", 8.0)]);
  }
}
