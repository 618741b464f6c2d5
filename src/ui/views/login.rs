use crate::api::types::Usuario;
use crate::app::AppContext;
use crate::error::{ApiError, ApiResult};
use crate::query::Pending;
use crate::ui::components::{Form, FormEvent, KeyResult};
use crate::ui::renderfns::centered_rect;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use ratatui::widgets::{Clear, Paragraph};

/// Sign-in screen. The App swaps in the main views once a token is stored.
pub struct LoginView {
  ctx: AppContext,
  form: Form,
  pending: Option<Pending<ApiResult<Usuario>>>,
}

fn login_form() -> Form {
  Form::new("Iniciar sesión")
    .field("Correo", "")
    .masked_field("Contraseña")
    .hint("Tab cambia de campo · Enter ingresa")
}

impl LoginView {
  pub fn new(ctx: AppContext) -> Self {
    Self {
      ctx,
      form: login_form(),
      pending: None,
    }
  }

  fn submit(&mut self, correo: String, password: String) {
    if correo.is_empty() || password.is_empty() {
      self.form.set_error("Ingresa correo y contraseña");
      return;
    }
    // An old "session expired" line no longer applies
    self.ctx.status.clear();
    let manager = self.ctx.manager.clone();
    self.pending = Some(Pending::spawn(async move {
      manager.login(&correo, &password).await
    }));
  }
}

impl View for LoginView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.pending.is_some() {
      return ViewAction::None;
    }
    if let KeyResult::Event(event) = self.form.handle_key(key) {
      match event {
        FormEvent::Submitted(values) => {
          self.submit(values.get(0).to_string(), values.get(1).to_string());
        }
        FormEvent::Cancelled => self.form = login_form(),
      }
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(60, 7, area);
    frame.render_widget(Clear, popup);
    self.form.render(frame, popup);

    if self.pending.is_some() {
      let below = Rect::new(popup.x, popup.bottom(), popup.width, 1);
      if below.bottom() <= area.bottom() {
        let waiting = Paragraph::new("Validando credenciales...")
          .alignment(Alignment::Center)
          .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(waiting, below);
      }
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Login".to_string()
  }

  fn tick(&mut self) {
    let Some(pending) = &mut self.pending else {
      return;
    };
    let Some(result) = pending.try_take() else {
      return;
    };
    self.pending = None;

    match result.and_then(|inner| inner) {
      Ok(user) => self.ctx.status.info(format!("Bienvenido, {}", user.nombre)),
      Err(ApiError::Unauthorized) => self.form.set_error("Correo o contraseña incorrectos"),
      Err(ApiError::Forbidden(_)) => {
        self.form.set_error("Solo RRHH y Administración pueden ingresar")
      }
      Err(e) => self.form.set_error(e.to_string()),
    }
  }

  fn is_capturing_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("Enter", "ingresar").with_priority(10),
      ShortcutInfo::new("Ctrl-C", "salir").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_missing_credentials_stay_in_the_form() {
    let mut view = LoginView::new(AppContext::for_tests());
    view.submit("ana@brayam.pe".to_string(), String::new());
    assert!(view.pending.is_none());
  }

  #[tokio::test]
  async fn test_submitting_clears_an_old_status() {
    let ctx = AppContext::for_tests();
    ctx.status.error("La sesión expiró, vuelve a iniciar sesión");
    let mut view = LoginView::new(ctx.clone());

    view.submit("ana@brayam.pe".to_string(), "secreta".to_string());

    assert!(view.pending.is_some());
    assert!(ctx.status.current().is_none());
  }
}
