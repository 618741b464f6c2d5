//! Modal dialog slot for list views: either a form or a yes/no question,
//! tagged with the view's own action type.

use super::confirm::{ConfirmDialog, ConfirmEvent};
use super::form::{Form, FormEvent, FormValues};
use super::KeyResult;
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

pub enum Dialog<K> {
  Form(K, Form),
  Confirm(K, ConfirmDialog),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome<K> {
  /// Still open
  Open,
  /// Dismissed without action
  Closed,
  /// Form submitted; the dialog stays open so validation errors can be shown
  Submitted(K, FormValues),
  /// Question answered with yes
  Confirmed(K),
}

impl<K: Clone> Dialog<K> {
  pub fn form(action: K, form: Form) -> Self {
    Dialog::Form(action, form)
  }

  pub fn confirm(action: K, message: impl Into<String>) -> Self {
    Dialog::Confirm(action, ConfirmDialog::new(message))
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> DialogOutcome<K> {
    match self {
      Dialog::Form(action, form) => match form.handle_key(key) {
        KeyResult::Event(FormEvent::Submitted(values)) => {
          DialogOutcome::Submitted(action.clone(), values)
        }
        KeyResult::Event(FormEvent::Cancelled) => DialogOutcome::Closed,
        KeyResult::Handled | KeyResult::NotHandled => DialogOutcome::Open,
      },
      Dialog::Confirm(action, confirm) => match confirm.handle_key(key) {
        KeyResult::Event(ConfirmEvent::Confirmed) => DialogOutcome::Confirmed(action.clone()),
        KeyResult::Event(ConfirmEvent::Cancelled) => DialogOutcome::Closed,
        KeyResult::Handled | KeyResult::NotHandled => DialogOutcome::Open,
      },
    }
  }

  /// Validation message on a form; ignored for questions
  pub fn set_error(&mut self, error: impl Into<String>) {
    if let Dialog::Form(_, form) = self {
      form.set_error(error);
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    match self {
      Dialog::Form(_, form) => form.render_overlay(frame, area),
      Dialog::Confirm(_, confirm) => confirm.render_overlay(frame, area),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::{KeyCode, KeyModifiers};

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[derive(Debug, Clone, PartialEq, Eq)]
  enum Action {
    Rename(u64),
    Delete(u64),
  }

  #[test]
  fn test_form_outcome_carries_action() {
    let mut dialog = Dialog::form(Action::Rename(4), Form::new("Renombrar").field("Nombre", "Norte"));
    assert_eq!(dialog.handle_key(key(KeyCode::Char('!'))), DialogOutcome::Open);
    match dialog.handle_key(key(KeyCode::Enter)) {
      DialogOutcome::Submitted(action, values) => {
        assert_eq!(action, Action::Rename(4));
        assert_eq!(values.get(0), "Norte!");
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_confirm_outcome() {
    let mut dialog = Dialog::confirm(Action::Delete(9), "¿Eliminar?");
    assert_eq!(dialog.handle_key(key(KeyCode::Char('x'))), DialogOutcome::Open);
    assert_eq!(
      dialog.handle_key(key(KeyCode::Char('y'))),
      DialogOutcome::Confirmed(Action::Delete(9))
    );
    assert_eq!(dialog.handle_key(key(KeyCode::Esc)), DialogOutcome::Closed);
  }
}
