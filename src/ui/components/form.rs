//! Modal multi-field form used for every create/edit dialog and for login.

use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::ui::renderfns::centered_rect;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

const LABEL_WIDTH: usize = 16;

#[derive(Debug, Clone)]
struct FormField {
  label: &'static str,
  input: TextInput,
}

/// Trimmed field values in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormValues(Vec<String>);

impl FormValues {
  pub fn new(values: Vec<String>) -> Self {
    Self(values)
  }

  pub fn get(&self, index: usize) -> &str {
    self.0.get(index).map(String::as_str).unwrap_or("")
  }

  /// Empty fields become `None`
  pub fn optional(&self, index: usize) -> Option<String> {
    let value = self.get(index);
    (!value.is_empty()).then(|| value.to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  /// Enter on the last field. The form stays open until the parent closes it.
  Submitted(FormValues),
  Cancelled,
}

#[derive(Debug, Clone)]
pub struct Form {
  title: String,
  fields: Vec<FormField>,
  focused: usize,
  hint: Option<String>,
  error: Option<String>,
}

impl Form {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      fields: Vec::new(),
      focused: 0,
      hint: None,
      error: None,
    }
  }

  pub fn field(mut self, label: &'static str, initial: &str) -> Self {
    self.fields.push(FormField {
      label,
      input: TextInput::new().with_value(initial),
    });
    self
  }

  pub fn masked_field(mut self, label: &'static str) -> Self {
    self.fields.push(FormField {
      label,
      input: TextInput::masked(),
    });
    self
  }

  /// One line of help under the fields
  pub fn hint(mut self, hint: impl Into<String>) -> Self {
    self.hint = Some(hint.into());
    self
  }

  /// Show a validation message and keep the form open
  pub fn set_error(&mut self, error: impl Into<String>) {
    self.error = Some(error.into());
  }

  #[cfg(test)]
  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  fn values(&self) -> FormValues {
    FormValues::new(
      self
        .fields
        .iter()
        .map(|f| f.input.value().trim().to_string())
        .collect(),
    )
  }

  fn focus_next(&mut self) {
    if !self.fields.is_empty() {
      self.focused = (self.focused + 1) % self.fields.len();
    }
  }

  fn focus_prev(&mut self) {
    if !self.fields.is_empty() {
      self.focused = self.focused.checked_sub(1).unwrap_or(self.fields.len() - 1);
    }
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    match key.code {
      KeyCode::Esc => return KeyResult::Event(FormEvent::Cancelled),
      KeyCode::Tab | KeyCode::Down => {
        self.focus_next();
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus_prev();
        return KeyResult::Handled;
      }
      KeyCode::Enter => {
        if self.focused + 1 < self.fields.len() {
          self.focus_next();
          return KeyResult::Handled;
        }
        self.error = None;
        return KeyResult::Event(FormEvent::Submitted(self.values()));
      }
      _ => {}
    }

    let Some(field) = self.fields.get_mut(self.focused) else {
      return KeyResult::NotHandled;
    };
    match field.input.handle_key(key) {
      InputResult::Consumed => {
        self.error = None;
        KeyResult::Handled
      }
      InputResult::NotHandled => KeyResult::NotHandled,
      // Enter and Esc were taken above
      InputResult::Submitted(_) | InputResult::Cancelled => KeyResult::Handled,
    }
  }

  fn height(&self) -> u16 {
    let extra = usize::from(self.hint.is_some()) + usize::from(self.error.is_some());
    (self.fields.len() + extra + 2) as u16
  }

  /// Draw as a popup centered in `area`
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(64, self.height(), area);
    frame.render_widget(Clear, popup);
    self.render(frame, popup);
  }

  /// Draw inside `area`
  pub fn render(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));

    let mut lines: Vec<Line> = self
      .fields
      .iter()
      .enumerate()
      .map(|(i, field)| {
        let focused = i == self.focused;
        let label_style = if focused {
          Style::default().fg(Color::Yellow).bold()
        } else {
          Style::default().fg(Color::Gray)
        };
        Line::from(vec![
          Span::styled(format!("{:<width$}", field.label, width = LABEL_WIDTH), label_style),
          Span::raw(field.input.display()),
        ])
      })
      .collect();

    if let Some(error) = &self.error {
      lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    }
    if let Some(hint) = &self.hint {
      lines.push(Line::styled(hint.clone(), Style::default().fg(Color::DarkGray)));
    }

    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(lines).block(block), area);

    if let Some(field) = self.fields.get(self.focused) {
      let x = inner.x.saturating_add((LABEL_WIDTH + field.input.cursor_position()) as u16);
      let y = inner.y.saturating_add(self.focused as u16);
      if x < inner.right() && y < inner.bottom() {
        frame.set_cursor_position(Position::new(x, y));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_str(form: &mut Form, s: &str) {
    for c in s.chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
  }

  #[test]
  fn test_enter_advances_then_submits() {
    let mut form = Form::new("Nuevo almacén")
      .field("Nombre", "")
      .field("Descripción", "");

    type_str(&mut form, " Central ");
    assert_eq!(form.handle_key(key(KeyCode::Enter)), KeyResult::Handled);
    assert_eq!(form.focused, 1);

    match form.handle_key(key(KeyCode::Enter)) {
      KeyResult::Event(FormEvent::Submitted(values)) => {
        assert_eq!(values.get(0), "Central");
        assert_eq!(values.optional(1), None);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_prefilled_values_and_focus_wraps() {
    let mut form = Form::new("Editar").field("Entrada", "08:00").field("Salida", "");
    form.handle_key(key(KeyCode::BackTab));
    assert_eq!(form.focused, 1);
    form.handle_key(key(KeyCode::Tab));
    assert_eq!(form.focused, 0);
    assert_eq!(form.values().get(0), "08:00");
  }

  #[test]
  fn test_terminal_cursor_follows_the_edit_point() {
    let mut form = Form::new("Editar").field("Entrada", "08:00").field("Salida", "17:3");
    form.handle_key(key(KeyCode::Tab));
    form.handle_key(key(KeyCode::Left));

    let mut terminal = Terminal::new(ratatui::backend::TestBackend::new(40, 6)).unwrap();
    terminal.draw(|frame| form.render(frame, frame.area())).unwrap();

    // Border, label column, then three characters into "17:3"
    let expected = Position::new(1 + LABEL_WIDTH as u16 + 3, 2);
    assert_eq!(terminal.get_cursor_position().unwrap(), expected);
  }

  #[test]
  fn test_escape_cancels() {
    let mut form = Form::new("Login").field("Correo", "").masked_field("Contraseña");
    assert_eq!(
      form.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(FormEvent::Cancelled)
    );
  }
}
