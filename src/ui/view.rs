use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::notifications::Notification;

/// Key hint shown in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

/// A screen on the navigation stack (warehouses, dates, roster, ...).
///
/// Views own their forms, confirmations and filter, and hand navigation back
/// to the App as a [`ViewAction`]. Reads go through `Query<T>` and writes
/// through `Mutation`, both polled from `tick()`.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Called on each tick to allow views to poll async queries
  fn tick(&mut self) {}

  /// A change notification arrived from the backend
  fn on_notification(&mut self, _notification: &Notification) {}

  /// True while a form or search owns the keyboard, so the App must not
  /// intercept `:` or `q`
  fn is_capturing_input(&self) -> bool {
    false
  }

  /// Header hints, sorted by priority before drawing
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "filter").with_priority(20),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
