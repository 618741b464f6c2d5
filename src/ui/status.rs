//! Single-line feedback shown under the current view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_TTL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
  Info,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
  pub kind: StatusKind,
  pub text: String,
}

/// Shared status line. Clones write to the same slot.
#[derive(Debug, Clone)]
pub struct StatusLine {
  slot: Arc<Mutex<Option<(StatusMessage, Instant)>>>,
  ttl: Duration,
}

impl Default for StatusLine {
  fn default() -> Self {
    Self {
      slot: Arc::new(Mutex::new(None)),
      ttl: DEFAULT_TTL,
    }
  }
}

impl StatusLine {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Option<(StatusMessage, Instant)>> {
    self.slot.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set(&self, kind: StatusKind, text: impl Into<String>) {
    let message = StatusMessage {
      kind,
      text: text.into(),
    };
    *self.lock() = Some((message, Instant::now()));
  }

  pub fn info(&self, text: impl Into<String>) {
    self.set(StatusKind::Info, text);
  }

  pub fn error(&self, text: impl Into<String>) {
    self.set(StatusKind::Error, text);
  }

  pub fn clear(&self) {
    *self.lock() = None;
  }

  /// The message to show right now, if it has not expired.
  pub fn current(&self) -> Option<StatusMessage> {
    let mut slot = self.lock();
    match slot.as_ref() {
      Some((_, at)) if at.elapsed() >= self.ttl => {
        *slot = None;
        None
      }
      Some((message, _)) => Some(message.clone()),
      None => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_message_expires() {
    let status = StatusLine::new();
    status.error("no se pudo guardar");

    let shown = status.current().unwrap();
    assert_eq!(shown.kind, StatusKind::Error);
    assert_eq!(shown.text, "no se pudo guardar");

    tokio::time::advance(Duration::from_secs(7)).await;
    assert!(status.current().is_none());
  }

  #[test]
  fn test_clones_share_the_slot() {
    let status = StatusLine::new();
    let other = status.clone();
    other.info("guardado");
    assert_eq!(status.current().map(|m| m.text), Some("guardado".to_string()));
    status.clear();
    assert!(other.current().is_none());
  }
}
