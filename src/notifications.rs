//! Live change notifications over server-sent events.
//!
//! The backend pushes `{"type": "asistencia_change", ...}` messages on
//! `/api/notifications/events`. The listener keeps that stream open for the
//! current token, reconnecting with exponential backoff and resuming from the
//! last event id.

use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::api_types::{opt_string, opt_u64};
use crate::api::ApiClient;
use crate::config::NotificationsConfig;
use crate::error::ApiError;

/// One dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
  /// Event type; `None` means the default "message"
  pub event: Option<String>,
  pub data: String,
  pub id: Option<String>,
}

/// Incremental parser for a `text/event-stream` body.
#[derive(Debug, Default)]
pub struct SseParser {
  buffer: Vec<u8>,
  event: Option<String>,
  data: Vec<String>,
  last_event_id: Option<String>,
  retry: Option<Duration>,
}

impl SseParser {
  pub fn new() -> Self {
    Self::default()
  }

  /// Feed raw bytes, returning every event completed by them.
  pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
    self.buffer.extend_from_slice(chunk);

    let mut events = Vec::new();
    while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
      let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
      line.pop();
      if line.last() == Some(&b'\r') {
        line.pop();
      }
      let line = String::from_utf8_lossy(&line).into_owned();
      if let Some(event) = self.process_line(&line) {
        events.push(event);
      }
    }
    events
  }

  fn process_line(&mut self, line: &str) -> Option<SseEvent> {
    if line.is_empty() {
      return self.dispatch();
    }
    if line.starts_with(':') {
      return None;
    }

    let (field, value) = match line.split_once(':') {
      Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
      None => (line, ""),
    };

    match field {
      "event" => self.event = Some(value.to_string()),
      "data" => self.data.push(value.to_string()),
      "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
      "retry" => {
        if let Ok(ms) = value.parse::<u64>() {
          self.retry = Some(Duration::from_millis(ms));
        }
      }
      _ => {}
    }
    None
  }

  fn dispatch(&mut self) -> Option<SseEvent> {
    let event = self.event.take();
    if self.data.is_empty() {
      return None;
    }
    let data = std::mem::take(&mut self.data).join("\n");
    Some(SseEvent {
      event,
      data,
      id: self.last_event_id.clone(),
    })
  }

  pub fn last_event_id(&self) -> Option<&str> {
    self.last_event_id.as_deref()
  }

  /// Reconnection delay requested by the server, if a new one arrived.
  pub fn take_retry(&mut self) -> Option<Duration> {
    self.retry.take()
  }
}

/// Changes the UI reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
  AttendanceChange { subalmacen_id: u64, fecha: String },
}

#[derive(Debug, Deserialize)]
struct RawNotification {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default, deserialize_with = "opt_u64")]
  subalmacen_id: Option<u64>,
  #[serde(default, deserialize_with = "opt_string")]
  fecha: Option<String>,
}

impl Notification {
  pub fn from_event(event: &SseEvent) -> Option<Self> {
    let raw: RawNotification = match serde_json::from_str(&event.data) {
      Ok(raw) => raw,
      Err(e) => {
        debug!(error = %e, "ignoring malformed notification");
        return None;
      }
    };

    match raw.kind.as_str() {
      "asistencia_change" => Some(Notification::AttendanceChange {
        subalmacen_id: raw.subalmacen_id?,
        fecha: raw.fecha?,
      }),
      other => {
        debug!(kind = other, "ignoring notification");
        None
      }
    }
  }
}

/// Exponential reconnect delay
#[derive(Debug, Clone)]
pub struct Backoff {
  base: Duration,
  max: Duration,
  current: Duration,
}

impl Backoff {
  pub fn new(base: Duration, max: Duration) -> Self {
    Self {
      base,
      max,
      current: base.min(max),
    }
  }

  pub fn from_config(config: &NotificationsConfig) -> Self {
    Self::new(
      Duration::from_millis(config.initial_backoff_ms),
      Duration::from_secs(config.max_backoff_secs),
    )
  }

  pub fn next_delay(&mut self) -> Duration {
    let delay = self.current;
    self.current = (self.current * 2).min(self.max);
    delay
  }

  pub fn reset(&mut self) {
    self.current = self.base.min(self.max);
  }

  /// Adopt a server-provided base delay.
  pub fn set_base(&mut self, base: Duration) {
    self.base = base;
    self.reset();
  }
}

/// Background task holding the event stream open. Aborted on drop.
pub struct NotificationListener {
  handle: JoinHandle<()>,
}

impl NotificationListener {
  pub fn spawn<F>(client: ApiClient, backoff: Backoff, on_notification: F) -> Self
  where
    F: Fn(Notification) + Send + 'static,
  {
    let handle = tokio::spawn(listen(client, backoff, on_notification));
    Self { handle }
  }

  #[cfg(test)]
  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }
}

impl Drop for NotificationListener {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

async fn listen<F>(client: ApiClient, mut backoff: Backoff, on_notification: F)
where
  F: Fn(Notification) + Send + 'static,
{
  let mut last_event_id: Option<String> = None;

  loop {
    let Some(token) = client.tokens().token() else {
      info!("no session token, notifications stopped");
      return;
    };

    match client
      .open_event_stream(&token, last_event_id.as_deref())
      .await
    {
      Ok(response) => {
        info!("notification stream connected");
        backoff.reset();

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
          let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
              warn!(error = %e, "notification stream interrupted");
              break;
            }
          };

          for event in parser.feed(&bytes) {
            if let Some(notification) = Notification::from_event(&event) {
              debug!(?notification, "notification received");
              on_notification(notification);
            }
          }
          if let Some(retry) = parser.take_retry() {
            debug!(retry_ms = retry.as_millis() as u64, "server set reconnect delay");
            backoff.set_base(retry);
          }
          if let Some(id) = parser.last_event_id() {
            last_event_id = Some(id.to_string());
          }
        }
        info!("notification stream closed");
      }
      Err(ApiError::Unauthorized) => {
        warn!("notification stream rejected the token, giving up");
        return;
      }
      Err(e) => warn!(error = %e, "could not open notification stream"),
    }

    let delay = backoff.next_delay();
    debug!(delay_ms = delay.as_millis() as u64, "reconnecting notifications");
    tokio::time::sleep(delay).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::rate_limit::RateLimiter;
  use crate::session::{AuthSignals, StoredSession, TokenStore};
  use std::sync::Arc;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::sync::mpsc;

  #[test]
  fn test_parser_dispatches_on_blank_line() {
    let mut parser = SseParser::new();
    let events = parser.feed(b"data: {\"a\":1}\n\n");
    assert_eq!(
      events,
      vec![SseEvent {
        event: None,
        data: "{\"a\":1}".to_string(),
        id: None,
      }]
    );
  }

  #[test]
  fn test_parser_handles_split_chunks_and_crlf() {
    let mut parser = SseParser::new();
    assert!(parser.feed(b"event: cambio\r\nda").is_empty());
    assert!(parser.feed(b"ta: uno\r\ndata: dos\r\n").is_empty());
    let events = parser.feed(b"\r\n");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.as_deref(), Some("cambio"));
    assert_eq!(events[0].data, "uno\ndos");
  }

  #[test]
  fn test_parser_skips_comments_and_empty_events() {
    let mut parser = SseParser::new();
    let events = parser.feed(b": keep-alive\n\nevent: ping\n\n");
    assert!(events.is_empty());
  }

  #[test]
  fn test_parser_tracks_id_and_retry() {
    let mut parser = SseParser::new();
    let events = parser.feed(b"id: 41\nretry: 2500\ndata: x\n\ndata: y\n\n");
    assert_eq!(events[0].id.as_deref(), Some("41"));
    // The id persists until the server sends a new one
    assert_eq!(events[1].id.as_deref(), Some("41"));
    assert_eq!(parser.last_event_id(), Some("41"));
    assert_eq!(parser.take_retry(), Some(Duration::from_millis(2500)));
    assert_eq!(parser.take_retry(), None);
  }

  #[test]
  fn test_attendance_change_notification() {
    let event = SseEvent {
      data: r#"{"type":"asistencia_change","subalmacen_id":"7","fecha":"2024-03-01"}"#.to_string(),
      ..Default::default()
    };
    assert_eq!(
      Notification::from_event(&event),
      Some(Notification::AttendanceChange {
        subalmacen_id: 7,
        fecha: "2024-03-01".to_string(),
      })
    );

    let other = SseEvent {
      data: r#"{"type":"connected"}"#.to_string(),
      ..Default::default()
    };
    assert_eq!(Notification::from_event(&other), None);

    let garbage = SseEvent {
      data: "not json".to_string(),
      ..Default::default()
    };
    assert_eq!(Notification::from_event(&garbage), None);
  }

  #[test]
  fn test_backoff_doubles_up_to_cap_and_resets() {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
    let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));

    backoff.set_base(Duration::from_secs(5));
    assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    assert_eq!(backoff.next_delay(), Duration::from_secs(10));
  }

  #[tokio::test]
  async fn test_listener_resumes_with_last_event_id_and_stops_on_401() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads_tx, mut heads_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
      let stream_body = "id: 9\ndata: {\"type\":\"asistencia_change\",\"subalmacen_id\":3,\"fecha\":\"2024-03-01\"}\n\n";
      let responses = [
        format!(
          "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
          stream_body.len(),
          stream_body
        ),
        "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
      ];
      for response in responses {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let n = socket.read(&mut buf).await.unwrap();
        let _ = heads_tx.send(String::from_utf8_lossy(&buf[..n]).to_string());
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
      }
    });

    let mut config = Config::default();
    config.api.url = format!("http://{}", addr);
    let tokens = TokenStore::in_memory();
    tokens
      .set(StoredSession {
        token: "tok".to_string(),
        ..Default::default()
      })
      .unwrap();
    let client = ApiClient::new(
      &config,
      tokens,
      Arc::new(RateLimiter::default()),
      AuthSignals::new(),
    )
    .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(50));
    let handle = NotificationListener::spawn(client, backoff, move |n| {
      let _ = tx.send(n);
    });

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
      .await
      .unwrap();
    assert_eq!(
      received,
      Some(Notification::AttendanceChange {
        subalmacen_id: 3,
        fecha: "2024-03-01".to_string(),
      })
    );

    let first = heads_rx.recv().await.unwrap().to_lowercase();
    assert!(first.contains("token=tok"));
    assert!(first.contains("accept: text/event-stream"));
    let second = tokio::time::timeout(Duration::from_secs(5), heads_rx.recv())
      .await
      .unwrap()
      .unwrap()
      .to_lowercase();
    assert!(second.contains("last-event-id: 9"));

    // The 401 ends the task
    tokio::time::timeout(Duration::from_secs(5), async {
      while !handle.is_finished() {
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
    })
    .await
    .unwrap();
  }
}
