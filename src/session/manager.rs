//! Sign-in, sign-out and the reaction to an expired session.
//!
//! The data layer never navigates. When a request carrying a token comes
//! back 401 the API client emits an [`AuthSignal`]; if that token is still
//! the stored one the manager purges it, resets the cache and hands a
//! [`Navigation::Login`] to the UI.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::client::ApiClient;
use crate::api::types::Usuario;
use crate::error::{ApiError, ApiResult};

use super::token::StoredSession;
use super::validator::SessionCache;

const SIGNAL_CAPACITY: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub enum AuthSignal {
  /// A request made with `token` was rejected
  Unauthorized { endpoint: String, token: String },
}

// Keeps tokens out of the logs
impl std::fmt::Debug for AuthSignal {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      AuthSignal::Unauthorized { endpoint, .. } => f
        .debug_struct("Unauthorized")
        .field("endpoint", endpoint)
        .finish_non_exhaustive(),
    }
  }
}

/// Where the UI should go next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
  Login,
}

/// Broadcast channel for auth signals raised by the data layer
#[derive(Debug, Clone)]
pub struct AuthSignals {
  tx: broadcast::Sender<AuthSignal>,
}

impl AuthSignals {
  pub fn new() -> Self {
    let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
    Self { tx }
  }

  pub fn emit(&self, signal: AuthSignal) {
    debug!(?signal, "auth signal");
    // No subscribers just means nobody is listening yet
    let _ = self.tx.send(signal);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<AuthSignal> {
    self.tx.subscribe()
  }
}

impl Default for AuthSignals {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Clone)]
pub struct SessionManager {
  client: ApiClient,
  session: SessionCache,
}

impl SessionManager {
  pub fn new(client: ApiClient, session: SessionCache) -> Self {
    Self { client, session }
  }

  pub fn session(&self) -> &SessionCache {
    &self.session
  }

  /// React to one auth signal.
  ///
  /// A late 401 for a token that has since been replaced or cleared
  /// leaves the current session alone and returns `None`.
  pub fn handle(&self, signal: &AuthSignal) -> Option<Navigation> {
    match signal {
      AuthSignal::Unauthorized { endpoint, token } => {
        if self.client.tokens().token().as_deref() != Some(token.as_str()) {
          debug!(endpoint, "ignoring 401 for a token no longer in use");
          return None;
        }
        warn!(endpoint, "request unauthorized, ending session");
        self.client.tokens().clear();
        self.session.reset();
        Some(Navigation::Login)
      }
    }
  }

  /// Listen for auth signals until the channel closes, reporting each
  /// resulting navigation through `on_navigate`.
  pub fn spawn<F>(&self, on_navigate: F) -> JoinHandle<()>
  where
    F: Fn(Navigation) + Send + 'static,
  {
    let manager = self.clone();
    let mut rx = self.client.signals().subscribe();
    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(signal) => {
            if let Some(navigation) = manager.handle(&signal) {
              on_navigate(navigation);
            }
          }
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            debug!(skipped, "auth signals lagged");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }

  /// Sign in and persist the session.
  pub async fn login(&self, correo: &str, password: &str) -> ApiResult<Usuario> {
    let response = self.client.login(correo, password).await?;
    let usuario = response.usuario;

    self
      .client
      .tokens()
      .set(StoredSession {
        token: response.token,
        nombre: Some(usuario.nombre.clone()),
        rol: Some(usuario.rol_label()),
      })
      .map_err(|e| ApiError::Storage(e.to_string()))?;

    self.session.prime(usuario.clone());
    info!(usuario = %usuario.nombre, "session started");
    Ok(usuario)
  }

  /// Best-effort server logout followed by local cleanup.
  pub async fn logout(&self) {
    if self.client.tokens().token().is_some() {
      if let Err(e) = self.client.logout().await {
        warn!(error = %e, "server logout failed, clearing local session anyway");
      }
    }
    self.client.tokens().clear();
    self.session.reset();
    self.client.limiter().clear();
    info!("session ended");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::rate_limit::RateLimiter;
  use crate::session::{SessionSettings, TokenStore};
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::sync::mpsc;

  /// Answer every connection with the same status and body.
  async fn always(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      while let Ok((mut socket, _)) = listener.accept().await {
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        let response = format!(
          "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
          status,
          body.len(),
          body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
      }
    });
    format!("http://{}", addr)
  }

  fn manager(url: &str, tokens: TokenStore) -> SessionManager {
    let mut config = Config::default();
    config.api.url = url.to_string();
    let client = ApiClient::new(
      &config,
      tokens.clone(),
      Arc::new(RateLimiter::default()),
      AuthSignals::new(),
    )
    .unwrap();
    let session = SessionCache::new(Arc::new(client.clone()), tokens, SessionSettings::default());
    SessionManager::new(client, session)
  }

  fn signed_in() -> TokenStore {
    let tokens = TokenStore::in_memory();
    tokens
      .set(StoredSession {
        token: "expired".to_string(),
        nombre: Some("Ana".to_string()),
        rol: Some("RRHH".to_string()),
      })
      .unwrap();
    tokens
  }

  #[tokio::test]
  async fn test_unauthorized_response_clears_token_and_navigates_to_login() {
    let url = always("401 Unauthorized", r#"{"error":"Token expirado"}"#).await;
    let tokens = signed_in();
    let manager = manager(&url, tokens.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _listener = manager.spawn(move |nav| {
      let _ = tx.send(nav);
    });

    let err = manager.client.asistencias(3, "2024-03-01").await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);

    let nav = tokio::time::timeout(Duration::from_secs(5), rx.recv())
      .await
      .unwrap();
    assert_eq!(nav, Some(Navigation::Login));
    assert!(tokens.token().is_none());
    assert!(manager.session().cached_user().is_none());
  }

  #[tokio::test]
  async fn test_login_stores_token_and_primes_session() {
    let url = always(
      "200 OK",
      r#"{"token":"nuevo","usuario":{"id":1,"nombre":"Ana","nombre_rol":"RRHH"}}"#,
    )
    .await;
    let tokens = TokenStore::in_memory();
    let manager = manager(&url, tokens.clone());

    let user = manager.login("ana@brayam.pe", "secreta").await.unwrap();
    assert_eq!(user.nombre, "Ana");

    let stored = tokens.session().unwrap();
    assert_eq!(stored.token, "nuevo");
    assert_eq!(stored.rol.as_deref(), Some("RRHH"));
    assert_eq!(manager.session().cached_user(), Some(user));
  }

  #[tokio::test]
  async fn test_logout_cleans_up_even_when_server_fails() {
    let url = always("500 Internal Server Error", "").await;
    let tokens = signed_in();
    let manager = manager(&url, tokens.clone());
    manager.client.limiter().record("/api/almacenes");

    manager.logout().await;

    assert!(tokens.token().is_none());
    assert!(manager.client.limiter().stats().is_empty());
  }

  fn rejected(token: &str) -> AuthSignal {
    AuthSignal::Unauthorized {
      endpoint: "/api/almacenes".to_string(),
      token: token.to_string(),
    }
  }

  #[test]
  fn test_handle_ends_the_session_once() {
    let manager = manager("http://127.0.0.1:9", signed_in());
    let signal = rejected("expired");
    assert_eq!(manager.handle(&signal), Some(Navigation::Login));
    assert_eq!(manager.handle(&signal), None);
    assert!(manager.client.tokens().token().is_none());
  }

  #[test]
  fn test_late_rejection_of_old_token_keeps_new_session() {
    let tokens = signed_in();
    let manager = manager("http://127.0.0.1:9", tokens.clone());
    tokens
      .set(StoredSession {
        token: "nuevo".to_string(),
        nombre: Some("Ana".to_string()),
        rol: Some("RRHH".to_string()),
      })
      .unwrap();

    assert_eq!(manager.handle(&rejected("expired")), None);
    assert_eq!(tokens.token().as_deref(), Some("nuevo"));
  }

  #[test]
  fn test_signal_debug_hides_the_token() {
    let shown = format!("{:?}", rejected("secreto"));
    assert!(shown.contains("/api/almacenes"));
    assert!(!shown.contains("secreto"));
  }
}
