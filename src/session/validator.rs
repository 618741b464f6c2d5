//! Cached, single-flight validation of the stored token.
//!
//! Any number of views may ask for the current user at the same time. At
//! most one `GET /api/auth/validar` is in flight; everyone else awaits the
//! same shared future. A validated user stays fresh for `ttl`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::types::Usuario;
use crate::config::SessionConfig;
use crate::error::{ApiError, ApiResult};

use super::token::TokenStore;

/// Something that can turn a token into the user it belongs to.
#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
  async fn validate(&self, token: &str) -> ApiResult<Usuario>;
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
  pub ttl: Duration,
  pub wait_timeout: Duration,
  pub attempt_timeout: Duration,
  pub max_retries: u32,
  pub retry_delay: Duration,
  pub rate_limit_backoff: Duration,
}

impl SessionSettings {
  pub fn from_config(config: &SessionConfig) -> Self {
    Self {
      ttl: Duration::from_secs(config.ttl_secs),
      wait_timeout: Duration::from_secs(config.wait_timeout_secs),
      attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
      max_retries: config.max_retries,
      retry_delay: Duration::from_millis(config.retry_delay_ms),
      rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
    }
  }
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self::from_config(&SessionConfig::default())
  }
}

type Validation = Shared<BoxFuture<'static, ApiResult<Usuario>>>;

#[derive(Default)]
struct SessionState {
  user: Option<Usuario>,
  validated_at: Option<Instant>,
  in_flight: Option<(u64, Validation)>,
  /// Bumped on every new validation and on reset; stale results are dropped
  generation: u64,
}

struct Inner {
  state: Mutex<SessionState>,
  validator: Arc<dyn TokenValidator>,
  tokens: TokenStore,
  watch_tx: watch::Sender<Option<Usuario>>,
  settings: SessionSettings,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, SessionState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn publish(&self, user: Option<Usuario>) {
    self.watch_tx.send_replace(user);
  }

  /// Apply the outcome of validation `generation` made with `token`.
  fn finish(&self, generation: u64, token: &str, result: &ApiResult<Usuario>) {
    let mut state = self.lock();
    if matches!(&state.in_flight, Some((g, _)) if *g == generation) {
      state.in_flight = None;
    }
    if state.generation != generation {
      debug!(generation, "discarding stale validation result");
      return;
    }

    match result {
      Ok(user) => {
        state.user = Some(user.clone());
        state.validated_at = Some(Instant::now());
        drop(state);
        debug!(usuario = %user.nombre, "session validated");
        self.publish(Some(user.clone()));
      }
      Err(e) if e.is_auth_failure() => {
        state.user = None;
        state.validated_at = None;
        drop(state);
        warn!(error = %e, "stored token rejected, clearing session");
        if self.tokens.token().as_deref() == Some(token) {
          self.tokens.clear();
        }
        self.publish(None);
      }
      Err(e) => {
        // Keep whatever user we had; the next call tries again
        warn!(error = %e, "session validation failed");
      }
    }
  }
}

/// Process-wide cache of the validated user.
#[derive(Clone)]
pub struct SessionCache {
  inner: Arc<Inner>,
}

impl SessionCache {
  pub fn new(
    validator: Arc<dyn TokenValidator>,
    tokens: TokenStore,
    settings: SessionSettings,
  ) -> Self {
    let (watch_tx, _) = watch::channel(None);
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(SessionState::default()),
        validator,
        tokens,
        watch_tx,
        settings,
      }),
    }
  }

  /// The validated user, hitting the network only when the cache is stale.
  ///
  /// Returns `Ok(None)` when there is no token or the backend rejected it.
  pub async fn current_user(&self) -> ApiResult<Option<Usuario>> {
    self.resolve(false).await
  }

  /// Validate again even if the cached user is still fresh.
  pub async fn revalidate(&self) -> ApiResult<Option<Usuario>> {
    self.resolve(true).await
  }

  async fn resolve(&self, force: bool) -> ApiResult<Option<Usuario>> {
    let Some(token) = self.inner.tokens.token() else {
      self.clear_user();
      return Ok(None);
    };

    let (generation, flight) = {
      let mut state = self.inner.lock();
      if !force {
        if let (Some(user), Some(at)) = (&state.user, state.validated_at) {
          if at.elapsed() < self.inner.settings.ttl {
            return Ok(Some(user.clone()));
          }
        }
      }
      match state.in_flight.clone() {
        Some(joined) => joined,
        None => self.start(&mut state, token),
      }
    };

    match tokio::time::timeout(self.inner.settings.wait_timeout, flight).await {
      Ok(Ok(user)) => Ok(Some(user)),
      Ok(Err(e)) if e.is_auth_failure() => Ok(None),
      Ok(Err(e)) => Err(e),
      Err(_) => {
        warn!(generation, "validation still pending after wait timeout, releasing slot");
        let mut state = self.inner.lock();
        if matches!(&state.in_flight, Some((g, _)) if *g == generation) {
          state.in_flight = None;
        }
        Err(ApiError::Timeout)
      }
    }
  }

  fn start(&self, state: &mut SessionState, token: String) -> (u64, Validation) {
    state.generation += 1;
    let generation = state.generation;

    let weak: Weak<Inner> = Arc::downgrade(&self.inner);
    let validator = Arc::clone(&self.inner.validator);
    let settings = self.inner.settings.clone();

    let flight = async move {
      let result = validate_with_retry(validator.as_ref(), &token, &settings).await;
      if let Some(inner) = weak.upgrade() {
        inner.finish(generation, &token, &result);
      }
      result
    }
    .boxed()
    .shared();

    state.in_flight = Some((generation, flight.clone()));
    debug!(generation, "session validation started");
    (generation, flight)
  }

  fn clear_user(&self) {
    let had_user = {
      let mut state = self.inner.lock();
      state.validated_at = None;
      state.user.take().is_some()
    };
    if had_user {
      self.inner.publish(None);
    }
  }

  /// Forget the cached user and abandon any in-flight validation.
  pub fn reset(&self) {
    {
      let mut state = self.inner.lock();
      state.generation += 1;
      state.in_flight = None;
      state.user = None;
      state.validated_at = None;
    }
    self.inner.publish(None);
    debug!("session cache reset");
  }

  /// Seed the cache with a user just returned by login.
  pub fn prime(&self, user: Usuario) {
    {
      let mut state = self.inner.lock();
      state.generation += 1;
      state.in_flight = None;
      state.user = Some(user.clone());
      state.validated_at = Some(Instant::now());
    }
    info!(usuario = %user.nombre, "session primed");
    self.inner.publish(Some(user));
  }

  /// Receive every change of the validated user.
  pub fn subscribe(&self) -> watch::Receiver<Option<Usuario>> {
    self.inner.watch_tx.subscribe()
  }

  /// Last validated user, without touching the network.
  #[cfg(test)]
  pub fn cached_user(&self) -> Option<Usuario> {
    self.inner.lock().user.clone()
  }

  pub fn is_authenticated(&self) -> bool {
    self.inner.tokens.token().is_some()
  }
}

async fn validate_with_retry(
  validator: &dyn TokenValidator,
  token: &str,
  settings: &SessionSettings,
) -> ApiResult<Usuario> {
  let mut attempt: u32 = 0;
  loop {
    let result = match tokio::time::timeout(settings.attempt_timeout, validator.validate(token)).await {
      Ok(result) => result,
      Err(_) => Err(ApiError::Timeout),
    };

    match result {
      Ok(user) => return Ok(user),
      Err(e) if e.is_retryable() && attempt < settings.max_retries => {
        attempt += 1;
        let base = match e {
          ApiError::RateLimited(_) => settings.rate_limit_backoff,
          _ => settings.retry_delay,
        };
        let delay = base * attempt;
        warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "retrying session validation");
        tokio::time::sleep(delay).await;
      }
      Err(e) => return Err(e),
    }
  }
}
