use std::time::Duration;
use tokio::time::Instant;

/// Rows that can be stored in the cache.
///
/// Query keys are namespaced by `entity_type`, so two entities may share
/// the same key string.
pub trait Cacheable: Clone + Send + Sync + 'static {
  /// Namespace for query keys (e.g., "asistencia")
  fn entity_type() -> &'static str;
}

/// Data returned by the cache layer, with its age when it came from storage
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  /// Set when served from storage; `None` for a fresh network response
  pub cached_at: Option<Instant>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: Instant) -> Self {
    Self {
      data,
      cached_at: Some(cached_at),
    }
  }

  pub fn age(&self) -> Duration {
    self.cached_at.map(|t| t.elapsed()).unwrap_or_default()
  }
}
