//! Cache layer that orchestrates caching logic with network fetching.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::storage::CacheStorage;
use super::traits::{CacheResult, Cacheable};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the views and the API client. Clones share the
/// same storage, so one instance per process gives every view the same cache.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// How long before cached data is considered stale
  ttl: Duration,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      ttl: Duration::from_secs(30),
    }
  }

  /// Set the time-to-live for cached data.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Check if cached data is still fresh.
  fn is_fresh(&self, cached_at: Instant) -> bool {
    cached_at.elapsed() < self.ttl
  }

  /// Return cached entities for `key` if they are still within the TTL.
  pub fn get_fresh<T: Cacheable>(&self, key: &str) -> Option<CacheResult<Vec<T>>> {
    let cached = self.storage.get_query_result::<T>(key)?;
    if self.is_fresh(cached.cached_at) {
      Some(CacheResult::from_cache(cached.entities, cached.cached_at))
    } else {
      None
    }
  }

  /// Fetch a list with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On success, store the result and return it
  ///
  /// Errors are returned as-is and leave the cache untouched.
  pub async fn fetch_list<T, E, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>, E>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
  {
    if let Some(hit) = self.get_fresh::<T>(key) {
      debug!(entity = T::entity_type(), key, "cache hit");
      return Ok(hit);
    }

    let data = fetcher().await?;
    self.storage.store_query_result(key, &data);
    debug!(entity = T::entity_type(), key, count = data.len(), "cache stored");
    Ok(CacheResult::from_network(data))
  }

  /// Drop the cached result for `key`.
  pub fn invalidate<T: Cacheable>(&self, key: &str) {
    self.storage.invalidate::<T>(key);
    debug!(entity = T::entity_type(), key, "cache invalidated");
  }

  /// Drop all cached results.
  pub fn clear(&self) {
    self.storage.clear();
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      ttl: self.ttl,
    }
  }
}
