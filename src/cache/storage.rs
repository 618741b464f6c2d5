//! Cache storage trait and in-memory implementation.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use super::traits::Cacheable;

/// Result of a cached query lookup.
#[derive(Debug, Clone)]
pub struct CachedQueryResult<T> {
  /// The cached entities in order
  pub entities: Vec<T>,
  /// When the query result was cached
  pub cached_at: Instant,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Store entities from a query result, replacing any previous entry.
  fn store_query_result<T: Cacheable>(&self, key: &str, entities: &[T]);

  /// Get cached entities for a query, regardless of age.
  fn get_query_result<T: Cacheable>(&self, key: &str) -> Option<CachedQueryResult<T>>;

  /// Drop a single query result.
  fn invalidate<T: Cacheable>(&self, key: &str);

  /// Drop everything.
  fn clear(&self);
}

struct StoredEntry {
  data: Arc<dyn Any + Send + Sync>,
  cached_at: Instant,
}

type EntryMap = HashMap<(&'static str, String), StoredEntry>;

/// Process-local storage. Lives as long as the session; nothing touches disk.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<EntryMap>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, EntryMap> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.lock().len()
  }
}

impl CacheStorage for MemoryStorage {
  fn store_query_result<T: Cacheable>(&self, key: &str, entities: &[T]) {
    let entry = StoredEntry {
      data: Arc::new(entities.to_vec()),
      cached_at: Instant::now(),
    };
    self.lock().insert((T::entity_type(), key.to_string()), entry);
  }

  fn get_query_result<T: Cacheable>(&self, key: &str) -> Option<CachedQueryResult<T>> {
    let entries = self.lock();
    let entry = entries.get(&(T::entity_type(), key.to_string()))?;
    let entities = entry.data.downcast_ref::<Vec<T>>()?.clone();
    Some(CachedQueryResult {
      entities,
      cached_at: entry.cached_at,
    })
  }

  fn invalidate<T: Cacheable>(&self, key: &str) {
    self.lock().remove(&(T::entity_type(), key.to_string()));
  }

  fn clear(&self) {
    self.lock().clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Row(u32);

  impl Cacheable for Row {
    fn entity_type() -> &'static str {
      "row"
    }
  }

  #[derive(Debug, Clone, PartialEq)]
  struct Other(u32);

  impl Cacheable for Other {
    fn entity_type() -> &'static str {
      "other"
    }
  }

  #[test]
  fn test_store_and_get_preserves_order() {
    let storage = MemoryStorage::new();
    storage.store_query_result("4-2024-01-01", &[Row(3), Row(1), Row(2)]);

    let cached = storage.get_query_result::<Row>("4-2024-01-01").unwrap();
    assert_eq!(cached.entities, vec![Row(3), Row(1), Row(2)]);
  }

  #[test]
  fn test_keys_are_namespaced_by_entity_type() {
    let storage = MemoryStorage::new();
    storage.store_query_result("k", &[Row(1)]);
    storage.store_query_result("k", &[Other(2)]);

    assert_eq!(storage.len(), 2);
    assert_eq!(storage.get_query_result::<Row>("k").unwrap().entities, vec![Row(1)]);
    assert_eq!(storage.get_query_result::<Other>("k").unwrap().entities, vec![Other(2)]);
  }

  #[test]
  fn test_invalidate_and_clear() {
    let storage = MemoryStorage::new();
    storage.store_query_result("a", &[Row(1)]);
    storage.store_query_result("b", &[Row(2)]);

    storage.invalidate::<Row>("a");
    assert!(storage.get_query_result::<Row>("a").is_none());
    assert!(storage.get_query_result::<Row>("b").is_some());

    storage.clear();
    assert!(storage.get_query_result::<Row>("b").is_none());
  }
}
