//! Attendance roster for one sub-warehouse on one day.
//!
//! `AttendanceFeed` is the view-side handle: it validates its parameters,
//! serves fresh results from the shared 30 s cache, and keeps at most one
//! fetch running. Setting new parameters aborts the previous fetch, so the
//! roster always reflects the latest request.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::api::types::{Almacen, AttendanceRecord, Subalmacen};
use crate::api::AttendanceKey;
use crate::cache::{CacheLayer, MemoryStorage};
use crate::error::{ApiError, ApiResult};
use crate::query::Pending;

/// Where attendance rows and header names come from
#[async_trait]
pub trait AttendanceSource: Send + Sync + 'static {
  async fn fetch_attendance(
    &self,
    subalmacen_id: u64,
    fecha: &str,
  ) -> ApiResult<Vec<AttendanceRecord>>;

  async fn fetch_subalmacen(&self, id: u64) -> ApiResult<Subalmacen>;

  async fn fetch_almacen(&self, id: u64) -> ApiResult<Almacen>;
}

pub type AttendanceCache = CacheLayer<MemoryStorage>;

/// Header names for the roster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceNames {
  pub almacen: String,
  pub subalmacen: String,
}

/// Strict `YYYY-MM-DD` that is also a real calendar day.
pub fn is_valid_fecha(fecha: &str) -> bool {
  let bytes = fecha.as_bytes();
  let shape_ok = bytes.len() == 10
    && bytes.iter().enumerate().all(|(i, b)| match i {
      4 | 7 => *b == b'-',
      _ => b.is_ascii_digit(),
    });
  shape_ok && NaiveDate::parse_from_str(fecha, "%Y-%m-%d").is_ok()
}

/// Build the roster key, or `None` when the parameters can't be queried.
pub fn attendance_key(subalmacen_id: Option<u64>, fecha: &str) -> Option<AttendanceKey> {
  let id = subalmacen_id.filter(|id| *id > 0)?;
  let fecha = fecha.trim();
  is_valid_fecha(fecha).then(|| AttendanceKey::new(id, fecha))
}

pub struct AttendanceFeed {
  source: Arc<dyn AttendanceSource>,
  cache: AttendanceCache,
  key: Option<AttendanceKey>,
  records: Vec<AttendanceRecord>,
  loading: bool,
  error: Option<ApiError>,
  names: AttendanceNames,
  fetch: Option<Pending<ApiResult<Vec<AttendanceRecord>>>>,
  names_fetch: Option<Pending<AttendanceNames>>,
}

impl AttendanceFeed {
  pub fn new(source: Arc<dyn AttendanceSource>, cache: AttendanceCache) -> Self {
    Self {
      source,
      cache,
      key: None,
      records: Vec::new(),
      loading: false,
      error: None,
      names: AttendanceNames::default(),
      fetch: None,
      names_fetch: None,
    }
  }

  pub fn records(&self) -> &[AttendanceRecord] {
    &self.records
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  pub fn names(&self) -> &AttendanceNames {
    &self.names
  }

  pub fn key(&self) -> Option<&AttendanceKey> {
    self.key.as_ref()
  }

  /// Point the feed at a new (sub-warehouse, date) and fetch it.
  pub fn set_params(&mut self, subalmacen_id: Option<u64>, fecha: &str) {
    let key = attendance_key(subalmacen_id, fecha);
    let previous_sub = self.key.as_ref().map(|k| k.subalmacen_id);
    let next_sub = key.as_ref().map(|k| k.subalmacen_id);

    if key.is_none() {
      debug!(?subalmacen_id, fecha, "invalid attendance parameters");
    }
    self.key = key;

    if next_sub != previous_sub {
      self.load_names();
    }
    self.refetch();
  }

  /// Fetch the current key again, honoring the cache.
  pub fn refetch(&mut self) {
    // Dropping the previous handle aborts it
    self.fetch = None;
    self.error = None;

    let Some(key) = self.key.clone() else {
      self.records.clear();
      self.loading = false;
      return;
    };

    let cache_key = key.cache_key();
    if let Some(hit) = self.cache.get_fresh::<AttendanceRecord>(&cache_key) {
      debug!(
        key = %cache_key,
        count = hit.data.len(),
        age_ms = hit.age().as_millis() as u64,
        "attendance served from cache"
      );
      self.records = hit.data;
      self.loading = false;
      return;
    }

    self.loading = true;
    let source = Arc::clone(&self.source);
    let cache = self.cache.clone();
    self.fetch = Some(Pending::spawn(async move {
      cache
        .fetch_list(&cache_key, || async move {
          source.fetch_attendance(key.subalmacen_id, &key.fecha).await
        })
        .await
        .map(|result| result.data)
    }));
  }

  /// Drop the cached roster for the current key.
  pub fn clear_cache(&self) {
    if let Some(key) = &self.key {
      self
        .cache
        .invalidate::<AttendanceRecord>(&key.cache_key());
    }
  }

  /// Whether a change notification concerns this roster.
  pub fn matches(&self, subalmacen_id: u64, fecha: &str) -> bool {
    self
      .key
      .as_ref()
      .is_some_and(|k| k.subalmacen_id == subalmacen_id && fecha.starts_with(&k.fecha))
  }

  /// Pick up finished fetches. Returns `true` if anything changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    if let Some(pending) = &mut self.names_fetch {
      if let Some(result) = pending.try_take() {
        self.names_fetch = None;
        self.names = result.unwrap_or_default();
        changed = true;
      }
    }

    if let Some(pending) = &mut self.fetch {
      if let Some(result) = pending.try_take() {
        self.fetch = None;
        self.loading = false;
        changed = true;

        match result.and_then(|inner| inner) {
          Ok(records) => {
            debug!(count = records.len(), "attendance loaded");
            self.records = records;
          }
          Err(ApiError::Aborted) => {}
          Err(e) => {
            warn!(key = ?self.key, error = %e, "failed to load attendance");
            self.records.clear();
            self.error = Some(e);
          }
        }
      }
    }

    changed
  }

  fn load_names(&mut self) {
    self.names = AttendanceNames::default();
    self.names_fetch = None;

    let Some(subalmacen_id) = self.key.as_ref().map(|k| k.subalmacen_id) else {
      return;
    };

    let source = Arc::clone(&self.source);
    self.names_fetch = Some(Pending::spawn(async move {
      match resolve_names(source.as_ref(), subalmacen_id).await {
        Ok(names) => names,
        Err(e) => {
          debug!(subalmacen_id, error = %e, "could not resolve roster names");
          AttendanceNames::default()
        }
      }
    }));
  }
}

async fn resolve_names(source: &dyn AttendanceSource, subalmacen_id: u64) -> ApiResult<AttendanceNames> {
  let sub = source.fetch_subalmacen(subalmacen_id).await?;
  let almacen = match (sub.almacen_nombre, sub.almacen_id) {
    (Some(nombre), _) => nombre,
    (None, Some(id)) => source.fetch_almacen(id).await?.nombre,
    (None, None) => String::new(),
  };
  Ok(AttendanceNames {
    almacen,
    subalmacen: sub.nombre,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;

  #[derive(Default)]
  struct FakeSource {
    calls: AtomicU32,
    delays: HashMap<u64, Duration>,
    failure: Mutex<Option<ApiError>>,
  }

  impl FakeSource {
    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }

    fn fail_with(&self, error: ApiError) {
      *self.failure.lock().unwrap() = Some(error);
    }
  }

  fn record(id: u64, nombre: &str) -> AttendanceRecord {
    serde_json::from_value(serde_json::json!({"id": id, "trabajador_nombre": nombre})).unwrap()
  }

  #[async_trait]
  impl AttendanceSource for FakeSource {
    async fn fetch_attendance(
      &self,
      subalmacen_id: u64,
      fecha: &str,
    ) -> ApiResult<Vec<AttendanceRecord>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let delay = self.delays.get(&subalmacen_id).copied().unwrap_or_default();
      tokio::time::sleep(delay).await;
      if let Some(e) = self.failure.lock().unwrap().take() {
        return Err(e);
      }
      Ok(vec![record(subalmacen_id, fecha)])
    }

    async fn fetch_subalmacen(&self, id: u64) -> ApiResult<Subalmacen> {
      Ok(serde_json::from_value(serde_json::json!({"id": id, "nombre": "Frío", "almacen_id": 2})).unwrap())
    }

    async fn fetch_almacen(&self, _id: u64) -> ApiResult<Almacen> {
      Ok(serde_json::from_value(serde_json::json!({"id": 2, "nombre": "Central"})).unwrap())
    }
  }

  fn feed(source: Arc<FakeSource>, cache: &AttendanceCache) -> AttendanceFeed {
    AttendanceFeed::new(source, cache.clone())
  }

  async fn settle(feed: &mut AttendanceFeed) {
    tokio::time::sleep(Duration::from_secs(1)).await;
    feed.poll();
  }

  #[test]
  fn test_fecha_validation() {
    assert!(is_valid_fecha("2024-02-29"));
    assert!(!is_valid_fecha("2023-02-29"));
    assert!(!is_valid_fecha("2024-13-01"));
    assert!(!is_valid_fecha("2024-1-01"));
    assert!(!is_valid_fecha("01-03-2024"));
    assert!(!is_valid_fecha(""));
    assert!(attendance_key(None, "2024-03-01").is_none());
    assert!(attendance_key(Some(0), "2024-03-01").is_none());
    assert_eq!(
      attendance_key(Some(3), " 2024-03-01 "),
      Some(AttendanceKey::new(3, "2024-03-01"))
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalid_params_make_no_request() {
    let source = Arc::new(FakeSource::default());
    let cache = AttendanceCache::new(MemoryStorage::new());
    let mut feed = feed(source.clone(), &cache);

    feed.set_params(Some(3), "2024/03/01");
    assert!(!feed.is_loading());
    assert!(feed.records().is_empty());

    settle(&mut feed).await;
    assert_eq!(source.calls(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_cache_is_shared_between_feeds() {
    let source = Arc::new(FakeSource::default());
    let cache = AttendanceCache::new(MemoryStorage::new());

    let mut first = feed(source.clone(), &cache);
    first.set_params(Some(3), "2024-03-01");
    assert!(first.is_loading());
    settle(&mut first).await;
    assert_eq!(first.records().len(), 1);

    let mut second = feed(source.clone(), &cache);
    second.set_params(Some(3), "2024-03-01");
    assert!(!second.is_loading());
    assert_eq!(second.records(), first.records());
    assert_eq!(source.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_cache_refetches() {
    let source = Arc::new(FakeSource::default());
    let cache = AttendanceCache::new(MemoryStorage::new());
    let mut feed = feed(source.clone(), &cache);

    feed.set_params(Some(3), "2024-03-01");
    settle(&mut feed).await;

    tokio::time::advance(Duration::from_secs(30)).await;
    feed.refetch();
    assert!(feed.is_loading());
    settle(&mut feed).await;
    assert_eq!(source.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_superseded_fetch_is_aborted() {
    let source = Arc::new(FakeSource {
      delays: HashMap::from([(1, Duration::from_millis(500)), (2, Duration::from_millis(10))]),
      ..Default::default()
    });
    let cache = AttendanceCache::new(MemoryStorage::new());
    let mut feed = feed(source.clone(), &cache);

    feed.set_params(Some(1), "2024-03-01");
    tokio::task::yield_now().await;
    feed.set_params(Some(2), "2024-03-01");
    settle(&mut feed).await;

    assert_eq!(feed.records()[0].id, 2);
    assert!(!feed.is_loading());
    // The aborted request never reached the cache
    assert!(cache.get_fresh::<AttendanceRecord>("1-2024-03-01").is_none());
    assert!(cache.get_fresh::<AttendanceRecord>("2-2024-03-01").is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_empties_roster_and_is_not_cached() {
    let source = Arc::new(FakeSource::default());
    let cache = AttendanceCache::new(MemoryStorage::new());
    let mut feed = feed(source.clone(), &cache);

    feed.set_params(Some(3), "2024-03-01");
    settle(&mut feed).await;
    assert_eq!(feed.records().len(), 1);

    feed.clear_cache();
    source.fail_with(ApiError::Server {
      status: 500,
      message: "boom".into(),
    });
    feed.refetch();
    settle(&mut feed).await;

    assert!(feed.records().is_empty());
    assert!(matches!(feed.error(), Some(ApiError::Server { .. })));
    assert!(cache.get_fresh::<AttendanceRecord>("3-2024-03-01").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_unauthorized_surfaces_as_error_state() {
    let source = Arc::new(FakeSource::default());
    source.fail_with(ApiError::Unauthorized);
    let cache = AttendanceCache::new(MemoryStorage::new());
    let mut feed = feed(source.clone(), &cache);

    feed.set_params(Some(3), "2024-03-01");
    settle(&mut feed).await;

    assert!(feed.records().is_empty());
    assert_eq!(feed.error(), Some(&ApiError::Unauthorized));
  }

  #[tokio::test(start_paused = true)]
  async fn test_names_are_resolved_through_the_warehouse() {
    let source = Arc::new(FakeSource::default());
    let cache = AttendanceCache::new(MemoryStorage::new());
    let mut feed = feed(source, &cache);

    feed.set_params(Some(3), "2024-03-01");
    settle(&mut feed).await;

    assert_eq!(
      feed.names(),
      &AttendanceNames {
        almacen: "Central".to_string(),
        subalmacen: "Frío".to_string(),
      }
    );
  }

  #[tokio::test]
  async fn test_matches_notification() {
    let cache = AttendanceCache::new(MemoryStorage::new());
    let mut feed = feed(Arc::new(FakeSource::default()), &cache);
    feed.set_params(Some(3), "2024-03-01");

    assert!(feed.matches(3, "2024-03-01"));
    assert!(feed.matches(3, "2024-03-01T05:00:00.000Z"));
    assert!(!feed.matches(4, "2024-03-01"));
    assert!(!feed.matches(3, "2024-03-02"));
  }
}
