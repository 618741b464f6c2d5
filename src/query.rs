//! Async query abstraction for view-side data fetching.
//!
//! A `Query<T>` owns a fetcher closure and the state of its latest run.
//! Views call `fetch()` when they need data and `poll()` on every tick:
//!
//! ```ignore
//! let client = ctx.client.clone();
//! let mut query = Query::new(move || {
//!     let client = client.clone();
//!     async move { client.almacenes().await }
//! });
//!
//! query.fetch();
//!
//! // In the tick handler
//! if query.poll() {
//!     // State changed, re-render
//! }
//! ```
//!
//! `Pending<T>` is the one-shot task underneath both; `Mutation` wraps it for
//! writes whose only output is a status message.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ApiError, ApiResult};

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// A spawned task whose single result is picked up by polling.
///
/// Dropping a `Pending` aborts the task.
pub struct Pending<T> {
  rx: oneshot::Receiver<T>,
  handle: JoinHandle<()>,
}

impl<T: Send + 'static> Pending<T> {
  pub fn spawn<Fut>(future: Fut) -> Self
  where
    Fut: Future<Output = T> + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
      // Receiver gone means nobody wants the result any more
      let _ = tx.send(future.await);
    });
    Self { rx, handle }
  }

  /// Take the result if the task has finished.
  ///
  /// A task that ended without producing a value reports `Aborted`.
  pub fn try_take(&mut self) -> Option<Result<T, ApiError>> {
    match self.rx.try_recv() {
      Ok(value) => Some(Ok(value)),
      Err(oneshot::error::TryRecvError::Empty) => None,
      Err(oneshot::error::TryRecvError::Closed) => Some(Err(ApiError::Aborted)),
    }
  }
}

impl<T> Drop for Pending<T> {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

/// A boxed future that returns an API result
type BoxFuture<T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send>>;

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Async query for data fetching with state management.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  pending: Option<Pending<ApiResult<T>>>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is called each time `fetch()` or `refetch()` starts a run.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      pending: None,
      fetched_at: None,
      stale_time: Duration::from_secs(60),
    }
  }

  /// After this duration, `is_stale()` returns true.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.state.error()
  }

  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| t.elapsed() > self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Start fetching data unless a run is already in progress.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Abort any pending run and start a new one.
  pub fn refetch(&mut self) {
    self.pending = None;
    self.start_fetch();
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed. Call this in the tick handler.
  pub fn poll(&mut self) -> bool {
    let Some(pending) = &mut self.pending else {
      return false;
    };

    match pending.try_take() {
      None => false,
      Some(result) => {
        self.pending = None;
        match result.and_then(|inner| inner) {
          Ok(data) => {
            self.state = QueryState::Success(data);
            self.fetched_at = Some(Instant::now());
          }
          Err(e) => self.state = QueryState::Error(e),
        }
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    self.state = QueryState::Loading;
    self.pending = Some(Pending::spawn((self.fetcher)()));
  }
}

/// A single write (create, update, delete) whose outcome is picked up once.
///
/// The success value is the message for the status line.
#[derive(Default)]
pub struct Mutation {
  pending: Option<Pending<ApiResult<String>>>,
}

impl Mutation {
  /// Start `future` unless another write is still running.
  ///
  /// Returns `false` when the call was ignored.
  #[must_use]
  pub fn start<Fut>(&mut self, future: Fut) -> bool
  where
    Fut: Future<Output = ApiResult<String>> + Send + 'static,
  {
    if self.is_running() {
      return false;
    }
    self.pending = Some(Pending::spawn(future));
    true
  }

  pub fn is_running(&self) -> bool {
    self.pending.is_some()
  }

  /// The outcome, once, after the write finished.
  pub fn poll(&mut self) -> Option<ApiResult<String>> {
    let result = self.pending.as_mut()?.try_take()?;
    self.pending = None;
    Some(result.and_then(|inner| inner))
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn test_query_success() {
    let mut query = Query::new(|| async { Ok(vec![1, 2, 3]) });

    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(matches!(query.state(), QueryState::Success(_)));
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_query_error() {
    let mut query: Query<i32> =
      Query::new(|| async { Err(ApiError::NotFound("almacén".to_string())) });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert_eq!(query.error(), Some(&ApiError::NotFound("almacén".to_string())));
  }

  #[tokio::test(start_paused = true)]
  async fn test_query_stale() {
    let mut query = Query::new(|| async { Ok(42) }).with_stale_time(Duration::from_secs(5));

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert!(!query.is_stale());

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(query.is_stale());
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = Query::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(42)
      }
    });

    query.fetch();
    query.fetch();
    assert!(query.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_refetch_aborts_pending() {
    let finished = Arc::new(AtomicU32::new(0));
    let counter = finished.clone();

    let mut query = Query::new(move || {
      let finished = counter.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(finished.fetch_add(1, Ordering::SeqCst))
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    query.refetch();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(query.poll());
    // The first run was aborted before it could finish
    assert_eq!(query.data(), Some(&0));
    assert_eq!(finished.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_dropping_pending_aborts_task() {
    let finished = Arc::new(AtomicU32::new(0));
    let counter = finished.clone();

    let pending = Pending::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      counter.fetch_add(1, Ordering::SeqCst);
    });
    drop(pending);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_mutation_reports_once_and_blocks_overlap() {
    let mut mutation = Mutation::default();
    assert!(mutation.start(async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      Ok("almacén creado".to_string())
    }));
    assert!(!mutation.start(async { Ok("second".to_string()) }));
    assert!(mutation.is_running());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mutation.poll(), Some(Ok("almacén creado".to_string())));
    assert_eq!(mutation.poll(), None);
    assert!(!mutation.is_running());
  }
}
