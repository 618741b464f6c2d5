//! Client-side sliding-window rate limiting per endpoint.
//!
//! Every request path keeps its own list of recent request instants. Before a
//! request is sent the list is pruned to the endpoint's window and compared to
//! its limit; a path whose list empties is forgotten. A 429 from the server
//! adds ghost entries so the endpoint cools down locally as well.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Longest single sleep while waiting for a slot
const MAX_SLOT_SLEEP: Duration = Duration::from_secs(5);

/// Ghost entries recorded after a server-side 429
const PENALTY_REQUESTS: usize = 5;

/// Limit for endpoints no pattern matches
pub const DEFAULT_LIMIT: EndpointLimit = EndpointLimit::new(50, Duration::from_secs(60));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointLimit {
  pub max_requests: usize,
  pub window: Duration,
}

impl EndpointLimit {
  pub const fn new(max_requests: usize, window: Duration) -> Self {
    Self {
      max_requests,
      window,
    }
  }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
  pub allowed: bool,
  /// Time until the oldest request in the window expires (zero when allowed)
  pub wait: Duration,
}

/// Usage snapshot for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUsage {
  pub current: usize,
  pub limit: usize,
  pub window: Duration,
}

impl std::fmt::Display for EndpointUsage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.current, self.limit)
  }
}

pub struct RateLimiter {
  limits: Vec<(String, EndpointLimit)>,
  fallback: EndpointLimit,
  requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
  fn default() -> Self {
    let minute = Duration::from_secs(60);
    Self::new(
      vec![
        ("/api/auth/validar".to_string(), EndpointLimit::new(10, minute)),
        ("/api/asistencias".to_string(), EndpointLimit::new(30, minute)),
        ("/api/subalmacenes".to_string(), EndpointLimit::new(20, minute)),
        ("/api/almacenes".to_string(), EndpointLimit::new(20, minute)),
      ],
      DEFAULT_LIMIT,
    )
  }
}

impl RateLimiter {
  /// Patterns are matched as substrings of the endpoint, first match wins.
  pub fn new(limits: Vec<(String, EndpointLimit)>, fallback: EndpointLimit) -> Self {
    Self {
      limits,
      fallback,
      requests: Mutex::new(HashMap::new()),
    }
  }

  pub fn limit_for(&self, endpoint: &str) -> EndpointLimit {
    self
      .limits
      .iter()
      .find(|(pattern, _)| endpoint.contains(pattern.as_str()))
      .map(|(_, limit)| *limit)
      .unwrap_or(self.fallback)
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
    self.requests.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Check whether a request to `endpoint` may go out now.
  pub fn check(&self, endpoint: &str) -> Admission {
    let limit = self.limit_for(endpoint);
    let now = Instant::now();
    let mut requests = self.lock();
    let Some(times) = requests.get_mut(endpoint) else {
      return Admission {
        allowed: true,
        wait: Duration::ZERO,
      };
    };
    prune(times, now, limit.window);
    if times.is_empty() {
      requests.remove(endpoint);
      return Admission {
        allowed: true,
        wait: Duration::ZERO,
      };
    }

    if times.len() >= limit.max_requests {
      let wait = times
        .front()
        .map(|oldest| limit.window.saturating_sub(now.duration_since(*oldest)))
        .unwrap_or_default();
      warn!(endpoint, wait_ms = wait.as_millis() as u64, "rate limit reached");
      return Admission {
        allowed: false,
        wait,
      };
    }

    Admission {
      allowed: true,
      wait: Duration::ZERO,
    }
  }

  /// Record a request against `endpoint`.
  pub fn record(&self, endpoint: &str) {
    let limit = self.limit_for(endpoint);
    let now = Instant::now();
    let mut requests = self.lock();
    let times = requests.entry(endpoint.to_string()).or_default();
    times.push_back(now);
    prune(times, now, limit.window);
    debug!(
      endpoint,
      current = times.len(),
      limit = limit.max_requests,
      "request recorded"
    );
  }

  /// Self-imposed cooldown after the server answered 429.
  pub fn penalize(&self, endpoint: &str) {
    warn!(endpoint, "server returned 429, applying local penalty");
    for _ in 0..PENALTY_REQUESTS {
      self.record(endpoint);
    }
  }

  /// Wait until `endpoint` is admitted.
  ///
  /// Sleeps `min(wait, 5s)` between checks. With `max_wait = None` this keeps
  /// retrying indefinitely; otherwise gives up (returns `false`) once the
  /// total wait would exceed `max_wait`.
  pub async fn wait_for_slot(&self, endpoint: &str, max_wait: Option<Duration>) -> bool {
    let deadline = max_wait.map(|d| Instant::now() + d);

    loop {
      let admission = self.check(endpoint);
      if admission.allowed {
        return true;
      }

      let mut sleep_for = admission.wait.min(MAX_SLOT_SLEEP);
      if let Some(deadline) = deadline {
        let now = Instant::now();
        if now >= deadline || now + admission.wait > deadline {
          return false;
        }
        sleep_for = sleep_for.min(deadline - now);
      }

      debug!(endpoint, sleep_ms = sleep_for.as_millis() as u64, "waiting for rate limit slot");
      // Never spin on a zero-length wait
      tokio::time::sleep(sleep_for.max(Duration::from_millis(1))).await;
    }
  }

  /// Current usage per endpoint. Expired entries are dropped on the way,
  /// along with endpoints left without any.
  pub fn stats(&self) -> BTreeMap<String, EndpointUsage> {
    let now = Instant::now();
    let mut requests = self.lock();
    requests.retain(|endpoint, times| {
      prune(times, now, self.limit_for(endpoint).window);
      !times.is_empty()
    });
    requests
      .iter()
      .map(|(endpoint, times)| {
        let limit = self.limit_for(endpoint);
        (
          endpoint.clone(),
          EndpointUsage {
            current: times.len(),
            limit: limit.max_requests,
            window: limit.window,
          },
        )
      })
      .collect()
  }

  pub fn clear(&self) {
    self.lock().clear();
    debug!("rate limiter cleared");
  }
}

fn prune(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
  while let Some(oldest) = times.front() {
    if now.duration_since(*oldest) >= window {
      times.pop_front();
    } else {
      break;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn limiter(max: usize, window_ms: u64) -> RateLimiter {
    RateLimiter::new(
      vec![(
        "/api/asistencias".to_string(),
        EndpointLimit::new(max, Duration::from_millis(window_ms)),
      )],
      EndpointLimit::new(50, Duration::from_secs(60)),
    )
  }

  #[test]
  fn test_pattern_lookup() {
    let limiter = RateLimiter::default();
    assert_eq!(limiter.limit_for("/api/auth/validar").max_requests, 10);
    assert_eq!(limiter.limit_for("/api/asistencias/12").max_requests, 30);
    assert_eq!(limiter.limit_for("/api/subalmacenes/4").max_requests, 20);
    assert_eq!(limiter.limit_for("/api/almacenes").max_requests, 20);
    assert_eq!(limiter.limit_for("/api/trabajadores").max_requests, 50);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fourth_request_denied_until_window_slides() {
    let limiter = limiter(3, 1000);
    let endpoint = "/api/asistencias";

    for _ in 0..3 {
      assert!(limiter.check(endpoint).allowed);
      limiter.record(endpoint);
      tokio::time::advance(Duration::from_millis(100)).await;
    }

    let denied = limiter.check(endpoint);
    assert!(!denied.allowed);
    // Oldest was recorded 300ms ago
    assert_eq!(denied.wait, Duration::from_millis(700));

    tokio::time::advance(Duration::from_millis(699)).await;
    assert!(!limiter.check(endpoint).allowed);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(limiter.check(endpoint).allowed);
  }

  #[tokio::test(start_paused = true)]
  async fn test_penalty_blocks_endpoint() {
    let limiter = limiter(5, 1000);
    limiter.penalize("/api/asistencias");
    assert!(!limiter.check("/api/asistencias").allowed);
    // Other endpoints are untouched
    assert!(limiter.check("/api/trabajadores").allowed);
  }

  #[tokio::test(start_paused = true)]
  async fn test_wait_for_slot_resumes_after_window() {
    let limiter = limiter(1, 1000);
    limiter.record("/api/asistencias");

    let start = Instant::now();
    assert!(limiter.wait_for_slot("/api/asistencias", None).await);
    assert!(start.elapsed() >= Duration::from_millis(1000));
  }

  #[tokio::test(start_paused = true)]
  async fn test_wait_for_slot_gives_up_at_deadline() {
    let limiter = limiter(1, 10_000);
    limiter.record("/api/asistencias");

    let admitted = limiter
      .wait_for_slot("/api/asistencias", Some(Duration::from_secs(2)))
      .await;
    assert!(!admitted);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stats_and_clear() {
    let limiter = limiter(3, 1000);
    limiter.record("/api/asistencias");
    limiter.record("/api/asistencias");

    let stats = limiter.stats();
    assert_eq!(stats["/api/asistencias"].to_string(), "2/3");

    limiter.clear();
    assert!(limiter.stats().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_idle_paths_are_forgotten() {
    let limiter = limiter(3, 1000);
    for id in 1..=20 {
      limiter.record(&format!("/api/asistencias/{}", id));
    }
    limiter.record("/api/trabajadores");
    assert_eq!(limiter.lock().len(), 21);

    tokio::time::advance(Duration::from_millis(1000)).await;
    assert!(limiter.check("/api/asistencias/7").allowed);
    assert!(!limiter.lock().contains_key("/api/asistencias/7"));

    // The fallback window is a minute, so this one is still counted
    let stats = limiter.stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats["/api/trabajadores"].current, 1);
  }
}
