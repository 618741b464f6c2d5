use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rate_limit::EndpointLimit;

const DEFAULT_API_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub session: SessionConfig,
  #[serde(default)]
  pub rate_limit: RateLimitConfig,
  #[serde(default)]
  pub notifications: NotificationsConfig,
  #[serde(default)]
  pub log: LogConfig,
  /// Custom title for header (defaults to the backend host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
  /// Per-request timeout for regular REST calls
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long an attendance roster stays fresh in memory
  #[serde(default = "default_attendance_ttl")]
  pub attendance_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      attendance_ttl_secs: default_attendance_ttl(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// Validated user stays fresh for this long
  pub ttl_secs: u64,
  /// Safety timeout for callers waiting on an in-flight validation
  pub wait_timeout_secs: u64,
  /// Deadline for a single validation attempt
  pub attempt_timeout_secs: u64,
  pub max_retries: u32,
  pub retry_delay_ms: u64,
  /// Base backoff after a 429 from the validation endpoint
  pub rate_limit_backoff_ms: u64,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      ttl_secs: 60,
      wait_timeout_secs: 15,
      attempt_timeout_secs: 10,
      max_retries: 2,
      retry_delay_ms: 1000,
      rate_limit_backoff_ms: 2000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
  /// Upper bound on waiting for a local slot; 0 waits forever
  pub max_wait_secs: u64,
  /// Replaces the built-in table when non-empty
  pub endpoints: Vec<EndpointLimitConfig>,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      max_wait_secs: 60,
      endpoints: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointLimitConfig {
  /// Substring matched against the request path; "default" sets the fallback
  pub pattern: String,
  pub max_requests: usize,
  pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
  pub enabled: bool,
  pub initial_backoff_ms: u64,
  pub max_backoff_secs: u64,
}

impl Default for NotificationsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      initial_backoff_ms: 1000,
      max_backoff_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Directory for rolling log files (default: data dir)
  pub directory: Option<PathBuf>,
  /// tracing filter directive, overridden by RUST_LOG
  pub filter: Option<String>,
}

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_attendance_ttl() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./almacen.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/almacen/config.yaml
  ///
  /// Without any file the built-in defaults apply. `ALMACEN_API_URL` (or
  /// `API_URL`) always wins over the configured backend URL.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Some(url) = Self::api_url_from_env() {
      config.api.url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("almacen.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("almacen").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Backend URL from environment variables.
  ///
  /// Checks ALMACEN_API_URL first, then API_URL as fallback.
  fn api_url_from_env() -> Option<String> {
    std::env::var("ALMACEN_API_URL")
      .or_else(|_| std::env::var("API_URL"))
      .ok()
      .map(|s| s.trim().trim_end_matches('/').to_string())
      .filter(|s| !s.is_empty())
  }

  /// Directory for the session file and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("almacen"))
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn attendance_ttl(&self) -> Duration {
    Duration::from_secs(self.cache.attendance_ttl_secs)
  }

  pub fn max_rate_wait(&self) -> Option<Duration> {
    match self.rate_limit.max_wait_secs {
      0 => None,
      secs => Some(Duration::from_secs(secs)),
    }
  }

  /// Configured endpoint table split into (pattern limits, default limit).
  pub fn endpoint_limits(&self) -> Option<(Vec<(String, EndpointLimit)>, Option<EndpointLimit>)> {
    if self.rate_limit.endpoints.is_empty() {
      return None;
    }

    let mut table = Vec::new();
    let mut fallback = None;
    for entry in &self.rate_limit.endpoints {
      let limit = EndpointLimit::new(entry.max_requests, Duration::from_secs(entry.window_secs));
      if entry.pattern == "default" {
        fallback = Some(limit);
      } else {
        table.push((entry.pattern.clone(), limit));
      }
    }
    Some((table, fallback))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert_eq!(config.api.url, "http://localhost:3000");
    assert_eq!(config.cache.attendance_ttl_secs, 30);
    assert_eq!(config.session.ttl_secs, 60);
    assert_eq!(config.session.max_retries, 2);
    assert!(config.notifications.enabled);
    assert!(config.endpoint_limits().is_none());
  }

  #[test]
  fn test_partial_sections() {
    let yaml = r#"
api:
  url: https://backend.example.com
session:
  ttl_secs: 120
rate_limit:
  max_wait_secs: 0
  endpoints:
    - pattern: /api/asistencias
      max_requests: 3
      window_secs: 1
    - pattern: default
      max_requests: 100
      window_secs: 60
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.api.url, "https://backend.example.com");
    assert_eq!(config.api.timeout_secs, 10);
    assert_eq!(config.session.ttl_secs, 120);
    assert_eq!(config.session.wait_timeout_secs, 15);
    assert_eq!(config.max_rate_wait(), None);

    let (table, fallback) = config.endpoint_limits().unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].0, "/api/asistencias");
    assert_eq!(table[0].1.max_requests, 3);
    assert_eq!(fallback.map(|l| l.max_requests), Some(100));
  }
}
